//! Biological assemblies: symmetry operators and `pdbx_struct_assembly_gen` expansion.

use super::cif::{Block, Category};
use crate::errors::{Result, SurfaceError};
use nalgebra::{Matrix3, Point3, Vector3};
use std::collections::HashMap;

/// Rigid transform `x -> R x + t` applied to the atoms of a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    name: String,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

impl Operator {
    /// Operator from a rotation matrix and a translation.
    pub fn new(name: impl Into<String>, rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            name: name.into(),
            rotation,
            translation,
        }
    }

    /// The identity operator used for deposited-model units.
    pub fn identity() -> Self {
        Self::new("1_555", Matrix3::identity(), Vector3::zeros())
    }

    /// Operator name, e.g. `1_555` or `1x2` for a composition.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this operator leaves positions unchanged.
    pub fn is_identity(&self) -> bool {
        self.rotation == Matrix3::identity() && self.translation == Vector3::zeros()
    }

    /// Transform a position.
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    /// `self ∘ other`: `other` is applied first. Names are joined with `x`.
    pub fn compose(&self, other: &Operator) -> Operator {
        Operator {
            name: format!("{}x{}", self.name, other.name),
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }
}

/// One row of `pdbx_struct_assembly_gen`: which chains get which operators.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyGen {
    /// Chains (`label_asym_id`) the operators apply to
    pub asym_ids: Vec<String>,
    /// Operators, one chain copy each
    pub operators: Vec<Operator>,
}

/// A biological assembly definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    /// `pdbx_struct_assembly.id`
    pub id: String,
    /// Free-text description
    pub details: Option<String>,
    /// Generator rows in file order
    pub gens: Vec<AssemblyGen>,
}

/// Parse an `oper_expression` into groups of operator ids.
///
/// `1`, `1,2`, `1-5` form a single group; `(1-60)(61-88)` forms two groups whose
/// cartesian product is the list of composed operators.
///
/// # Example
///
/// ```
/// use molsurf::structure::assembly::parse_oper_expression;
///
/// let groups = parse_oper_expression("(1-3)(P)").unwrap();
/// assert_eq!(groups, vec![vec!["1", "2", "3"], vec!["P"]]);
/// ```
pub fn parse_oper_expression(expr: &str) -> Result<Vec<Vec<String>>> {
    let expr: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    if expr.is_empty() {
        return Err(SurfaceError::parse("empty operator expression"));
    }

    let groups: Vec<&str> = if expr.starts_with('(') {
        let inner = expr
            .strip_prefix('(')
            .and_then(|e| e.strip_suffix(')'))
            .ok_or_else(|| SurfaceError::parse(format!("unbalanced parentheses in '{expr}'")))?;
        inner.split(")(").collect()
    } else {
        vec![expr.as_str()]
    };

    groups
        .into_iter()
        .map(|group| {
            if group.is_empty() || group.contains(['(', ')']) {
                return Err(SurfaceError::parse(format!("malformed operator expression '{expr}'")));
            }
            let mut ids = Vec::new();
            for item in group.split(',') {
                match item.split_once('-') {
                    Some((a, b)) => {
                        let (start, end) = match (a.parse::<i64>(), b.parse::<i64>()) {
                            (Ok(s), Ok(e)) if s <= e => (s, e),
                            _ => {
                                return Err(SurfaceError::parse(format!(
                                    "invalid operator range '{item}' in '{expr}'"
                                )))
                            }
                        };
                        ids.extend((start..=end).map(|i| i.to_string()));
                    }
                    None if !item.is_empty() => ids.push(item.to_string()),
                    None => {
                        return Err(SurfaceError::parse(format!(
                            "empty operator id in '{expr}'"
                        )))
                    }
                }
            }
            Ok(ids)
        })
        .collect()
}

fn required_str(category: &Category, field: &str, row: usize) -> Result<String> {
    category
        .field(field)
        .and_then(|c| c.str(row))
        .map(|s| s.into_owned())
        .ok_or_else(|| {
            SurfaceError::parse(format!("_{}.{field} missing at row {row}", category.name()))
        })
}

fn parse_operators(block: &Block) -> Result<HashMap<String, Operator>> {
    let Some(list) = block.category("pdbx_struct_oper_list") else {
        return Ok(HashMap::new());
    };

    let mut out = HashMap::new();
    for row in 0..list.row_count() {
        let id = required_str(list, "id", row)?;
        let value = |field: String| -> Result<f64> {
            list.field(&field).and_then(|c| c.f64(row)).ok_or_else(|| {
                SurfaceError::parse(format!("_pdbx_struct_oper_list.{field} missing for operator {id}"))
            })
        };
        let mut rotation = Matrix3::zeros();
        let mut translation = Vector3::zeros();
        for i in 0..3 {
            for j in 0..3 {
                rotation[(i, j)] = value(format!("matrix[{}][{}]", i + 1, j + 1))?;
            }
            translation[i] = value(format!("vector[{}]", i + 1))?;
        }
        out.insert(id.clone(), Operator::new(id, rotation, translation));
    }
    Ok(out)
}

/// Read every assembly defined in the block, in `pdbx_struct_assembly` order.
/// Entries without assembly categories yield an empty list.
pub fn parse_assemblies(block: &Block) -> Result<Vec<Assembly>> {
    let Some(gen) = block.category("pdbx_struct_assembly_gen") else {
        return Ok(Vec::new());
    };
    let operators = parse_operators(block)?;

    let details: HashMap<String, String> = match block.category("pdbx_struct_assembly") {
        Some(asm) => (0..asm.row_count())
            .filter_map(|row| {
                let id = asm.field("id")?.str(row)?.into_owned();
                let details = asm.field("details")?.str(row)?.into_owned();
                Some((id, details))
            })
            .collect(),
        None => HashMap::new(),
    };

    let mut assemblies: Vec<Assembly> = Vec::new();
    for row in 0..gen.row_count() {
        let assembly_id = required_str(gen, "assembly_id", row)?;
        let expression = required_str(gen, "oper_expression", row)?;
        let asym_ids = required_str(gen, "asym_id_list", row)?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let groups = parse_oper_expression(&expression)?
            .into_iter()
            .map(|ids| {
                ids.into_iter()
                    .map(|id| {
                        operators.get(&id).cloned().ok_or_else(|| {
                            SurfaceError::integrity(format!(
                                "assembly {assembly_id} references unknown operator {id}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let gen_row = AssemblyGen {
            asym_ids,
            operators: cartesian(&groups),
        };
        match assemblies.iter_mut().find(|a| a.id == assembly_id) {
            Some(assembly) => assembly.gens.push(gen_row),
            None => assemblies.push(Assembly {
                details: details.get(&assembly_id).cloned(),
                id: assembly_id,
                gens: vec![gen_row],
            }),
        }
    }
    Ok(assemblies)
}

/// Compose one operator from each group; the first group varies slowest.
fn cartesian(groups: &[Vec<Operator>]) -> Vec<Operator> {
    let mut out = vec![None::<Operator>];
    for group in groups {
        out = out
            .iter()
            .flat_map(|prefix| {
                group.iter().map(move |op| {
                    Some(match prefix {
                        Some(p) => p.compose(op),
                        None => op.clone(),
                    })
                })
            })
            .collect();
    }
    out.into_iter().flatten().collect()
}
