use super::assembly::Operator;
use super::model::Model;
use crate::errors::{Result, SurfaceError};
use nalgebra::Point3;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Whether a structure is the deposited model or an expanded assembly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StructureKind {
    /// The deposited asymmetric unit
    #[default]
    Model,
    /// A biological assembly, by `pdbx_struct_assembly.id`
    Assembly(String),
}

impl StructureKind {
    /// Kind for an optional assembly id.
    pub fn from_assembly_id(assembly_id: Option<&str>) -> Self {
        match assembly_id {
            Some(id) => StructureKind::Assembly(id.to_string()),
            None => StructureKind::Model,
        }
    }

    /// Assembly id, `None` for the deposited model.
    pub fn assembly_id(&self) -> Option<&str> {
        match self {
            StructureKind::Model => None,
            StructureKind::Assembly(id) => Some(id),
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureKind::Model => write!(f, "model"),
            StructureKind::Assembly(id) => write!(f, "assembly {id}"),
        }
    }
}

/// A chain of the model placed by one operator. Element order follows `_atom_site`.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    chain: usize,
    elements: Vec<usize>,
    operator: Operator,
}

impl Unit {
    /// A chain copy placed by `operator`; `elements` are model atom indices.
    pub fn new(chain: usize, elements: Vec<usize>, operator: Operator) -> Self {
        Self {
            chain,
            elements,
            operator,
        }
    }

    /// Chain row in the model.
    pub fn chain(&self) -> usize {
        self.chain
    }

    /// Atom indices into the model's atom table.
    pub fn elements(&self) -> &[usize] {
        &self.elements
    }

    /// Number of atoms.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the unit has no atoms.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Symmetry operator applied to the atom positions.
    pub fn operator(&self) -> &Operator {
        &self.operator
    }
}

/// Set-membership predicate over `label_asym_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainSelection {
    labels: HashSet<String>,
}

impl ChainSelection {
    /// Select the given `label_asym_id`s.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a chain is selected.
    pub fn contains(&self, label_asym_id: &str) -> bool {
        self.labels.contains(label_asym_id)
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// An ordered list of units over a shared model.
#[derive(Debug, Clone)]
pub struct Structure {
    model: Arc<Model>,
    units: Vec<Unit>,
    kind: StructureKind,
}

impl Structure {
    /// Assemble a structure from prebuilt units.
    pub fn new(model: Arc<Model>, units: Vec<Unit>, kind: StructureKind) -> Self {
        Self { model, units, kind }
    }

    /// The deposited model: one identity unit per chain, in chain order.
    pub fn from_model(model: Arc<Model>) -> Self {
        let units = (0..model.chains().len())
            .map(|chain| Unit::new(chain, model.chain_atoms(chain).collect(), Operator::identity()))
            .filter(|u| !u.is_empty())
            .collect();
        Self::new(model, units, StructureKind::Model)
    }

    /// Expand an assembly: for each generator row, each operator, each chain in
    /// model order whose `label_asym_id` is listed, one unit.
    pub fn from_assembly(model: Arc<Model>, assembly_id: &str) -> Result<Self> {
        let assembly = model.assembly(assembly_id).ok_or_else(|| {
            SurfaceError::input(format!(
                "entry {} has no assembly '{assembly_id}'",
                model.entry_id()
            ))
        })?;

        let chains = model.chains();
        let mut units = Vec::new();
        for gen in &assembly.gens {
            for operator in &gen.operators {
                for chain in 0..chains.len() {
                    let label = chains.label_asym_id(chain);
                    if !gen.asym_ids.iter().any(|a| a == label) {
                        continue;
                    }
                    let elements: Vec<usize> = model.chain_atoms(chain).collect();
                    if !elements.is_empty() {
                        units.push(Unit::new(chain, elements, operator.clone()));
                    }
                }
            }
        }
        let kind = StructureKind::Assembly(assembly_id.to_string());
        Ok(Self::new(model, units, kind))
    }

    /// Structure for a [`StructureKind`].
    pub fn build(model: Arc<Model>, kind: &StructureKind) -> Result<Self> {
        match kind {
            StructureKind::Model => Ok(Self::from_model(model)),
            StructureKind::Assembly(id) => Self::from_assembly(model, id),
        }
    }

    /// Shared model the units index into.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Units in emission order.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Deposited model or assembly.
    pub fn kind(&self) -> &StructureKind {
        &self.kind
    }

    /// Total number of atoms across all units.
    pub fn element_count(&self) -> usize {
        self.units.iter().map(Unit::len).sum()
    }

    /// Whether there are no atoms at all.
    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }

    /// Keep the units whose chain is selected, preserving order and kind.
    pub fn select(&self, selection: &ChainSelection) -> Structure {
        let chains = self.model.chains();
        let units = self
            .units
            .iter()
            .filter(|u| selection.contains(chains.label_asym_id(u.chain())))
            .cloned()
            .collect();
        Structure::new(self.model.clone(), units, self.kind.clone())
    }

    /// Transformed position of the `element`-th atom of unit `unit`.
    pub fn position(&self, unit: usize, element: usize) -> Point3<f64> {
        let u = &self.units[unit];
        u.operator.apply(&self.model.atoms().position(u.elements[element]))
    }

    /// Every atom of every unit in unit-major order, as
    /// `(unit index, model atom index, transformed position)`.
    pub fn atoms(&self) -> impl Iterator<Item = (usize, usize, Point3<f64>)> + '_ {
        let positions = self.model.atoms();
        self.units.iter().enumerate().flat_map(move |(i, u)| {
            u.elements
                .iter()
                .map(move |&atom| (i, atom, u.operator.apply(&positions.position(atom))))
        })
    }
}
