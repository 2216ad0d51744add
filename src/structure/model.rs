use super::assembly::{parse_assemblies, Assembly};
use super::cif::{Block, Category, Column};
use super::tables::{AtomTable, ChainTable, EntityTable, EntityType, ResidueTable};
use crate::errors::{Result, SurfaceError};
use crate::residues::is_water;
use nalgebra::Point3;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// A single model (one `pdbx_PDB_model_num`) of an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    entry_id: String,
    model_num: i32,
    entities: EntityTable,
    chains: ChainTable,
    residues: ResidueTable,
    atoms: AtomTable,
    atom_residue: Vec<usize>,
    chain_atoms: Vec<Range<usize>>,
    assemblies: Vec<Assembly>,
}

impl Model {
    /// Assemble a model from validated tables.
    ///
    /// `chain_atoms[i]` is the contiguous atom range of chain row `i`, and
    /// `atom_residue[a]` the residue row of atom `a`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entry_id: String,
        model_num: i32,
        entities: EntityTable,
        chains: ChainTable,
        residues: ResidueTable,
        atoms: AtomTable,
        atom_residue: Vec<usize>,
        chain_atoms: Vec<Range<usize>>,
        assemblies: Vec<Assembly>,
    ) -> Result<Self> {
        if atom_residue.len() != atoms.len() {
            return Err(SurfaceError::integrity(format!(
                "atom-to-residue index has {} rows for {} atoms",
                atom_residue.len(),
                atoms.len()
            )));
        }
        if let Some(&bad) = atom_residue.iter().find(|&&r| r >= residues.len()) {
            return Err(SurfaceError::integrity(format!(
                "residue index {bad} out of range for {} residues",
                residues.len()
            )));
        }
        if chain_atoms.len() != chains.len() {
            return Err(SurfaceError::integrity(format!(
                "{} atom ranges for {} chains",
                chain_atoms.len(),
                chains.len()
            )));
        }
        let mut next = 0;
        for range in &chain_atoms {
            if range.start != next || range.end < range.start {
                return Err(SurfaceError::integrity(
                    "chain atom ranges must be contiguous and in order",
                ));
            }
            next = range.end;
        }
        if next != atoms.len() {
            return Err(SurfaceError::integrity(format!(
                "chain atom ranges cover {next} of {} atoms",
                atoms.len()
            )));
        }

        Ok(Self {
            entry_id,
            model_num,
            entities,
            chains,
            residues,
            atoms,
            atom_residue,
            chain_atoms,
            assemblies,
        })
    }

    /// Entry id (`_entry.id`, or the data block name).
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// `pdbx_PDB_model_num` of this model.
    pub fn model_num(&self) -> i32 {
        self.model_num
    }

    /// Entity table.
    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    /// Chain (`label_asym_id`) table.
    pub fn chains(&self) -> &ChainTable {
        &self.chains
    }

    /// Residue table.
    pub fn residues(&self) -> &ResidueTable {
        &self.residues
    }

    /// Atom table.
    pub fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    /// Assemblies declared in the file.
    pub fn assemblies(&self) -> &[Assembly] {
        &self.assemblies
    }

    /// Assembly by id.
    pub fn assembly(&self, id: &str) -> Option<&Assembly> {
        self.assemblies.iter().find(|a| a.id == id)
    }

    /// Atom indices of chain row `chain`.
    pub fn chain_atoms(&self, chain: usize) -> Range<usize> {
        self.chain_atoms[chain].clone()
    }

    /// Residue row of an atom.
    pub fn atom_residue(&self, atom: usize) -> usize {
        self.atom_residue[atom]
    }

    /// `label_seq_id` of the residue an atom belongs to.
    pub fn atom_label_seq_id(&self, atom: usize) -> Option<i32> {
        self.residues.label_seq_id(self.atom_residue[atom])
    }
}

/// All models parsed from one data block.
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    models: Vec<Arc<Model>>,
}

impl Trajectory {
    /// Wrap already built models.
    pub fn new(models: Vec<Model>) -> Self {
        Self {
            models: models.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build every model of a parsed mmCIF / BinaryCIF block.
    pub fn from_block(block: &Block) -> Result<Self> {
        Ok(Self::new(build_models(block)?))
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether there are no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model at `index`, if present.
    pub fn model(&self, index: usize) -> Option<Arc<Model>> {
        self.models.get(index).cloned()
    }
}

/// Accessors over `_atom_site` with the usual label/auth fallbacks.
struct AtomSite<'a> {
    category: &'a Category,
}

impl<'a> AtomSite<'a> {
    fn column(&self, names: &[&str]) -> Option<&'a Column> {
        names.iter().find_map(|n| self.category.field(n))
    }

    fn required(&self, names: &[&str]) -> Result<&'a Column> {
        self.column(names).ok_or_else(|| {
            SurfaceError::parse(format!("_atom_site is missing column {}", names[0]))
        })
    }
}

fn text(column: Option<&Column>, row: usize) -> String {
    column
        .and_then(|c| c.str(row))
        .map(|s| s.into_owned())
        .unwrap_or_default()
}

fn build_models(block: &Block) -> Result<Vec<Model>> {
    let category = block
        .category("atom_site")
        .ok_or_else(|| SurfaceError::parse("no _atom_site category"))?;
    let site = AtomSite { category };
    let n = category.row_count();

    let x = site.required(&["Cartn_x"])?;
    let y = site.required(&["Cartn_y"])?;
    let z = site.required(&["Cartn_z"])?;
    let label_asym = site.required(&["label_asym_id", "auth_asym_id"])?;
    let auth_asym = site.column(&["auth_asym_id", "label_asym_id"]);
    let atom_id = site.column(&["id"]);
    let type_symbol = site.column(&["type_symbol"]);
    let label_atom = site.column(&["label_atom_id", "auth_atom_id"]);
    let label_comp = site.column(&["label_comp_id", "auth_comp_id"]);
    let label_seq = site.column(&["label_seq_id"]);
    let auth_seq = site.column(&["auth_seq_id"]);
    let ins_code = site.column(&["pdbx_PDB_ins_code"]);
    let model_num = site.column(&["pdbx_PDB_model_num"]);
    let group_pdb = site.column(&["group_PDB"]);

    let asym_entity = struct_asym_entities(block);
    let label_entity = site.column(&["label_entity_id"]);
    let entity_of = |row: usize, asym: &str| -> Result<String> {
        label_entity
            .and_then(|c| c.str(row))
            .map(|s| s.into_owned())
            .or_else(|| asym_entity.get(asym).cloned())
            .ok_or_else(|| SurfaceError::parse(format!("no entity id for chain {asym}")))
    };

    // Rows grouped by model number, in order of first appearance
    let mut model_rows: Vec<(i32, Vec<usize>)> = Vec::new();
    for row in 0..n {
        let num = model_num.and_then(|c| c.i32(row)).unwrap_or(1);
        match model_rows.iter_mut().find(|(m, _)| *m == num) {
            Some((_, rows)) => rows.push(row),
            None => model_rows.push((num, vec![row])),
        }
    }
    if model_rows.is_empty() {
        model_rows.push((1, Vec::new()));
    }

    let entry_id = block
        .category("entry")
        .and_then(|c| c.field("id"))
        .and_then(|c| c.str(0))
        .map_or_else(|| block.name.clone(), |s| s.into_owned());
    let assemblies = parse_assemblies(block)?;
    let declared_entities = entity_table(block)?;

    let mut models = Vec::with_capacity(model_rows.len());
    for (num, rows) in model_rows {
        let mut ids = Vec::with_capacity(rows.len());
        let mut symbols = Vec::with_capacity(rows.len());
        let mut atom_names = Vec::with_capacity(rows.len());
        let mut comps = Vec::with_capacity(rows.len());
        let mut positions = Vec::with_capacity(rows.len());

        let mut chain_label = Vec::new();
        let mut chain_auth = Vec::new();
        let mut chain_entity = Vec::new();
        let mut chain_atoms: Vec<Range<usize>> = Vec::new();

        let mut seq_ids = Vec::new();
        let mut atom_residue = Vec::with_capacity(rows.len());
        let mut residue_key: Option<(usize, Option<i32>, Option<i32>, String)> = None;
        // Entities seen on ATOM records, for synthesizing a missing _entity table
        let mut entity_has_atom: Vec<(String, bool, bool)> = Vec::new();

        for (atom, &row) in rows.iter().enumerate() {
            let label = text(Some(label_asym), row);
            if chain_label.last() != Some(&label) {
                if let Some(last) = chain_atoms.last_mut() {
                    last.end = atom;
                }
                chain_entity.push(entity_of(row, &label)?);
                chain_auth.push(
                    auth_asym
                        .and_then(|c| c.str(row))
                        .map_or_else(|| label.clone(), |s| s.into_owned()),
                );
                chain_label.push(label);
                chain_atoms.push(atom..atom);
            }
            let chain = chain_label.len() - 1;

            let comp = text(label_comp, row);
            let seq = label_seq.and_then(|c| c.i32(row));
            let key = (chain, seq, auth_seq.and_then(|c| c.i32(row)), text(ins_code, row));
            if residue_key.as_ref() != Some(&key) {
                seq_ids.push(seq);
                residue_key = Some(key);
            }
            atom_residue.push(seq_ids.len() - 1);

            let position = match (x.f64(row), y.f64(row), z.f64(row)) {
                (Some(x), Some(y), Some(z)) => Point3::new(x, y, z),
                _ => {
                    return Err(SurfaceError::parse(format!(
                        "_atom_site row {} has no coordinates",
                        row + 1
                    )))
                }
            };

            let entity = &chain_entity[chain];
            let is_atom = group_pdb.and_then(|c| c.str(row)).is_some_and(|g| g == "ATOM");
            let water = is_water(&comp);
            match entity_has_atom.iter_mut().find(|(e, _, _)| e == entity) {
                Some(seen) => {
                    seen.1 |= is_atom;
                    seen.2 &= water;
                }
                None => entity_has_atom.push((entity.clone(), is_atom, water)),
            }

            ids.push(atom_id.and_then(|c| c.i32(row)).unwrap_or(row as i32 + 1));
            symbols.push(text(type_symbol, row));
            atom_names.push(text(label_atom, row));
            comps.push(comp);
            positions.push(position);
        }
        if let Some(last) = chain_atoms.last_mut() {
            last.end = rows.len();
        }

        let entities = match &declared_entities {
            Some(table) => table.clone(),
            None => {
                debug!("No _entity category, synthesizing {} entities", entity_has_atom.len());
                let (entity_ids, kinds) = entity_has_atom
                    .into_iter()
                    .map(|(id, polymer, water)| {
                        let kind = if water {
                            EntityType::Water
                        } else if polymer {
                            EntityType::Polymer
                        } else {
                            EntityType::NonPolymer
                        };
                        (id, kind)
                    })
                    .unzip();
                EntityTable::new(entity_ids, kinds)?
            }
        };

        models.push(Model::new(
            entry_id.clone(),
            num,
            entities,
            ChainTable::new(chain_label, chain_auth, chain_entity)?,
            ResidueTable::new(seq_ids),
            AtomTable::new(ids, symbols, atom_names, comps, positions)?,
            atom_residue,
            chain_atoms,
            assemblies.clone(),
        )?);
    }
    debug!("Parsed {} model(s) for entry {entry_id}", models.len());
    Ok(models)
}

fn entity_table(block: &Block) -> Result<Option<EntityTable>> {
    let Some(entity) = block.category("entity") else {
        return Ok(None);
    };
    let ids = entity
        .field("id")
        .ok_or_else(|| SurfaceError::parse("_entity.id is missing"))?;
    let types = entity.field("type");
    let (id, kind) = (0..entity.row_count())
        .map(|row| {
            (
                text(Some(ids), row),
                types
                    .and_then(|c| c.str(row))
                    .map_or(EntityType::Unknown, |t| EntityType::from_cif(&t)),
            )
        })
        .unzip();
    EntityTable::new(id, kind).map(Some)
}

fn struct_asym_entities(block: &Block) -> HashMap<String, String> {
    let Some(asym) = block.category("struct_asym") else {
        return HashMap::new();
    };
    let (Some(ids), Some(entities)) = (asym.field("id"), asym.field("entity_id")) else {
        return HashMap::new();
    };
    (0..asym.row_count())
        .filter_map(|row| Some((ids.str(row)?.into_owned(), entities.str(row)?.into_owned())))
        .collect()
}
