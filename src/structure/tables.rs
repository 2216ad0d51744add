//! Fixed-schema columnar tables. Row counts are validated once at construction;
//! afterwards every accessor indexes parallel vectors of the same length.

use crate::errors::{Result, SurfaceError};
use nalgebra::Point3;

/// `_entity.type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// Biopolymer chain
    Polymer,
    /// Ligand
    NonPolymer,
    /// Oligosaccharide
    Branched,
    /// Macrocycle
    Macrolide,
    /// Solvent
    Water,
    /// Anything else
    Unknown,
}

impl EntityType {
    /// Parse the mmCIF vocabulary; anything unrecognised is `Unknown`.
    pub fn from_cif(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "polymer" => EntityType::Polymer,
            "non-polymer" => EntityType::NonPolymer,
            "branched" => EntityType::Branched,
            "macrolide" => EntityType::Macrolide,
            "water" => EntityType::Water,
            _ => EntityType::Unknown,
        }
    }

    /// Only polymer entities are surfaced by default.
    pub fn is_polymer(&self) -> bool {
        matches!(self, EntityType::Polymer)
    }
}

fn check_len(table: &str, column: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SurfaceError::integrity(format!(
            "{table}.{column} has {actual} rows, expected {expected}"
        )));
    }
    Ok(())
}

/// Entity table: one row per entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTable {
    id: Vec<String>,
    kind: Vec<EntityType>,
}

impl EntityTable {
    /// Entity ids with their types; both columns must have the same length.
    pub fn new(id: Vec<String>, kind: Vec<EntityType>) -> Result<Self> {
        check_len("entity", "type", id.len(), kind.len())?;
        Ok(Self { id, kind })
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.id.len()
    }

    /// Whether there are no entities.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Entity id at `row`.
    pub fn id(&self, row: usize) -> &str {
        &self.id[row]
    }

    /// Entity type at `row`.
    pub fn kind(&self, row: usize) -> EntityType {
        self.kind[row]
    }

    /// Iterate `(id, type)` rows in table order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, EntityType)> {
        self.id.iter().map(String::as_str).zip(self.kind.iter().copied())
    }
}

/// Chain table: one row per `label_asym_id` chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainTable {
    label_asym_id: Vec<String>,
    auth_asym_id: Vec<String>,
    label_entity_id: Vec<String>,
}

impl ChainTable {
    /// Chain rows; all columns must have the same length.
    pub fn new(
        label_asym_id: Vec<String>,
        auth_asym_id: Vec<String>,
        label_entity_id: Vec<String>,
    ) -> Result<Self> {
        let n = label_asym_id.len();
        check_len("chain", "auth_asym_id", n, auth_asym_id.len())?;
        check_len("chain", "label_entity_id", n, label_entity_id.len())?;
        Ok(Self {
            label_asym_id,
            auth_asym_id,
            label_entity_id,
        })
    }

    /// Number of chains.
    pub fn len(&self) -> usize {
        self.label_asym_id.len()
    }

    /// Whether there are no chains.
    pub fn is_empty(&self) -> bool {
        self.label_asym_id.is_empty()
    }

    /// Internal chain id at `row`.
    pub fn label_asym_id(&self, row: usize) -> &str {
        &self.label_asym_id[row]
    }

    /// Author chain id at `row`.
    pub fn auth_asym_id(&self, row: usize) -> &str {
        &self.auth_asym_id[row]
    }

    /// Entity id of the chain at `row`.
    pub fn label_entity_id(&self, row: usize) -> &str {
        &self.label_entity_id[row]
    }

    /// Iterate `(label_asym_id, auth_asym_id, label_entity_id)` rows in table order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        (0..self.len()).map(|i| {
            (
                self.label_asym_id(i),
                self.auth_asym_id(i),
                self.label_entity_id(i),
            )
        })
    }
}

/// Residue table: one row per residue segment of `_atom_site`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidueTable {
    label_seq_id: Vec<Option<i32>>,
}

impl ResidueTable {
    /// Residues with their `label_seq_id`.
    pub fn new(label_seq_id: Vec<Option<i32>>) -> Self {
        Self { label_seq_id }
    }

    /// Number of residues.
    pub fn len(&self) -> usize {
        self.label_seq_id.len()
    }

    /// Whether there are no residues.
    pub fn is_empty(&self) -> bool {
        self.label_seq_id.is_empty()
    }

    /// `label_seq_id`, absent for non-polymer residues.
    pub fn label_seq_id(&self, row: usize) -> Option<i32> {
        self.label_seq_id[row]
    }
}

/// Atom table: one row per atom of a single model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomTable {
    id: Vec<i32>,
    type_symbol: Vec<String>,
    label_atom_id: Vec<String>,
    label_comp_id: Vec<String>,
    position: Vec<Point3<f64>>,
}

impl AtomTable {
    /// Atom rows; all columns must have the same length.
    pub fn new(
        id: Vec<i32>,
        type_symbol: Vec<String>,
        label_atom_id: Vec<String>,
        label_comp_id: Vec<String>,
        position: Vec<Point3<f64>>,
    ) -> Result<Self> {
        let n = id.len();
        check_len("atom", "type_symbol", n, type_symbol.len())?;
        check_len("atom", "label_atom_id", n, label_atom_id.len())?;
        check_len("atom", "label_comp_id", n, label_comp_id.len())?;
        check_len("atom", "position", n, position.len())?;
        Ok(Self {
            id,
            type_symbol,
            label_atom_id,
            label_comp_id,
            position,
        })
    }

    /// Number of atoms.
    pub fn len(&self) -> usize {
        self.id.len()
    }

    /// Whether there are no atoms.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// `_atom_site.id` at `row`.
    pub fn id(&self, row: usize) -> i32 {
        self.id[row]
    }

    /// Element symbol at `row`.
    pub fn type_symbol(&self, row: usize) -> &str {
        &self.type_symbol[row]
    }

    /// Atom name at `row`.
    pub fn label_atom_id(&self, row: usize) -> &str {
        &self.label_atom_id[row]
    }

    /// Residue name at `row`.
    pub fn label_comp_id(&self, row: usize) -> &str {
        &self.label_comp_id[row]
    }

    /// Cartesian position in the model frame (before any assembly operator).
    pub fn position(&self, row: usize) -> Point3<f64> {
        self.position[row]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_types() {
        assert_eq!(EntityType::from_cif("polymer"), EntityType::Polymer);
        assert_eq!(EntityType::from_cif("Non-Polymer"), EntityType::NonPolymer);
        assert_eq!(EntityType::from_cif("water"), EntityType::Water);
        assert_eq!(EntityType::from_cif("something"), EntityType::Unknown);
        assert!(!EntityType::Branched.is_polymer());
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let err = ChainTable::new(
            vec!["A".into(), "B".into()],
            vec!["A".into()],
            vec!["1".into(), "1".into()],
        )
        .unwrap_err();
        assert!(matches!(err, SurfaceError::DataIntegrity(_)));

        assert!(EntityTable::new(vec!["1".into()], vec![]).is_err());
    }

    #[test]
    fn chain_rows_in_order() {
        let chains = ChainTable::new(
            vec!["A".into(), "B".into()],
            vec!["X".into(), "Y".into()],
            vec!["1".into(), "2".into()],
        )
        .unwrap();
        let rows: Vec<_> = chains.rows().collect();
        assert_eq!(rows, vec![("A", "X", "1"), ("B", "Y", "2")]);
    }
}
