//! Translation between author (`auth_asym_id`) and internal (`label_asym_id`) chain ids.

use crate::errors::{Result, SurfaceError};
use crate::structure::{ChainTable, EntityTable, EntityType, Model};
use std::collections::HashMap;

/// Bidirectional chain-id index of one model.
///
/// `label_to_auth` covers every chain row. `auth_to_label` only holds polymer
/// chains; when several polymer chains share an author id the first one in
/// chain-table order wins. Iteration over `auth_to_label` follows insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainMapping {
    label_to_auth: HashMap<String, String>,
    auth_to_label: Vec<(String, String)>,
    auth_index: HashMap<String, usize>,
}

impl ChainMapping {
    /// Build the mapping from the entity and chain tables.
    ///
    /// # Errors
    ///
    /// `SurfaceError::DataIntegrity` when an entity id is declared twice or a
    /// chain references an entity that does not exist.
    pub fn build(entities: &EntityTable, chains: &ChainTable) -> Result<Self> {
        let mut entity_types: HashMap<&str, EntityType> = HashMap::with_capacity(entities.len());
        for (id, kind) in entities.rows() {
            if entity_types.insert(id, kind).is_some() {
                return Err(SurfaceError::integrity(format!("duplicate entity id '{id}'")));
            }
        }

        let mut mapping = ChainMapping::default();
        for (label, auth, entity) in chains.rows() {
            let kind = entity_types.get(entity).ok_or_else(|| {
                SurfaceError::integrity(format!(
                    "chain {label} references unknown entity '{entity}'"
                ))
            })?;
            mapping.label_to_auth.insert(label.to_string(), auth.to_string());

            if kind.is_polymer() && !mapping.auth_index.contains_key(auth) {
                mapping
                    .auth_index
                    .insert(auth.to_string(), mapping.auth_to_label.len());
                mapping
                    .auth_to_label
                    .push((auth.to_string(), label.to_string()));
            }
        }
        Ok(mapping)
    }

    /// Shorthand for [`ChainMapping::build`] over a model's tables.
    pub fn from_model(model: &Model) -> Result<Self> {
        Self::build(model.entities(), model.chains())
    }

    /// Author chain id of an internal chain id.
    pub fn auth_of(&self, label_asym_id: &str) -> Option<&str> {
        self.label_to_auth.get(label_asym_id).map(String::as_str)
    }

    /// Internal chain id of a polymer author chain id.
    pub fn label_of(&self, auth_asym_id: &str) -> Option<&str> {
        self.auth_index
            .get(auth_asym_id)
            .map(|&i| self.auth_to_label[i].1.as_str())
    }

    /// `(auth_asym_id, label_asym_id)` polymer pairs in insertion order.
    pub fn polymer_chains(&self) -> impl Iterator<Item = (&str, &str)> {
        self.auth_to_label
            .iter()
            .map(|(a, l)| (a.as_str(), l.as_str()))
    }

    /// Number of chain rows covered by `label_to_auth`.
    pub fn label_count(&self) -> usize {
        self.label_to_auth.len()
    }
}

/// Internal chain ids to keep for an optional author chain id.
///
/// With an author id the result has at most one element (empty when the id is
/// not a polymer chain). Without one, every polymer chain is returned in
/// insertion order.
pub fn resolve_selection(mapping: &ChainMapping, auth_chain_id: Option<&str>) -> Vec<String> {
    match auth_chain_id {
        Some(auth) => mapping.label_of(auth).map(str::to_string).into_iter().collect(),
        None => mapping
            .polymer_chains()
            .map(|(_, label)| label.to_string())
            .collect(),
    }
}
