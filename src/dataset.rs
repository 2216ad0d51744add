//! Input datasets: structure references and output filenames.
//!
//! A reference looks like `{entry_id}_{assembly_id}-{auth_chain_id}`, e.g. `1e94_3-E`.
//! The assembly part is omitted to process the deposited model and the chain part
//! is omitted to process all polymer chains. `,` is accepted in place of `-`.

use crate::errors::{Result, SurfaceError};
use crate::surface::StructureRef;
use std::path::Path;

/// Placeholder in URL templates replaced by the entry id.
pub const ENTRY_ID_PLACEHOLDER: &str = "{id}";

/// One line of an input dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRef {
    /// PDB entry identifier or equivalent
    pub entry_id: String,
    /// Assembly to process, or `None` for the deposited model
    pub assembly_id: Option<String>,
    /// `auth_asym_id` of the selected chain, or `None` for all polymer chains
    pub auth_chain_id: Option<String>,
}

impl ChainRef {
    /// Parse a chain reference such as `1e94`, `1e94-E`, `1e94_3` or `1e94_3-E`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut parts = text.split(['-', ',']);
        let structure = parts.next().unwrap_or_default();
        let chain = parts.next();
        if parts.next().is_some() {
            return Err(SurfaceError::input(format!(
                "reference '{text}' has more than one chain separator"
            )));
        }

        let mut struct_parts = structure.split('_');
        let entry_id = struct_parts.next().unwrap_or_default();
        let assembly = struct_parts.next();
        if struct_parts.next().is_some() {
            return Err(SurfaceError::input(format!(
                "reference '{text}' has more than one assembly separator"
            )));
        }
        if entry_id.is_empty() {
            return Err(SurfaceError::input(format!(
                "reference '{text}' has an empty entry id"
            )));
        }

        Ok(Self {
            entry_id: entry_id.to_string(),
            assembly_id: non_empty(assembly),
            auth_chain_id: non_empty(chain),
        })
    }

    /// Output filename without extension: `entry[_assembly][-chain]`.
    pub fn filename(&self) -> String {
        let mut out = self.entry_id.clone();
        if let Some(assembly_id) = &self.assembly_id {
            out.push('_');
            out.push_str(assembly_id);
        }
        if let Some(chain_id) = &self.auth_chain_id {
            out.push('-');
            out.push_str(chain_id);
        }
        out
    }

    /// Resolve this reference against a source URL template containing `{id}`.
    pub fn to_structure_ref(&self, source_template: &str) -> StructureRef {
        StructureRef {
            url: source_template.replace(ENTRY_ID_PLACEHOLDER, &self.entry_id),
            assembly_id: self.assembly_id.clone(),
            auth_chain_id: self.auth_chain_id.clone(),
        }
    }
}

fn non_empty(part: Option<&str>) -> Option<String> {
    part.map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Parse the contents of a dataset file.
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_dataset(contents: &str) -> Result<Vec<ChainRef>> {
    contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            ChainRef::parse(line).map_err(|e| match e {
                SurfaceError::Input(msg) => SurfaceError::input(format!("line {line_no}: {msg}")),
                other => other,
            })
        })
        .collect()
}

/// Read and parse a UTF-8 dataset file.
pub fn load_dataset(path: &Path) -> Result<Vec<ChainRef>> {
    let contents = std::fs::read_to_string(path)?;
    parse_dataset(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_reference() {
        let chain_ref = ChainRef::parse("1abc_1-A").unwrap();
        assert_eq!(chain_ref.entry_id, "1abc");
        assert_eq!(chain_ref.assembly_id.as_deref(), Some("1"));
        assert_eq!(chain_ref.auth_chain_id.as_deref(), Some("A"));
        assert_eq!(chain_ref.filename(), "1abc_1-A");
    }

    #[test]
    fn parse_entry_only() {
        let chain_ref = ChainRef::parse("1abc").unwrap();
        assert_eq!(chain_ref.entry_id, "1abc");
        assert_eq!(chain_ref.assembly_id, None);
        assert_eq!(chain_ref.auth_chain_id, None);
        assert_eq!(chain_ref.filename(), "1abc");
    }

    #[test]
    fn parse_comma_separator_and_partial_forms() {
        let chain_ref = ChainRef::parse("1e94,E").unwrap();
        assert_eq!(chain_ref.assembly_id, None);
        assert_eq!(chain_ref.auth_chain_id.as_deref(), Some("E"));
        assert_eq!(chain_ref.filename(), "1e94-E");

        let chain_ref = ChainRef::parse("1e94_3").unwrap();
        assert_eq!(chain_ref.assembly_id.as_deref(), Some("3"));
        assert_eq!(chain_ref.filename(), "1e94_3");

        // Empty components behave as if they were omitted
        let chain_ref = ChainRef::parse("1e94_-E").unwrap();
        assert_eq!(chain_ref.assembly_id, None);
        assert_eq!(chain_ref.filename(), "1e94-E");
    }

    #[test]
    fn malformed_references() {
        assert!(matches!(ChainRef::parse(""), Err(SurfaceError::Input(_))));
        assert!(matches!(ChainRef::parse("_1-A"), Err(SurfaceError::Input(_))));
        assert!(matches!(ChainRef::parse("1abc-A-B"), Err(SurfaceError::Input(_))));
        assert!(matches!(ChainRef::parse("1abc_1_2"), Err(SurfaceError::Input(_))));
    }

    #[test]
    fn dataset_skips_comments_and_blank_lines() {
        let contents = "# header\n1abc_1-A\n\n   \n  # indented comment\n2xyz\n";
        let refs = parse_dataset(contents).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].filename(), "1abc_1-A");
        assert_eq!(refs[1].filename(), "2xyz");
    }

    #[test]
    fn dataset_error_reports_line_number() {
        let err = parse_dataset("1abc\n1abc-A-B\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn structure_ref_from_template() {
        let chain_ref = ChainRef::parse("1e94_3-E").unwrap();
        let structure_ref =
            chain_ref.to_structure_ref("https://example.org/download/{id}_updated.cif");
        assert_eq!(structure_ref.url, "https://example.org/download/1e94_updated.cif");
        assert_eq!(structure_ref.assembly_id.as_deref(), Some("3"));
        assert_eq!(structure_ref.auth_chain_id.as_deref(), Some("E"));
    }
}
