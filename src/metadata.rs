//! `.metadata.json` output.
//!
//! The file is a two-level object of arrays with every array on its own line:
//!
//! ```text
//! {
//!   "group_properties": {
//!     "atom_id": [1,2,3],
//!     "label_atom_id": ["N","CA","C"]
//!   },
//!   "vertex_properties": {
//!     "group_index": [0,0,1,2]
//!   }
//! }
//! ```

use crate::correlation::SurfaceMetadata;
use crate::errors::{Result, SurfaceError};
use serde::Serialize;
use serde_json::ser::Formatter;
use std::io;
use std::path::Path;
use tracing::debug;

/// Indents object keys by nesting depth and keeps arrays compact.
#[derive(Debug, Default)]
pub struct MetadataFormatter {
    depth: usize,
}

impl Formatter for MetadataFormatter {
    fn begin_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.depth += 1;
        writer.write_all(b"{")
    }

    fn end_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            writer.write_all(b"\n}\n")
        } else {
            writer.write_all(b"\n")?;
            writer.write_all("  ".repeat(self.depth).as_bytes())?;
            writer.write_all(b"}")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !first {
            writer.write_all(b",")?;
        }
        writer.write_all(b"\n")?;
        writer.write_all("  ".repeat(self.depth).as_bytes())
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Serialize any value with [`MetadataFormatter`].
pub fn to_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, MetadataFormatter::default());
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| SurfaceError::integrity(format!("metadata is not UTF-8: {e}")))
}

/// Write surface metadata to `path`.
pub fn write_metadata(path: &Path, metadata: &SurfaceMetadata) -> Result<()> {
    let text = to_string(metadata)?;
    std::fs::write(path, text)?;
    debug!("Wrote metadata to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{GroupProperties, VertexProperties};
    use serde_json::json;

    #[test]
    fn arrays_on_their_own_lines() {
        let value = json!({
            "group_properties": {"atom_id": [1, 2], "name": ["N", "CA"]},
            "vertex_properties": {"group_index": [0, 1, 1]}
        });
        assert_eq!(
            to_string(&value).unwrap(),
            "{\n  \"group_properties\": {\n    \"atom_id\": [1,2],\n    \"name\": [\"N\",\"CA\"]\n  },\n  \"vertex_properties\": {\n    \"group_index\": [0,1,1]\n  }\n}\n"
        );
    }

    #[test]
    fn surface_metadata_layout() {
        let metadata = SurfaceMetadata {
            group_properties: GroupProperties {
                atom_id: vec![7],
                label_atom_id: vec!["OH".into()],
                label_comp_id: vec!["TYR".into()],
                label_seq_id: vec![12],
                label_asym_id: vec!["A".into()],
                auth_asym_id: vec!["B".into()],
                label_entity_id: vec!["1".into()],
                residue_hydrophobicity_dgwif: vec![Some(-0.94)],
            },
            vertex_properties: VertexProperties {
                group_index: vec![0, 0],
                x: Some(vec![1.5, 2.0]),
                ..Default::default()
            },
        };
        let text = to_string(&metadata).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "{");
        assert_eq!(lines[1], "  \"group_properties\": {");
        assert_eq!(lines[2], "    \"atom_id\": [7],");
        assert_eq!(lines[9], "    \"residue_hydrophobicity_DGwif\": [-0.94]");
        assert_eq!(lines[10], "  },");
        assert_eq!(lines[12], "    \"group_index\": [0,0],");
        assert_eq!(lines[13], "    \"x\": [1.5,2.0]");
        assert_eq!(lines.last(), Some(&"}"));
        assert!(text.ends_with("}\n"));

        // Still plain JSON
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["group_properties"]["auth_asym_id"][0], "B");
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1abc.metadata.json");
        write_metadata(&path, &SurfaceMetadata::default()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"group_properties\": {\n    \"atom_id\": [],"));
    }
}
