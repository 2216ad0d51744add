//! The boundary between the surface pipeline and whatever loads, meshes and
//! exports structures.

mod fetch;
pub mod mesher;
mod native;

pub use fetch::fetch;
pub use native::NativeEngine;

use crate::errors::Result;
use crate::structure::{ChainSelection, Model, Structure, StructureKind, Trajectory};
use crate::surface::SurfaceOptions;
use std::sync::Arc;

/// On-the-wire format of a structure file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureFormat {
    /// mmCIF text
    MmCif,
    /// BinaryCIF (MessagePack), optionally gzipped
    BinaryCif,
}

impl StructureFormat {
    /// `.bcif` and `.bcif.gz` (case-insensitive) are binary, everything else is text.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.ends_with(".bcif") || lower.ends_with(".bcif.gz") {
            StructureFormat::BinaryCif
        } else {
            StructureFormat::MmCif
        }
    }

    /// Whether the format is BinaryCIF.
    pub fn is_binary(&self) -> bool {
        matches!(self, StructureFormat::BinaryCif)
    }
}

/// A triangle mesh with one group (atom) index per vertex.
///
/// `groups` may be longer than the number of real vertices; see
/// [`crate::correlation::true_vertex_count`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Flat `x, y, z` vertex positions
    pub positions: Vec<f32>,
    /// Flat `x, y, z` vertex normals
    pub normals: Vec<f32>,
    /// Unit-local atom index per vertex
    pub groups: Vec<u32>,
    /// Triangle vertex indices
    pub indices: Vec<u32>,
    /// Declared vertex count, if the producer tracks one
    pub vertex_count: Option<usize>,
    /// For a mesh merged from several units whose group indices restart per unit:
    /// the number of consecutive vertices contributed by each unit.
    pub unit_vertex_runs: Option<Vec<usize>>,
}

impl Mesh {
    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// One object produced by [`SurfaceEngine::represent`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderObject {
    /// A triangle mesh
    Mesh(Mesh),
    /// Anything that is not a triangle mesh (labels, lines, ...)
    Other {
        /// Free-form description of the object type
        kind: String,
    },
}

/// Exported geometry: OBJ text plus the material library it references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeometryExport {
    /// Wavefront OBJ text
    pub obj: String,
    /// Material library text
    pub mtl: String,
}

/// A structure/rendering engine handle.
///
/// Each call corresponds to one stage of the surface pipeline. Implementations
/// may keep state between calls (the last representation is what
/// `export_geometry` writes); [`SurfaceEngine::reset`] discards it.
pub trait SurfaceEngine {
    /// Fetch the raw bytes of a structure file.
    fn download(&mut self, url: &str, format: StructureFormat) -> Result<Vec<u8>>;

    /// Parse raw bytes into a trajectory.
    fn parse_trajectory(&mut self, data: &[u8], format: StructureFormat) -> Result<Trajectory>;

    /// Build the deposited model or an assembly.
    fn structure_from_model(&mut self, model: Arc<Model>, kind: &StructureKind) -> Result<Structure>;

    /// Restrict a structure to the selected chains.
    fn select(&mut self, structure: &Structure, selection: &ChainSelection) -> Result<Structure>;

    /// Compute the molecular surface representation of a component.
    fn represent(&mut self, component: &Structure, options: &SurfaceOptions) -> Result<Vec<RenderObject>>;

    /// Export the current representation; `name` is used for the material library.
    fn export_geometry(&mut self, name: &str) -> Result<GeometryExport>;

    /// Serialize the current state as an opaque JSON session.
    fn session_snapshot(&mut self) -> Result<String>;

    /// Drop everything loaded or computed so far.
    fn reset(&mut self);
}
