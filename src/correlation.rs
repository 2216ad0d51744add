//! Correlate surface mesh vertices with the atoms they were generated from.
//!
//! Every atom of the surfaced component gets a global group index: its
//! position in unit-major order. Per-atom annotations are written as parallel
//! arrays indexed by that group index, and every kept mesh vertex records the
//! group index of its atom.

use crate::engine::Mesh;
use crate::errors::{Result, SurfaceError};
use crate::residues::{residue_hydrophobicity, HydrophobicityScale};
use crate::structure::{Structure, Unit};
use serde::Serialize;
use tracing::{debug, trace};

/// What to include in the per-vertex output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Also write the `x`, `y`, `z` vertex positions
    pub include_positions: bool,
}

/// Per-atom annotations, one entry per global group index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupProperties {
    /// `_atom_site.id`
    pub atom_id: Vec<i32>,
    /// Atom name
    pub label_atom_id: Vec<String>,
    /// Residue name
    pub label_comp_id: Vec<String>,
    /// 0 for atoms without a sequence position (ligands, water)
    pub label_seq_id: Vec<i32>,
    /// Internal chain id
    pub label_asym_id: Vec<String>,
    /// Author chain id
    pub auth_asym_id: Vec<String>,
    /// Entity id of the chain
    pub label_entity_id: Vec<String>,
    /// Wimley-White water-to-interface hydrophobicity of the residue, `None` for non-amino acids
    #[serde(rename = "residue_hydrophobicity_DGwif")]
    pub residue_hydrophobicity_dgwif: Vec<Option<f64>>,
}

impl GroupProperties {
    /// Number of atoms (groups).
    pub fn len(&self) -> usize {
        self.atom_id.len()
    }

    /// Whether there are no atoms.
    pub fn is_empty(&self) -> bool {
        self.atom_id.is_empty()
    }
}

/// Per-vertex annotations over all kept vertices of all meshes, in mesh order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VertexProperties {
    /// Global group index of every kept vertex
    pub group_index: Vec<usize>,
    /// Vertex x coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<Vec<f32>>,
    /// Vertex y coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<Vec<f32>>,
    /// Vertex z coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<Vec<f32>>,
}

/// Everything written to a `.metadata.json` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurfaceMetadata {
    /// Per-atom annotations
    pub group_properties: GroupProperties,
    /// Per-vertex annotations
    pub vertex_properties: VertexProperties,
}

/// Global group index of the first atom of every unit (exclusive prefix sum of
/// the unit sizes).
pub fn group_offsets(units: &[Unit]) -> Vec<usize> {
    units
        .iter()
        .scan(0, |next, unit| {
            let offset = *next;
            *next += unit.len();
            Some(offset)
        })
        .collect()
}

/// Collect the per-atom annotations of every unit, in unit-major order.
pub fn group_properties(structure: &Structure) -> GroupProperties {
    let model = structure.model();
    let atoms = model.atoms();
    let chains = model.chains();

    let n = structure.element_count();
    let mut props = GroupProperties {
        atom_id: Vec::with_capacity(n),
        label_atom_id: Vec::with_capacity(n),
        label_comp_id: Vec::with_capacity(n),
        label_seq_id: Vec::with_capacity(n),
        label_asym_id: Vec::with_capacity(n),
        auth_asym_id: Vec::with_capacity(n),
        label_entity_id: Vec::with_capacity(n),
        residue_hydrophobicity_dgwif: Vec::with_capacity(n),
    };

    for unit in structure.units() {
        let chain = unit.chain();
        for &atom in unit.elements() {
            let comp_id = atoms.label_comp_id(atom);
            props.atom_id.push(atoms.id(atom));
            props.label_atom_id.push(atoms.label_atom_id(atom).to_string());
            props.label_comp_id.push(comp_id.to_string());
            props.label_seq_id.push(model.atom_label_seq_id(atom).unwrap_or(0));
            props.label_asym_id.push(chains.label_asym_id(chain).to_string());
            props.auth_asym_id.push(chains.auth_asym_id(chain).to_string());
            props.label_entity_id.push(chains.label_entity_id(chain).to_string());
            props
                .residue_hydrophobicity_dgwif
                .push(residue_hydrophobicity(comp_id, HydrophobicityScale::WaterInterface));
        }
    }
    props
}

/// Number of real vertices in a mesh.
///
/// The group buffer may be over-allocated; when the mesh declares a vertex
/// count, only that many entries are meaningful.
pub fn true_vertex_count(mesh: &Mesh) -> usize {
    match mesh.vertex_count {
        Some(declared) => declared.min(mesh.groups.len()),
        None => mesh.groups.len(),
    }
}

/// Map every kept vertex of every mesh to its global group index.
///
/// # Arguments
///
/// * `meshes` - Meshes in emission order; mesh `i` belongs to unit `i`
/// * `offsets` - Output of [`group_offsets`]
/// * `total_groups` - Total atom count across all units
/// * `include_positions` - Also copy out the vertex positions
///
/// # Errors
///
/// `SurfaceError::DataIntegrity` when there are more meshes than units, the
/// unit runs of a merged mesh do not cover its vertices, the position buffer is
/// too short, or a vertex points past the last group.
pub fn vertex_properties(
    meshes: &[Mesh],
    offsets: &[usize],
    total_groups: usize,
    include_positions: bool,
) -> Result<VertexProperties> {
    if meshes.len() > offsets.len() {
        return Err(SurfaceError::integrity(format!(
            "{} meshes for {} unit(s)",
            meshes.len(),
            offsets.len()
        )));
    }

    let total_vertices: usize = meshes.iter().map(true_vertex_count).sum();
    let mut group_index = Vec::with_capacity(total_vertices);
    let mut xyz: [Vec<f32>; 3] = Default::default();

    for (i, mesh) in meshes.iter().enumerate() {
        let count = true_vertex_count(mesh);
        trace!("Mesh {i}: {count} of {} group entries", mesh.groups.len());

        if include_positions {
            if mesh.positions.len() < 3 * count {
                return Err(SurfaceError::integrity(format!(
                    "mesh {i}: expected at least {} position components, got {}",
                    3 * count,
                    mesh.positions.len()
                )));
            }
            for p in mesh.positions[..3 * count].chunks_exact(3) {
                xyz[0].push(p[0]);
                xyz[1].push(p[1]);
                xyz[2].push(p[2]);
            }
        }

        // Base offset of every vertex in this mesh
        let bases: Vec<usize> = match &mesh.unit_vertex_runs {
            Some(runs) => {
                if runs.len() > offsets.len() {
                    return Err(SurfaceError::integrity(format!(
                        "mesh {i}: {} unit runs for {} unit(s)",
                        runs.len(),
                        offsets.len()
                    )));
                }
                let covered: usize = runs.iter().sum();
                if covered != count {
                    return Err(SurfaceError::integrity(format!(
                        "mesh {i}: unit runs cover {covered} vertices, expected {count}"
                    )));
                }
                runs.iter()
                    .zip(offsets)
                    .flat_map(|(&run, &offset)| std::iter::repeat(offset).take(run))
                    .collect()
            }
            None => vec![offsets.get(i).copied().unwrap_or(0); count],
        };

        for (v, (&local, base)) in mesh.groups[..count].iter().zip(bases).enumerate() {
            let global = base + local as usize;
            if global >= total_groups {
                return Err(SurfaceError::integrity(format!(
                    "mesh {i}, vertex {v}: group index {global} out of range ({total_groups} groups)"
                )));
            }
            group_index.push(global);
        }
    }

    let [x, y, z] = xyz;
    Ok(if include_positions {
        VertexProperties {
            group_index,
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    } else {
        VertexProperties {
            group_index,
            ..Default::default()
        }
    })
}

/// Build the full metadata of a surfaced component.
pub fn extract(structure: &Structure, meshes: &[Mesh], options: &ExtractOptions) -> Result<SurfaceMetadata> {
    let offsets = group_offsets(structure.units());
    let group_properties = group_properties(structure);
    let vertex_properties = vertex_properties(
        meshes,
        &offsets,
        group_properties.len(),
        options.include_positions,
    )?;
    debug!(
        "Correlated {} vertices with {} atoms",
        vertex_properties.group_index.len(),
        group_properties.len()
    );
    Ok(SurfaceMetadata {
        group_properties,
        vertex_properties,
    })
}
