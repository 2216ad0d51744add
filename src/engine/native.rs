use super::fetch::fetch;
use super::mesher::{element_radius, molecular_surface, MeshAtom, SurfaceParams};
use super::{GeometryExport, Mesh, RenderObject, StructureFormat, SurfaceEngine};
use crate::errors::{Result, SurfaceError};
use crate::structure::{bcif, cif, ChainSelection, Model, Structure, StructureKind, Trajectory};
use crate::surface::{Granularity, SurfaceOptions};
use nalgebra::{Point3, Vector3};
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Diffuse colour written for every surface material.
const SURFACE_COLOR: [f32; 3] = [0.8, 0.8, 0.8];

/// The built-in engine: fetches over HTTP(S) or from `file://` URLs, reads mmCIF
/// and BinaryCIF, expands assemblies and meshes solvent-excluded surfaces.
#[derive(Debug, Default)]
pub struct NativeEngine {
    session: Session,
}

/// What the engine has loaded and computed since the last reset.
#[derive(Debug, Default, Serialize)]
struct Session {
    url: Option<String>,
    entry_id: Option<String>,
    kind: Option<String>,
    chains: Vec<String>,
    options: Option<SurfaceOptions>,
    #[serde(skip)]
    meshes: Vec<Mesh>,
    mesh_stats: Vec<MeshStats>,
}

#[derive(Debug, Serialize)]
struct MeshStats {
    vertices: usize,
    triangles: usize,
}

impl NativeEngine {
    /// An engine with an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    fn mesh_atoms(structure: &Structure, units: Range<usize>) -> Vec<MeshAtom> {
        let atoms = structure.model().atoms();
        units
            .flat_map(|u| {
                structure.units()[u]
                    .elements()
                    .iter()
                    .enumerate()
                    .map(move |(e, &atom)| MeshAtom {
                        position: structure.position(u, e),
                        radius: element_radius(atoms.type_symbol(atom)),
                    })
            })
            .collect()
    }
}

fn to_mesh(surface: super::mesher::SurfaceMesh) -> Mesh {
    let n = surface.vertex_count();
    Mesh {
        positions: surface.positions,
        normals: surface.normals,
        groups: surface.groups,
        indices: surface.indices,
        vertex_count: Some(n),
        unit_vertex_runs: None,
    }
}

impl SurfaceEngine for NativeEngine {
    fn download(&mut self, url: &str, _format: StructureFormat) -> Result<Vec<u8>> {
        let data = fetch(url)?;
        self.session.url = Some(url.to_string());
        Ok(data)
    }

    fn parse_trajectory(&mut self, data: &[u8], format: StructureFormat) -> Result<Trajectory> {
        let block = match format {
            StructureFormat::BinaryCif => bcif::parse(data)?,
            StructureFormat::MmCif => {
                let text = std::str::from_utf8(data)
                    .map_err(|e| SurfaceError::parse(format!("mmCIF is not valid UTF-8: {e}")))?;
                cif::parse(text)?
            }
        };
        let trajectory = Trajectory::from_block(&block)?;
        if let Some(model) = trajectory.model(0) {
            self.session.entry_id = Some(model.entry_id().to_string());
        }
        Ok(trajectory)
    }

    fn structure_from_model(&mut self, model: Arc<Model>, kind: &StructureKind) -> Result<Structure> {
        let structure = Structure::build(model, kind)?;
        self.session.kind = Some(structure.kind().to_string());
        Ok(structure)
    }

    fn select(&mut self, structure: &Structure, selection: &ChainSelection) -> Result<Structure> {
        let component = structure.select(selection);
        let chains = component.model().chains();
        self.session.chains = component
            .units()
            .iter()
            .map(|u| chains.label_asym_id(u.chain()).to_string())
            .collect();
        self.session.chains.dedup();
        Ok(component)
    }

    fn represent(&mut self, component: &Structure, options: &SurfaceOptions) -> Result<Vec<RenderObject>> {
        let params = SurfaceParams {
            probe_radius: options.probe_radius,
            resolution: options.quality.resolution(component.element_count()),
        };
        debug!(
            "Meshing {} atom(s) at {} quality ({:.2} Å), {} granularity",
            component.element_count(),
            options.quality.resolve(component.element_count()),
            params.resolution,
            options.granularity
        );

        let meshes: Vec<Mesh> = match options.granularity {
            // Group indices run over all atoms of the component in unit order
            Granularity::Structure if component.is_empty() => Vec::new(),
            Granularity::Structure => {
                let atoms = Self::mesh_atoms(component, 0..component.units().len());
                vec![to_mesh(molecular_surface(&atoms, &params))]
            }
            // One mesh per unit, group indices local to the unit
            Granularity::Chain => (0..component.units().len())
                .map(|u| to_mesh(molecular_surface(&Self::mesh_atoms(component, u..u + 1), &params)))
                .collect(),
        };

        self.session.options = Some(*options);
        self.session.mesh_stats = meshes
            .iter()
            .map(|m| MeshStats {
                vertices: m.positions.len() / 3,
                triangles: m.triangle_count(),
            })
            .collect();
        self.session.meshes = meshes.clone();
        Ok(meshes.into_iter().map(RenderObject::Mesh).collect())
    }

    fn export_geometry(&mut self, name: &str) -> Result<GeometryExport> {
        Ok(write_obj(&self.session.meshes, name))
    }

    fn session_snapshot(&mut self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.session)?)
    }

    fn reset(&mut self) {
        self.session = Session::default();
    }
}

/// OBJ + MTL text for a list of meshes, centered on their common bounding box.
fn write_obj(meshes: &[Mesh], name: &str) -> GeometryExport {
    let mut lo = Vector3::repeat(f64::INFINITY);
    let mut hi = Vector3::repeat(f64::NEG_INFINITY);
    for p in meshes.iter().flat_map(|m| m.positions.chunks_exact(3)) {
        let v = Vector3::new(f64::from(p[0]), f64::from(p[1]), f64::from(p[2]));
        lo = lo.inf(&v);
        hi = hi.sup(&v);
    }
    let center = if lo.x.is_finite() {
        Point3::from((lo + hi) / 2.0)
    } else {
        Point3::origin()
    };

    let mut obj = String::new();
    let mut mtl = String::new();
    obj.push_str(&format!("mtllib {name}.mtl\n"));

    let mut offset = 1usize;
    for (i, mesh) in meshes.iter().enumerate() {
        obj.push_str(&format!("o surface_{i}\n"));
        obj.push_str(&format!("usemtl material_{i}\n"));
        for p in mesh.positions.chunks_exact(3) {
            obj.push_str(&format!(
                "v {:.4} {:.4} {:.4}\n",
                f64::from(p[0]) - center.x,
                f64::from(p[1]) - center.y,
                f64::from(p[2]) - center.z
            ));
        }
        for n in mesh.normals.chunks_exact(3) {
            obj.push_str(&format!("vn {:.4} {:.4} {:.4}\n", n[0], n[1], n[2]));
        }
        for t in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [t[0], t[1], t[2]].map(|v| v as usize + offset);
            obj.push_str(&format!("f {a}//{a} {b}//{b} {c}//{c}\n"));
        }
        offset += mesh.positions.len() / 3;

        let [r, g, b] = SURFACE_COLOR;
        mtl.push_str(&format!("newmtl material_{i}\n"));
        mtl.push_str(&format!("Kd {r:.3} {g:.3} {b:.3}\n"));
        mtl.push_str("d 1.000\n");
    }

    GeometryExport { obj, mtl }
}
