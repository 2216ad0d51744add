//! The surface pipeline: load a structure, build the model or assembly, select
//! chains and collect the molecular-surface meshes.

use crate::chains::{resolve_selection, ChainMapping};
use crate::engine::{Mesh, RenderObject, StructureFormat, SurfaceEngine};
use crate::errors::{Result, SurfaceError};
use crate::structure::{ChainSelection, Structure, StructureKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Where to load a structure from and which part of it to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureRef {
    /// Location of the mmCIF / BinaryCIF file
    pub url: String,
    /// Assembly to build, `None` for the deposited model
    pub assembly_id: Option<String>,
    /// Author chain id to keep, `None` for all polymer chains
    pub auth_chain_id: Option<String>,
}

/// Surface tessellation quality.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Pick a level from the number of atoms
    Auto,
    /// 0.4 Å grid
    Highest,
    /// 0.5 Å grid
    Higher,
    /// 0.6 Å grid
    #[default]
    High,
    /// 0.8 Å grid
    Medium,
    /// 1.0 Å grid
    Low,
    /// 1.5 Å grid
    Lower,
    /// 2.0 Å grid
    Lowest,
}

impl Quality {
    /// Grid spacing in Å; `Auto` is resolved from the atom count first.
    pub fn resolution(&self, atom_count: usize) -> f64 {
        match self.resolve(atom_count) {
            Quality::Highest => 0.4,
            Quality::Higher => 0.5,
            Quality::High => 0.6,
            Quality::Medium => 0.8,
            Quality::Low => 1.0,
            Quality::Lower => 1.5,
            Quality::Lowest | Quality::Auto => 2.0,
        }
    }

    /// The concrete level used for `atom_count` atoms.
    pub fn resolve(&self, atom_count: usize) -> Quality {
        match self {
            Quality::Auto => match atom_count {
                n if n > 500_000 => Quality::Lowest,
                n if n > 300_000 => Quality::Low,
                n if n > 100_000 => Quality::Medium,
                n if n > 20_000 => Quality::High,
                _ => Quality::Higher,
            },
            other => *other,
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Quality::Auto => write!(f, "auto"),
            Quality::Highest => write!(f, "highest"),
            Quality::Higher => write!(f, "higher"),
            Quality::High => write!(f, "high"),
            Quality::Medium => write!(f, "medium"),
            Quality::Low => write!(f, "low"),
            Quality::Lower => write!(f, "lower"),
            Quality::Lowest => write!(f, "lowest"),
        }
    }
}

/// Whether the surface is one merged mesh or one mesh per unit.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One mesh for the whole component
    #[default]
    Structure,
    /// One mesh per unit (chain placed by an operator)
    Chain,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Granularity::Structure => write!(f, "structure"),
            Granularity::Chain => write!(f, "chain"),
        }
    }
}

/// Parameters of the molecular-surface representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceOptions {
    /// Probe radius in Å
    pub probe_radius: f64,
    /// Grid quality level
    pub quality: Quality,
    /// One merged mesh or one mesh per unit
    pub granularity: Granularity,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            probe_radius: 1.4,
            quality: Quality::default(),
            granularity: Granularity::default(),
        }
    }
}

impl SurfaceOptions {
    /// The probe radius must be positive and finite.
    pub fn validate(&self) -> Result<()> {
        if !self.probe_radius.is_finite() || self.probe_radius <= 0.0 {
            return Err(SurfaceError::input(format!(
                "probe radius must be a positive number, got {}",
                self.probe_radius
            )));
        }
        Ok(())
    }
}

/// The selected component and its surface meshes, in emission order.
#[derive(Debug, Clone)]
pub struct SurfaceResult {
    /// The selected component the meshes were computed for
    pub structure: Structure,
    /// Surface meshes in emission order
    pub meshes: Vec<Mesh>,
}

impl SurfaceResult {
    /// Position of the first vertex of the first mesh, used to anchor exported
    /// geometry back into the structure's coordinate frame.
    pub fn first_vertex(&self) -> Option<[f32; 3]> {
        let mesh = self.meshes.first()?;
        match mesh.positions.as_slice() {
            [x, y, z, ..] => Some([*x, *y, *z]),
            _ => None,
        }
    }
}

/// Compute the molecular surface of a structure reference.
///
/// # Arguments
///
/// * `engine` - Engine handle that loads, represents and exports structures
/// * `structure_ref` - Source URL plus optional assembly and author chain id
/// * `options` - Probe radius, quality and granularity
///
/// # Returns
///
/// The selected component and the meshes of its surface. An empty selection
/// (unknown author chain id) only logs a warning and yields no meshes.
///
/// # Example
///
/// ```no_run
/// use molsurf::engine::NativeEngine;
/// use molsurf::surface::{compute_surface, StructureRef, SurfaceOptions};
///
/// let mut engine = NativeEngine::new();
/// let structure_ref = StructureRef {
///     url: "https://www.ebi.ac.uk/pdbe/entry-files/download/1tqn_updated.cif".to_string(),
///     assembly_id: Some("1".to_string()),
///     auth_chain_id: Some("A".to_string()),
/// };
/// let result = compute_surface(&mut engine, &structure_ref, &SurfaceOptions::default()).unwrap();
/// println!("{} mesh(es)", result.meshes.len());
/// ```
pub fn compute_surface<E: SurfaceEngine + ?Sized>(
    engine: &mut E,
    structure_ref: &StructureRef,
    options: &SurfaceOptions,
) -> Result<SurfaceResult> {
    trace!("{structure_ref:?} {options:?}");
    options.validate()?;

    let format = StructureFormat::from_url(&structure_ref.url);
    let data = engine.download(&structure_ref.url, format)?;
    debug!("Fetched {} bytes from {}", data.len(), structure_ref.url);

    let trajectory = engine.parse_trajectory(&data, format)?;
    let model = trajectory.model(0).ok_or_else(|| {
        SurfaceError::contract("parse", format!("no model in {}", structure_ref.url))
    })?;

    let kind = StructureKind::from_assembly_id(structure_ref.assembly_id.as_deref());
    let structure = engine.structure_from_model(model.clone(), &kind)?;
    if structure.kind() != &kind {
        return Err(SurfaceError::contract(
            "assembly",
            format!("requested {kind}, engine produced {}", structure.kind()),
        ));
    }
    debug!(
        "Built {} with {} unit(s) and {} atom(s)",
        structure.kind(),
        structure.units().len(),
        structure.element_count()
    );

    let mapping = ChainMapping::from_model(&model)?;
    let labels = resolve_selection(&mapping, structure_ref.auth_chain_id.as_deref());
    if labels.is_empty() {
        warn!(
            "No polymer chain matches author chain {} in {}",
            structure_ref.auth_chain_id.as_deref().unwrap_or("(all)"),
            structure_ref.url
        );
    }
    debug!("Selected chains {labels:?}");

    let component = engine.select(&structure, &ChainSelection::new(labels))?;
    if component.is_empty() {
        warn!(
            "Structure is empty (URL {}, chain {})",
            structure_ref.url,
            structure_ref.auth_chain_id.as_deref().unwrap_or("all")
        );
    }

    let objects = engine.represent(&component, options)?;
    let meshes: Vec<Mesh> = objects
        .into_iter()
        .filter_map(|object| match object {
            RenderObject::Mesh(mesh) => Some(mesh),
            RenderObject::Other { kind } => {
                debug!("Skipping non-mesh render object {kind}");
                None
            }
        })
        .collect();

    match options.granularity {
        Granularity::Chain if meshes.len() != component.units().len() => {
            return Err(SurfaceError::contract(
                "represent",
                format!(
                    "chain granularity produced {} mesh(es) for {} unit(s)",
                    meshes.len(),
                    component.units().len()
                ),
            ));
        }
        Granularity::Structure if meshes.len() > 1 => {
            return Err(SurfaceError::contract(
                "represent",
                format!("structure granularity produced {} meshes", meshes.len()),
            ));
        }
        _ => {}
    }

    info!(
        "Surface of {} ({}) has {} mesh(es)",
        structure_ref.url,
        component.kind(),
        meshes.len()
    );
    Ok(SurfaceResult {
        structure: component,
        meshes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GeometryExport, NativeEngine};
    use crate::structure::{Model, Trajectory};
    use std::sync::Arc;

    fn fixture_ref(assembly_id: Option<&str>, chain: Option<&str>) -> StructureRef {
        StructureRef {
            url: format!(
                "file://{}/test-data/mini.cif",
                env!("CARGO_MANIFEST_DIR")
            ),
            assembly_id: assembly_id.map(str::to_string),
            auth_chain_id: chain.map(str::to_string),
        }
    }

    fn fast_options(granularity: Granularity) -> SurfaceOptions {
        SurfaceOptions {
            probe_radius: 1.4,
            quality: Quality::Lower,
            granularity,
        }
    }

    #[test]
    fn quality_levels() {
        assert_eq!(Quality::High.resolution(10), 0.6);
        assert_eq!(Quality::Auto.resolve(1_000), Quality::Higher);
        assert_eq!(Quality::Auto.resolve(150_000), Quality::Medium);
        assert_eq!(Quality::Auto.resolution(600_000), 2.0);
        assert_eq!(Quality::Lowest.to_string(), "lowest");
    }

    #[test]
    fn options_validation() {
        assert!(SurfaceOptions::default().validate().is_ok());
        let bad = SurfaceOptions {
            probe_radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(SurfaceError::Input(_))));
        let bad = SurfaceOptions {
            probe_radius: f64::NAN,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn first_vertex_needs_three_components() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/test-data/mini.cif");
        let block = crate::structure::cif::parse(&std::fs::read_to_string(path).unwrap()).unwrap();
        let model = Trajectory::from_block(&block).unwrap().model(0).unwrap();
        let structure = Structure::from_model(model);

        let short = SurfaceResult {
            structure: structure.clone(),
            meshes: vec![Mesh {
                positions: vec![1.0, 2.0],
                ..Default::default()
            }],
        };
        assert_eq!(short.first_vertex(), None);

        let ok = SurfaceResult {
            structure,
            meshes: vec![Mesh {
                positions: vec![1.0, 2.0, 3.0, 4.0],
                ..Default::default()
            }],
        };
        assert_eq!(ok.first_vertex(), Some([1.0, 2.0, 3.0]));
    }

    #[test]
    fn all_polymer_chains_of_deposited_model() {
        let mut engine = NativeEngine::new();
        let result = compute_surface(
            &mut engine,
            &fixture_ref(None, None),
            &fast_options(Granularity::Structure),
        )
        .unwrap();
        let chains: Vec<_> = result.structure.units().iter().map(|u| u.chain()).collect();
        // Polymer chains A, B and D; ligand and water are excluded
        assert_eq!(chains, vec![0, 1, 3]);
        assert_eq!(result.meshes.len(), 1);
        assert!(result.first_vertex().is_some());
    }

    #[test]
    fn chain_granularity_in_assembly() {
        let mut engine = NativeEngine::new();
        let result = compute_surface(
            &mut engine,
            &fixture_ref(Some("2"), Some("X")),
            &fast_options(Granularity::Chain),
        )
        .unwrap();
        assert_eq!(result.structure.kind(), &StructureKind::Assembly("2".into()));
        assert_eq!(result.structure.units().len(), 2);
        assert_eq!(result.meshes.len(), 2);
    }

    #[test]
    fn unknown_chain_gives_empty_component() {
        let mut engine = NativeEngine::new();
        let result = compute_surface(
            &mut engine,
            &fixture_ref(None, Some("Z")),
            &fast_options(Granularity::Structure),
        )
        .unwrap();
        assert!(result.structure.is_empty());
        assert!(result.meshes.is_empty());
        assert_eq!(result.first_vertex(), None);
    }

    /// Delegates to the native engine but lies about the structure it built.
    struct WrongAssembly(NativeEngine);

    impl SurfaceEngine for WrongAssembly {
        fn download(&mut self, url: &str, format: StructureFormat) -> Result<Vec<u8>> {
            self.0.download(url, format)
        }
        fn parse_trajectory(&mut self, data: &[u8], format: StructureFormat) -> Result<Trajectory> {
            self.0.parse_trajectory(data, format)
        }
        fn structure_from_model(&mut self, model: Arc<Model>, _kind: &StructureKind) -> Result<Structure> {
            Ok(Structure::from_model(model))
        }
        fn select(&mut self, structure: &Structure, selection: &ChainSelection) -> Result<Structure> {
            self.0.select(structure, selection)
        }
        fn represent(&mut self, component: &Structure, options: &SurfaceOptions) -> Result<Vec<RenderObject>> {
            self.0.represent(component, options)
        }
        fn export_geometry(&mut self, name: &str) -> Result<GeometryExport> {
            self.0.export_geometry(name)
        }
        fn session_snapshot(&mut self) -> Result<String> {
            self.0.session_snapshot()
        }
        fn reset(&mut self) {
            self.0.reset()
        }
    }

    #[test]
    fn assembly_mismatch_is_a_contract_violation() {
        let mut engine = WrongAssembly(NativeEngine::new());
        let err = compute_surface(
            &mut engine,
            &fixture_ref(Some("1"), None),
            &fast_options(Granularity::Structure),
        )
        .unwrap_err();
        match err {
            SurfaceError::EngineContract { stage, message } => {
                assert_eq!(stage, "assembly");
                assert!(message.contains("assembly 1"), "{message}");
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
