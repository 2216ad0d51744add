//! Batch processing of a dataset of chain references.

use crate::correlation::{extract, ExtractOptions};
use crate::dataset::ChainRef;
use crate::engine::SurfaceEngine;
use crate::errors::{Result, SurfaceError};
use crate::metadata::write_metadata;
use crate::obj::shift_first_vertex;
use crate::surface::{compute_surface, SurfaceOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Default structure source; `{id}` is replaced by the entry id.
pub const DEFAULT_SOURCE: &str = "https://www.ebi.ac.uk/pdbe/entry-files/download/{id}_updated.cif";

/// How geometry is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// `<name>.obj` plus `<name>.mtl`
    #[default]
    Files,
    /// A single `<name>.zip` archive
    Zip,
}

/// Output settings shared by every reference of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Directory all output files are written to
    pub output_dir: PathBuf,
    /// URL template containing `{id}`
    pub source_template: String,
    /// Surface parameters used for every reference
    pub options: SurfaceOptions,
    /// Geometry output format
    pub output: OutputMode,
    /// Write `<name>.metadata.json`
    pub metadata: bool,
    /// Include vertex positions in the metadata
    pub vertex_positions: bool,
    /// Write `<name>.molj` with the engine session
    pub session: bool,
}

impl BatchConfig {
    /// Defaults for everything but the output directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            source_template: DEFAULT_SOURCE.to_string(),
            options: SurfaceOptions::default(),
            output: OutputMode::default(),
            metadata: false,
            vertex_positions: false,
            session: false,
        }
    }

    /// Reject settings that cannot be honoured, before anything is downloaded.
    pub fn validate(&self) -> Result<()> {
        self.options.validate()?;
        if self.output == OutputMode::Zip {
            return Err(SurfaceError::Unsupported(
                "zip output: exported vertices cannot be shifted inside an archive".to_string(),
            ));
        }
        if self.vertex_positions && !self.metadata {
            return Err(SurfaceError::input("vertex positions are only written with metadata"));
        }
        Ok(())
    }

    /// Validate and create the output directory.
    pub fn prepare(&self) -> Result<()> {
        self.validate()?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    fn output_path(&self, filename: &str, extension: &str) -> PathBuf {
        self.output_dir.join(format!("{filename}.{extension}"))
    }
}

/// Compute and write the surface of one reference.
///
/// The engine is reset afterwards, whether or not processing succeeded.
///
/// # Returns
///
/// The paths of the files written, in the order they were written.
pub fn process_reference<E: SurfaceEngine + ?Sized>(
    engine: &mut E,
    chain_ref: &ChainRef,
    config: &BatchConfig,
) -> Result<Vec<PathBuf>> {
    let result = write_reference(engine, chain_ref, config);
    engine.reset();
    result
}

fn write_reference<E: SurfaceEngine + ?Sized>(
    engine: &mut E,
    chain_ref: &ChainRef,
    config: &BatchConfig,
) -> Result<Vec<PathBuf>> {
    let filename = chain_ref.filename();
    info!("Processing {filename}");

    let structure_ref = chain_ref.to_structure_ref(&config.source_template);
    trace!("{structure_ref:?}");
    let surface = compute_surface(engine, &structure_ref, &config.options)?;
    let anchor = surface.first_vertex();
    let mut written = Vec::new();

    if config.session {
        let path = config.output_path(&filename, "molj");
        std::fs::write(&path, engine.session_snapshot()?)?;
        written.push(path);
    }

    let export = engine.export_geometry(&filename)?;
    let obj = match anchor {
        Some(anchor) => shift_first_vertex(&export.obj, anchor)?,
        None => {
            debug!("No surface vertices for {filename}, geometry not shifted");
            export.obj
        }
    };
    for (extension, text) in [("obj", obj), ("mtl", export.mtl)] {
        let path = config.output_path(&filename, extension);
        write_text(&path, &text)?;
        written.push(path);
    }

    if config.metadata {
        let options = ExtractOptions {
            include_positions: config.vertex_positions,
        };
        let metadata = extract(&surface.structure, &surface.meshes, &options)?;
        let path = config.output_path(&filename, "metadata.json");
        write_metadata(&path, &metadata)?;
        written.push(path);
    }

    Ok(written)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Process every reference of a dataset in order, stopping at the first failure.
///
/// # Example
///
/// ```no_run
/// use molsurf::batch::{process_dataset, BatchConfig};
/// use molsurf::dataset::ChainRef;
/// use molsurf::engine::NativeEngine;
///
/// let refs = vec![ChainRef::parse("1tqn_1-A").unwrap()];
/// let mut engine = NativeEngine::new();
/// let written = process_dataset(&mut engine, &refs, &BatchConfig::new("surfaces")).unwrap();
/// println!("{} file(s) written", written.len());
/// ```
pub fn process_dataset<E: SurfaceEngine + ?Sized>(
    engine: &mut E,
    refs: &[ChainRef],
    config: &BatchConfig,
) -> Result<Vec<PathBuf>> {
    config.prepare()?;
    let mut written = Vec::new();
    for chain_ref in refs {
        written.extend(process_reference(engine, chain_ref, config)?);
    }
    info!("Processed {} reference(s)", refs.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GeometryExport, NativeEngine, RenderObject, StructureFormat};
    use crate::obj::first_vertex_position;
    use crate::structure::{ChainSelection, Model, Structure, StructureKind, Trajectory};
    use crate::surface::{Quality, StructureRef};
    use std::sync::Arc;

    /// Native engine that counts resets.
    #[derive(Default)]
    struct CountingEngine {
        inner: NativeEngine,
        resets: usize,
    }

    impl SurfaceEngine for CountingEngine {
        fn download(&mut self, url: &str, format: StructureFormat) -> Result<Vec<u8>> {
            self.inner.download(url, format)
        }
        fn parse_trajectory(&mut self, data: &[u8], format: StructureFormat) -> Result<Trajectory> {
            self.inner.parse_trajectory(data, format)
        }
        fn structure_from_model(&mut self, model: Arc<Model>, kind: &StructureKind) -> Result<Structure> {
            self.inner.structure_from_model(model, kind)
        }
        fn select(&mut self, structure: &Structure, selection: &ChainSelection) -> Result<Structure> {
            self.inner.select(structure, selection)
        }
        fn represent(&mut self, component: &Structure, options: &SurfaceOptions) -> Result<Vec<RenderObject>> {
            self.inner.represent(component, options)
        }
        fn export_geometry(&mut self, name: &str) -> Result<GeometryExport> {
            self.inner.export_geometry(name)
        }
        fn session_snapshot(&mut self) -> Result<String> {
            self.inner.session_snapshot()
        }
        fn reset(&mut self) {
            self.resets += 1;
            self.inner.reset()
        }
    }

    fn config(dir: &Path) -> BatchConfig {
        let mut config = BatchConfig::new(dir.join("out"));
        config.source_template = format!("file://{}/test-data/{{id}}.cif", env!("CARGO_MANIFEST_DIR"));
        config.options.quality = Quality::Lower;
        config
    }

    #[test]
    fn writes_shifted_geometry_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.metadata = true;
        config.session = true;

        let refs = vec![ChainRef::parse("mini-A").unwrap()];
        let mut engine = CountingEngine::default();
        let written = process_dataset(&mut engine, &refs, &config).unwrap();
        assert_eq!(engine.resets, 1);

        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["mini-A.molj", "mini-A.obj", "mini-A.mtl", "mini-A.metadata.json"]);

        // The exported geometry is moved back onto the surface's own first vertex
        let structure_ref = StructureRef {
            url: config.source_template.replace("{id}", "mini"),
            assembly_id: None,
            auth_chain_id: Some("A".into()),
        };
        let surface = compute_surface(&mut NativeEngine::new(), &structure_ref, &config.options).unwrap();
        let anchor = surface.first_vertex().unwrap();
        let obj = std::fs::read_to_string(&written[1]).unwrap();
        let first = first_vertex_position(&obj).unwrap().unwrap();
        for axis in 0..3 {
            assert!((first[axis] - f64::from(anchor[axis])).abs() < 1e-3);
        }
        assert!(obj.starts_with("mtllib mini-A.mtl\n"));

        // One group index per exported vertex
        let metadata: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written[3]).unwrap()).unwrap();
        let vertex_lines = obj.lines().filter(|l| l.starts_with("v ")).count();
        assert_eq!(
            metadata["vertex_properties"]["group_index"].as_array().unwrap().len(),
            vertex_lines
        );
        // Chain A is the five-atom alanine
        assert_eq!(metadata["group_properties"]["atom_id"], serde_json::json!([1, 2, 3, 4, 5]));
    }

    #[test]
    fn empty_selection_still_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let refs = vec![ChainRef::parse("mini-Z").unwrap()];
        let written = process_dataset(&mut NativeEngine::new(), &refs, &config).unwrap();
        assert_eq!(written.len(), 2);
        let obj = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(obj, "mtllib mini-Z.mtl\n");
    }

    #[test]
    fn zip_output_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.output = OutputMode::Zip;
        let refs = vec![ChainRef::parse("mini").unwrap()];
        let mut engine = CountingEngine::default();
        let err = process_dataset(&mut engine, &refs, &config).unwrap_err();
        assert!(matches!(err, SurfaceError::Unsupported(_)));
        assert_eq!(engine.resets, 0);
        assert!(!config.output_dir.exists());
    }

    #[test]
    fn vertex_positions_need_metadata() {
        let mut config = BatchConfig::new("out");
        config.vertex_positions = true;
        assert!(matches!(config.validate(), Err(SurfaceError::Input(_))));
        config.metadata = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn engine_is_reset_after_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let refs = vec![
            ChainRef::parse("mini_2-X").unwrap(),
            ChainRef::parse("absent").unwrap(),
            ChainRef::parse("mini").unwrap(),
        ];
        let mut engine = CountingEngine::default();
        let err = process_dataset(&mut engine, &refs, &config).unwrap_err();
        assert!(matches!(err, SurfaceError::Fetch { .. }));
        // First reference succeeded, second failed, third never started
        assert_eq!(engine.resets, 2);
        assert!(config.output_dir.join("mini_2-X.obj").exists());
        assert!(!config.output_dir.join("mini.obj").exists());
    }
}
