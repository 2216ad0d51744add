use anyhow::Context;
use clap::ArgGroup;
use molsurf::batch::{process_reference, BatchConfig, OutputMode, DEFAULT_SOURCE};
use molsurf::dataset::{load_dataset, ChainRef};
use molsurf::engine::NativeEngine;
use molsurf::surface::{Granularity, Quality, SurfaceOptions};
use std::path::PathBuf;
use tracing::{debug, info, trace};

#[derive(clap::Args, Debug, Clone)]
#[command(group(ArgGroup::new("inputs").required(true).args(["input", "input_file"])))]
pub(crate) struct Args {
    /// Chains to process, each as {entry_id}_{assembly_id}-{auth_chain_id}:
    /// omit _{assembly_id} to process the deposited model,
    /// omit -{auth_chain_id} to process all polymer chains.
    /// e.g. 1e94 1e94-E 1e94_3 1e94_3-E
    #[arg(long, num_args = 1..)]
    input: Vec<String>,

    /// File with one chain reference per line (same format as --input)
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Output directory
    #[arg(long)]
    output_dir: PathBuf,

    /// URL template of the structure file; {id} is replaced by the entry id.
    /// Supports http://, https:// and file://, in .cif or .bcif format
    #[arg(long, default_value = DEFAULT_SOURCE)]
    source: String,

    /// Surface quality level
    #[arg(long, value_enum, default_value_t = SurfaceOptions::default().quality)]
    quality: Quality,

    /// Probe radius in Å
    #[arg(long, default_value_t = SurfaceOptions::default().probe_radius)]
    probe: f64,

    /// 'structure' for one surface of the whole structure,
    /// 'chain' for a separate surface per chain
    #[arg(long, value_enum, default_value_t = SurfaceOptions::default().granularity)]
    granularity: Granularity,

    /// Write {name}.zip instead of {name}.obj and {name}.mtl
    #[arg(long)]
    zip: bool,

    /// Also write {name}.metadata.json with per-vertex atom metadata
    #[arg(long)]
    metadata: bool,

    /// Include vertex positions in the metadata
    #[arg(long, requires = "metadata")]
    vertex_positions: bool,

    /// Also write {name}.molj with the engine session, mostly for debugging
    #[arg(long)]
    molj: bool,
}

impl Args {
    fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            output_dir: self.output_dir.clone(),
            source_template: self.source.clone(),
            options: SurfaceOptions {
                probe_radius: self.probe,
                quality: self.quality,
                granularity: self.granularity,
            },
            output: if self.zip { OutputMode::Zip } else { OutputMode::Files },
            metadata: self.metadata,
            vertex_positions: self.vertex_positions,
            session: self.molj,
        }
    }

    fn chain_refs(&self) -> anyhow::Result<Vec<ChainRef>> {
        match &self.input_file {
            Some(path) => load_dataset(path)
                .with_context(|| format!("Failed to load dataset {}", path.display())),
            None => self
                .input
                .iter()
                .map(|text| ChainRef::parse(text).with_context(|| format!("Invalid reference '{text}'")))
                .collect(),
        }
    }
}

pub(crate) fn run(args: &Args) -> anyhow::Result<()> {
    trace!("{args:?}");

    let refs = args.chain_refs()?;
    let config = args.batch_config();
    config
        .prepare()
        .with_context(|| format!("Cannot write to {}", config.output_dir.display()))?;
    debug!(
        "Processing {} reference(s) into {}",
        refs.len(),
        config.output_dir.display()
    );

    let mut engine = NativeEngine::new();
    for chain_ref in &refs {
        let written = process_reference(&mut engine, chain_ref, &config)
            .with_context(|| format!("Failed to process {}", chain_ref.filename()))?;
        debug!("Wrote {written:?}");
    }

    info!("Done, {} reference(s) processed", refs.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: Args,
    }

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        TestCli::try_parse_from(std::iter::once("molsurf").chain(argv.iter().copied())).map(|c| c.args)
    }

    #[test]
    fn defaults() {
        let args = parse(&["--input", "1tqn", "1tqn_1-A", "--output-dir", "out"]).unwrap();
        assert_eq!(args.input, vec!["1tqn", "1tqn_1-A"]);
        assert_eq!(args.source, DEFAULT_SOURCE);
        let config = args.batch_config();
        assert_eq!(config.options, SurfaceOptions::default());
        assert_eq!(config.output, OutputMode::Files);
        assert!(!config.metadata && !config.session);
    }

    #[test]
    fn options_are_forwarded() {
        let args = parse(&[
            "--input", "1tqn", "--output-dir", "out", "--quality", "lowest", "--probe", "1.2",
            "--granularity", "chain", "--zip", "--metadata", "--vertex-positions", "--molj",
        ])
        .unwrap();
        let config = args.batch_config();
        assert_eq!(config.options.quality, Quality::Lowest);
        assert_eq!(config.options.probe_radius, 1.2);
        assert_eq!(config.options.granularity, Granularity::Chain);
        assert_eq!(config.output, OutputMode::Zip);
        assert!(config.vertex_positions && config.session);
    }

    #[test]
    fn exactly_one_input_source() {
        assert!(parse(&["--output-dir", "out"]).is_err());
        assert!(parse(&["--input", "1tqn", "--input-file", "x.txt", "--output-dir", "out"]).is_err());
        assert!(parse(&["--input-file", "x.txt", "--output-dir", "out"]).is_ok());
        assert!(parse(&["--input", "1tqn"]).is_err());
    }

    #[test]
    fn vertex_positions_require_metadata() {
        assert!(parse(&["--input", "1tqn", "--output-dir", "out", "--vertex-positions"]).is_err());
    }

    #[test]
    fn bad_reference_is_reported() {
        let args = parse(&["--input", "1tqn-A-B", "--output-dir", "out"]).unwrap();
        let err = args.chain_refs().unwrap_err();
        assert!(format!("{err:#}").contains("1tqn-A-B"));
    }
}
