#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! # Molsurf Library
//!
//! Computes molecular (solvent-excluded) surfaces of macromolecular structures
//! and correlates every surface vertex with the atom it was generated from.
//!
//! The pipeline is driven through a [`engine::SurfaceEngine`] handle; the
//! built-in [`engine::NativeEngine`] reads mmCIF and BinaryCIF files from
//! `http(s)://` or `file://` URLs and meshes the surface on a grid.

pub mod batch;
pub mod chains;
pub mod correlation;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod metadata;
pub mod obj;
pub mod residues;
pub mod structure;
pub mod surface;

// Re-export key public types
pub use batch::{process_dataset, process_reference, BatchConfig, OutputMode, DEFAULT_SOURCE};
pub use correlation::{extract, ExtractOptions, SurfaceMetadata};
pub use dataset::{load_dataset, parse_dataset, ChainRef};
pub use engine::{NativeEngine, SurfaceEngine};
pub use errors::{Result, SurfaceError};
pub use surface::{compute_surface, Granularity, Quality, StructureRef, SurfaceOptions, SurfaceResult};
