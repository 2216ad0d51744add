//! Structure model: fixed-schema tables read from mmCIF or BinaryCIF, models,
//! assemblies and the units a surface is computed over.

pub mod assembly;
pub mod bcif;
pub mod cif;
mod model;
mod tables;
mod units;

pub use assembly::{Assembly, AssemblyGen, Operator};
pub use model::{Model, Trajectory};
pub use tables::{AtomTable, ChainTable, EntityTable, EntityType, ResidueTable};
pub use units::{ChainSelection, Structure, StructureKind, Unit};
