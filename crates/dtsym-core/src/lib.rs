//! dtsym Core - Resolved devicetree model and symbol generation
//!
//! This crate turns a fully resolved devicetree into flat symbol definitions:
//! - Model loading from the resolver's JSON output
//! - Node naming under path, instance, alias and legacy identifiers
//! - A dual-stream emission engine (C header and `KEY=value` conf file)
//! - Per-property and special-case emitters (registers, interrupts, clocks,
//!   SPI chip selects, buses, flash partitions, /chosen facts)

pub mod emit;
pub mod emitters;
pub mod error;
pub mod generator;
pub mod ident;
pub mod model;
pub mod naming;
pub mod options;

pub use emit::{Sink, Value};
pub use error::GenError;
pub use generator::{generate, Generator};
pub use model::{ModelError, Node, NodeId, PropValue, Tree};
pub use naming::NodeIdentity;
pub use options::GenOptions;
