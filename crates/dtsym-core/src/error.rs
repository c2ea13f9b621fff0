//! Fatal generation errors
//!
//! Any of these aborts the run; output written so far must not be trusted.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("cycle in devicetree involving {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("missing 'label' property on {role} node {path}")]
    MissingLabel { role: &'static str, path: String },
    #[error("{path}: {what}")]
    RegisterCount { path: String, what: String },
    #[error("bus node {path} needs a {what} to build identifiers of its children")]
    IncompleteBus { path: String, what: &'static str },
    #[error("expected binding for {controller} to have '{cell}' in interrupt-cells")]
    MissingInterruptCell {
        controller: String,
        cell: &'static str,
    },
    #[error("invalid interrupt type {irq_type} specified for interrupt {index} of {path}")]
    InvalidInterruptType {
        path: String,
        index: usize,
        irq_type: u64,
    },
    #[error("{path} is a 'fixed-clock' but lacks a 'clock-frequency' property")]
    MissingClockFrequency { path: String },
    #[error("chip select index {index} of {path} out of range for {count} 'cs-gpios' entries")]
    ChipSelect {
        path: String,
        index: u64,
        count: usize,
    },
    #[error("flash partition {path} lacks a parent or grandparent node")]
    OrphanPartition { path: String },
    #[error("{path} is not an enabled instance of '{compat}'")]
    NotAnInstance { path: String, compat: String },
    #[error(
        "conflicting definitions of {symbol}: '{previous}' (header line {line}) and '{value}'"
    )]
    ConflictingDefinition {
        symbol: String,
        previous: String,
        value: String,
        line: usize,
    },
    #[error("alias for undefined symbol {0}")]
    UndefinedSymbol(String),
}
