//! Typed change-unit operations.
//!
//! A change-unit file decodes into one or more [`OperationSpec`] values
//! exactly once, via [`parse_change_unit`]; everything downstream matches
//! exhaustively over the six variants instead of re-inspecting raw JSON.

mod executor;
mod parser;
mod spec;

pub use executor::OperationExecutor;
pub use parser::parse_change_unit;
pub use spec::*;
