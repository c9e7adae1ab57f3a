mod ops;
mod store;

pub use store::*;

pub(crate) use ops::{apply_update, matches_filter};
