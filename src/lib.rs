pub mod core;
pub mod harvest;

// --- Primary exports ---
pub use crate::core::config;
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::harvest::{harvest, validate_address, HarvestOptions, Interrupt};
