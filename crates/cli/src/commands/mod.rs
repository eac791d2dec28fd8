//! CLI command implementations

pub mod insights;
pub mod status;
