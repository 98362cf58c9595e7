//! CLI command implementations for Argus.

pub mod check;
pub mod detect;
pub mod remediate;
pub mod serve;
