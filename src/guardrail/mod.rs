//! Safety checks on model input/output and postprocessing of generated frames.

pub mod blocklist;
pub mod config;
pub mod core;
pub mod postprocess;
