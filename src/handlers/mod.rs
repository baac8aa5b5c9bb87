// src/handlers/mod.rs
use std::path::PathBuf;
use std::sync::Arc;

use crate::services::pipeline::Pipeline;

pub mod ath;
pub mod error;

/// Shared by every route.
pub struct AppState {
    /// `None` when the reference table could not be loaded at startup.
    pub pipeline: Option<Arc<Pipeline>>,
    pub artifact_dir: PathBuf,
}
