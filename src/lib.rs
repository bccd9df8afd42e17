pub mod config;
pub mod descriptor;
pub mod error;
pub mod forge;
pub mod handlers;
pub mod render;
pub mod signature;
pub mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use crate::forge::ForgeSettings;
use crate::signature::RequestVerifier;

/// Shared service state. Built once at startup and immutable afterwards,
/// so concurrent request handlers read it without locking.
pub struct AppState {
    pub verifier: RequestVerifier,
    pub forge: ForgeSettings,
    pub templates_path: PathBuf,
}

pub type SharedState = Arc<AppState>;
