//! The pipeline descriptor fetched from the repository.

use serde::Deserialize;
use serde_yaml::Value;
use tracing::info;

/// `.woodpecker/woodpecker-template.yaml`: names a template pack and carries
/// the pack's render data as an arbitrary YAML value.
#[derive(Debug, Deserialize)]
pub struct Descriptor {
    /// Missing fields parse as empty; an empty template name simply never
    /// matches a pack directory, so the caller falls back to 204.
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub data: Value,
}

/// Parse the descriptor bytes. Unlike forge absence, a malformed descriptor
/// is a real client error and the caller answers it as such.
pub fn parse(bytes: &[u8]) -> Option<Descriptor> {
    match serde_yaml::from_slice(bytes) {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            info!("Could not parse template data: '{}'", e);
            None
        }
    }
}
