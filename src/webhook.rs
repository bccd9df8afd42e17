//! Typed webhook request envelope.

use serde::Deserialize;
use tracing::info;

/// Repository context sent by the CI server.
#[derive(Debug, Deserialize, Clone)]
pub struct Repo {
    pub clone_url: String,
}

/// Pipeline context; only the commit to fetch the descriptor at matters here.
#[derive(Debug, Deserialize, Clone)]
pub struct Pipeline {
    pub commit: String,
}

/// Forge credentials used for the clone.
#[derive(Debug, Deserialize, Clone)]
pub struct Netrc {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookRequest {
    pub repo: Repo,
    pub pipeline: Pipeline,
    pub netrc: Netrc,
}

/// Parse the raw request body into the typed envelope.
pub fn decode(body: &[u8]) -> Option<WebhookRequest> {
    match serde_json::from_slice(body) {
        Ok(request) => Some(request),
        Err(e) => {
            info!("Could not parse JSON body: '{}'", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_envelope() {
        let body = r#"{
            "repo": {"clone_url": "https://forge.example.com/acme/widget.git", "name": "widget"},
            "pipeline": {"commit": "9e2f5a0", "branch": "main"},
            "netrc": {"login": "ci-bot", "password": "s3cret", "machine": "forge.example.com"}
        }"#;

        let request = decode(body.as_bytes()).unwrap();
        assert_eq!(
            request.repo.clone_url,
            "https://forge.example.com/acme/widget.git"
        );
        assert_eq!(request.pipeline.commit, "9e2f5a0");
        assert_eq!(request.netrc.login, "ci-bot");
        assert_eq!(request.netrc.password, "s3cret");
    }

    #[test]
    fn missing_credentials_default_to_empty() {
        let body = r#"{
            "repo": {"clone_url": "https://forge.example.com/acme/widget.git"},
            "pipeline": {"commit": "9e2f5a0"},
            "netrc": {}
        }"#;

        let request = decode(body.as_bytes()).unwrap();
        assert!(request.netrc.login.is_empty());
        assert!(request.netrc.password.is_empty());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(decode(b"{not json").is_none());
    }

    #[test]
    fn rejects_schema_mismatch() {
        assert!(decode(br#"{"repo": {"clone_url": "x"}}"#).is_none());
    }
}
