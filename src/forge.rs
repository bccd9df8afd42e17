//! Retrieves the pipeline descriptor from the forge.
//!
//! The repository is cloned bare into a per-request temporary directory, so
//! no working tree is ever materialized and nothing survives the request.
//! Lookups distinguish expected absence (no `.woodpecker` directory or no
//! descriptor file, resolved silently) from unexpected failure (clone,
//! commit resolution or blob read going wrong, which is logged). Both hand
//! `None` back to the caller.

use std::path::{Path, PathBuf};
use std::process::Output;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::process::Command;
use tracing::error;

use crate::webhook::WebhookRequest;

/// Directory in the repository root that holds pipeline configuration.
const DESCRIPTOR_DIR: &str = ".woodpecker";
/// Descriptor file naming the template pack and carrying its render data.
const DESCRIPTOR_FILE: &str = "woodpecker-template.yaml";

/// Transport settings shared by all requests.
#[derive(Debug, Clone, Default)]
pub struct ForgeSettings {
    /// Optional CA bundle handed to git for forges behind a private CA.
    pub extra_ca_bundle: Option<PathBuf>,
}

/// Fetch `.woodpecker/woodpecker-template.yaml` at the pipeline commit.
/// `None` means the caller should fall back to using the request as-is.
pub async fn fetch_descriptor(
    request: &WebhookRequest,
    settings: &ForgeSettings,
) -> Option<Vec<u8>> {
    let clone_dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            error!("Error creating clone directory: '{}'", e);
            return None;
        }
    };

    if let Err(e) = clone_bare(request, settings, clone_dir.path()).await {
        error!("Error opening repo: '{}'", e);
        return None;
    }

    let repo = clone_dir.path();
    let commit = &request.pipeline.commit;

    if let Err(e) = resolve_commit(repo, commit).await {
        error!("Error getting commit: '{}'", e);
        return None;
    }

    let dir_entry = match tree_entry(repo, commit, DESCRIPTOR_DIR).await {
        Ok(Some(entry)) => entry,
        // Not finding the directory is an expected case.
        Ok(None) => return None,
        Err(e) => {
            error!("Error listing commit tree: '{}'", e);
            return None;
        }
    };
    if dir_entry.kind != "tree" {
        error!("Entry '{}' is not a directory", DESCRIPTOR_DIR);
        return None;
    }

    let file_entry = match tree_entry(repo, &dir_entry.hash, DESCRIPTOR_FILE).await {
        Ok(Some(entry)) => entry,
        // Not finding the file is an expected case.
        Ok(None) => return None,
        Err(e) => {
            error!("Error listing descriptor directory: '{}'", e);
            return None;
        }
    };
    if file_entry.kind != "blob" {
        error!("Entry '{}' is not a regular file", DESCRIPTOR_FILE);
        return None;
    }
    let Some(size) = file_entry.size else {
        error!("Missing blob size for '{}'", DESCRIPTOR_FILE);
        return None;
    };

    let data = match read_blob(repo, &file_entry.hash).await {
        Ok(data) => data,
        Err(e) => {
            error!("Error reading blob: '{}'", e);
            return None;
        }
    };
    if !blob_size_matches(size, &data) {
        error!("Error reading blob, incorrect size: {}", data.len());
        return None;
    }

    Some(data)
}

/// A blob read is only trusted when the byte count equals the size the
/// forge reported for the blob; a short or long read means the transfer
/// cannot be relied on.
fn blob_size_matches(reported_size: u64, data: &[u8]) -> bool {
    data.len() as u64 == reported_size
}

async fn clone_bare(
    request: &WebhookRequest,
    settings: &ForgeSettings,
    target: &Path,
) -> Result<(), String> {
    let mut args: Vec<String> = Vec::new();

    let netrc = &request.netrc;
    if !netrc.login.is_empty() || !netrc.password.is_empty() {
        let token = BASE64.encode(format!("{}:{}", netrc.login, netrc.password));
        args.push("-c".into());
        args.push(format!("http.extraHeader=Authorization: Basic {}", token));
    }
    if let Some(bundle) = &settings.extra_ca_bundle {
        args.push("-c".into());
        args.push(format!("http.sslCAInfo={}", bundle.display()));
    }
    args.push("clone".into());
    args.push("--bare".into());
    args.push("--quiet".into());
    args.push(request.repo.clone_url.clone());
    args.push(target.to_string_lossy().into_owned());

    let output = Command::new("git")
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .await
        .map_err(|e| format!("git failed to start: {}", e))?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
    }
    Ok(())
}

async fn resolve_commit(repo: &Path, commit: &str) -> Result<(), String> {
    git(repo, &["cat-file", "-e", &format!("{}^{{commit}}", commit)])
        .await
        .map(|_| ())
}

#[derive(Debug)]
struct TreeEntry {
    kind: String,
    hash: String,
    size: Option<u64>,
}

/// Look up a single entry of a tree-ish by name. `Ok(None)` when the entry
/// does not exist.
async fn tree_entry(repo: &Path, treeish: &str, name: &str) -> Result<Option<TreeEntry>, String> {
    let output = git(repo, &["ls-tree", "-l", treeish, "--", name]).await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let Some(line) = stdout.lines().next() else {
        return Ok(None);
    };

    // `<mode> <type> <hash> <size>\t<name>`; size is "-" for subtrees.
    let meta = line.split('\t').next().unwrap_or(line);
    let mut fields = meta.split_whitespace();
    let _mode = fields.next();
    let (Some(kind), Some(hash)) = (fields.next(), fields.next()) else {
        return Err(format!("unparseable ls-tree output: '{}'", line));
    };
    let size = fields.next().and_then(|s| s.parse().ok());

    Ok(Some(TreeEntry {
        kind: kind.to_string(),
        hash: hash.to_string(),
        size,
    }))
}

async fn read_blob(repo: &Path, hash: &str) -> Result<Vec<u8>, String> {
    git(repo, &["cat-file", "blob", hash])
        .await
        .map(|output| output.stdout)
}

async fn git(repo: &Path, args: &[&str]) -> Result<Output, String> {
    let output = Command::new("git")
        .current_dir(repo)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("git failed to start: {}", e))?;
    if !output.status.success() {
        return Err(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or(""),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(output)
}
