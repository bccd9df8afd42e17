//! Renders a named template pack against descriptor data.
//!
//! A pack is a subdirectory of the template root; every regular file in it
//! ending in `.yaml.template` becomes one generated config. Templating is
//! `{{path}}` interpolation only, with dotted-path traversal over the YAML
//! value tree.

use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;
use tracing::warn;

/// Suffix a file must carry to be part of a template pack.
const TEMPLATE_SUFFIX: &str = ".yaml.template";
/// Suffix stripped from the filename to name the generated config.
const NAME_SUFFIX: &str = ".template";

/// `{{path}}` with dot-separated segments; mapping keys or sequence indices.
const PLACEHOLDER_PATTERN: &str = r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.-]*)\s*\}\}";

/// One rendered configuration document.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct GeneratedConfig {
    pub name: String,
    pub data: String,
}

/// Render the pack named by the descriptor. An unknown pack name or an
/// unreadable root is logged and yields an empty result; a file that fails
/// to render is skipped without aborting the rest of the pack. Output is
/// sorted by filename so it does not depend on directory-listing order.
pub fn render(template_root: &Path, template_name: &str, data: &Value) -> Vec<GeneratedConfig> {
    let entries = match fs::read_dir(template_root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read '{}': '{}'", template_root.display(), e);
            return Vec::new();
        }
    };

    let Some(pack_dir) = entries
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.path().is_dir() && entry.file_name().to_string_lossy() == template_name)
    else {
        warn!("Could not find template directory for: '{}'", template_name);
        return Vec::new();
    };

    let mut files: Vec<_> = match fs::read_dir(pack_dir.path()) {
        Ok(entries) => entries.filter_map(|entry| entry.ok()).collect(),
        Err(e) => {
            warn!("Failed to read '{}': '{}'", pack_dir.path().display(), e);
            return Vec::new();
        }
    };
    files.sort_by_key(|entry| entry.file_name());

    let pattern = Regex::new(PLACEHOLDER_PATTERN).unwrap();

    let mut configs = Vec::new();
    for entry in files {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.ends_with(TEMPLATE_SUFFIX) || !entry.path().is_file() {
            continue;
        }
        match apply_template(&entry.path(), &pattern, data) {
            Ok(rendered) => configs.push(GeneratedConfig {
                name: file_name
                    .strip_suffix(NAME_SUFFIX)
                    .unwrap_or(&file_name)
                    .to_string(),
                data: rendered,
            }),
            Err(e) => warn!("Skipping template file '{}': '{}'", file_name, e),
        }
    }
    configs
}

fn apply_template(path: &Path, pattern: &Regex, data: &Value) -> Result<String, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("failed to read template file: {}", e))?;

    let mut failure: Option<String> = None;
    let rendered = pattern
        .replace_all(&content, |caps: &regex::Captures| {
            let path_expr = &caps[1];
            match lookup(data, path_expr) {
                Some(value) => match scalar_to_string(value) {
                    Some(text) => text,
                    None => {
                        failure = Some(format!("'{}' does not name a scalar value", path_expr));
                        String::new()
                    }
                },
                // Placeholders that resolve to nothing render verbatim.
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    match failure {
        Some(e) => Err(e),
        None => Ok(rendered),
    }
}

/// Walk a dotted path through the value tree: mapping lookup by key,
/// sequence lookup by numeric segment.
fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = match current {
            Value::Mapping(_) => current.get(segment)?,
            Value::Sequence(_) => current.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
