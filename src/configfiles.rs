//! Process configuration files regenerated before every boot.
//!
//! A server definition may list files inside its data directory whose values
//! are kept in sync with the server's variables. Each file names a parser and
//! a set of replacements; replacement values may reference variables with
//! `{{env.NAME}}` (or the long form `{{server.build.env.NAME}}`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("configuration file path {0:?} escapes the server directory")]
    InvalidPath(String),

    #[error("unterminated placeholder in {0:?}")]
    UnterminatedPlaceholder(String),

    #[error("failed to update configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationParser {
    /// `key=value` or `key: value` lines. Missing keys are appended.
    Properties,
    /// Any line starting with the match text is replaced wholesale.
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    #[serde(rename = "match")]
    pub matcher: String,
    pub replace_with: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationFile {
    pub file: String,
    pub parser: ConfigurationParser,
    #[serde(default)]
    pub replace: Vec<Replacement>,
}

impl ConfigurationFile {
    /// Rewrites this file below `root` using `variables`.
    pub async fn apply(&self, root: &Path, variables: &HashMap<String, String>) -> Result<(), ConfigFileError> {
        let path = resolve(root, &self.file)?;
        let io_err = |source| ConfigFileError::Io {
            path: path.clone(),
            source,
        };

        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_err(e)),
        };

        let mut rendered = Vec::with_capacity(self.replace.len());
        for r in &self.replace {
            rendered.push((r.matcher.as_str(), render(&r.replace_with, variables)?));
        }

        let updated = match self.parser {
            ConfigurationParser::Properties => rewrite_properties(&existing, &rendered),
            ConfigurationParser::File => rewrite_lines(&existing, &rendered),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, updated).await.map_err(io_err)
    }
}

/// Applies every file, returning the failures rather than stopping at the first.
pub async fn update_all(
    root: &Path,
    files: &[ConfigurationFile],
    variables: &HashMap<String, String>,
) -> Vec<ConfigFileError> {
    let mut failures = Vec::new();
    for file in files {
        if let Err(e) = file.apply(root, variables).await {
            failures.push(e);
        }
    }
    failures
}

fn resolve(root: &Path, file: &str) -> Result<PathBuf, ConfigFileError> {
    let relative = Path::new(file);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe || file.is_empty() {
        return Err(ConfigFileError::InvalidPath(file.to_string()));
    }
    Ok(root.join(relative))
}

/// Substitutes `{{env.NAME}}` placeholders. Unknown variables render empty.
pub fn render(template: &str, variables: &HashMap<String, String>) -> Result<String, ConfigFileError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| ConfigFileError::UnterminatedPlaceholder(template.to_string()))?;
        let key = after[..end].trim();
        let name = key
            .strip_prefix("server.build.env.")
            .or_else(|| key.strip_prefix("env."))
            .unwrap_or(key);
        if let Some(value) = variables.get(name) {
            out.push_str(value);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn rewrite_properties(existing: &str, replacements: &[(&str, String)]) -> String {
    let mut applied = vec![false; replacements.len()];
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') || trimmed.starts_with('!') {
                return line.to_string();
            }
            let Some(split) = trimmed.find(['=', ':']) else {
                return line.to_string();
            };
            let key = trimmed[..split].trim();
            match replacements.iter().position(|(m, _)| *m == key) {
                Some(i) => {
                    applied[i] = true;
                    format!("{}={}", key, replacements[i].1)
                }
                None => line.to_string(),
            }
        })
        .collect();

    for (i, (key, value)) in replacements.iter().enumerate() {
        if !applied[i] {
            lines.push(format!("{}={}", key, value));
        }
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn rewrite_lines(existing: &str, replacements: &[(&str, String)]) -> String {
    let mut out: String = existing
        .lines()
        .map(|line| {
            replacements
                .iter()
                .find(|(m, _)| line.starts_with(m))
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| line.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
