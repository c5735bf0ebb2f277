//! `{{env.NAME}}` placeholder expansion and `.env` loading

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
            .expect("placeholder pattern is valid")
    })
}

/// Variable source for scenario expansion
///
/// Explicitly set variables shadow the process environment. Placeholders
/// naming an unknown variable are left in place.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    variables: BTreeMap<String, String>,
}

impl Environment {
    /// Empty environment backed only by the process environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `.env`-style content
    ///
    /// Quoting, escapes, `export` prefixes and trailing comments follow
    /// dotenvy. A malformed line is a configuration error.
    pub fn from_dotenv_str(content: &str) -> EngineResult<Self> {
        Self::collect(dotenvy::from_read_iter(content.as_bytes()), "inline content")
    }

    /// Load a `.env` file
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let entries = dotenvy::from_path_iter(path).map_err(|e| {
            EngineError::config(format!("failed to read environment file {source}: {e}"))
        })?;
        let env = Self::collect(entries, &source)?;
        debug!(path = %source, variables = env.variables.len(), "Loaded environment file");
        Ok(env)
    }

    fn collect(
        entries: impl Iterator<Item = Result<(String, String), dotenvy::Error>>,
        source: &str,
    ) -> EngineResult<Self> {
        let mut env = Self::new();
        for entry in entries {
            let (key, value) = entry.map_err(|e| {
                EngineError::config(format!("invalid environment file {source}: {e}"))
            })?;
            env.set(key, value);
        }
        Ok(env)
    }

    /// Set a variable
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Copy every variable from `other`, keeping existing ones
    pub fn merge_missing(&mut self, other: &BTreeMap<String, String>) {
        for (key, value) in other {
            self.variables
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Look up a variable, falling back to the process environment
    pub fn get(&self, key: &str) -> Option<String> {
        self.variables
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Replace every known `{{env.NAME}}` placeholder in `template`
    pub fn expand(&self, template: &str) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        placeholder()
            .replace_all(template, |caps: &Captures<'_>| {
                self.get(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}
