//! Plugin and repository index documents.
//!
//! A plugin bundle is described by an `index.json`:
//!
//! ```json
//! {
//!   "metadata": {
//!     "name": "calendar",
//!     "icon": "calendar.png",
//!     "author": "ada",
//!     "version": "1.2.0",
//!     "description": "Month view"
//!   },
//!   "init_script": "init.lua",
//!   "resources": ["calendar.png", "views/month.lua"]
//! }
//! ```
//!
//! A remote repository root serves a listing with its own metadata and the
//! locations of every plugin index it hosts.

use crate::error::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// File name of plugin index documents.
pub const INDEX_FILE: &str = "index.json";

/// Descriptive metadata of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,

    #[serde(default)]
    pub icon: String,

    #[serde(default)]
    pub author: String,

    /// Opaque version string; only used as a cache partition key.
    pub version: String,

    #[serde(default)]
    pub description: String,
}

/// A plugin bundle: metadata, one init script and resource files.
///
/// Equality is by value, so identical records from different repositories
/// are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plugin {
    pub metadata: PluginMetadata,

    /// Path of the init script, relative to the bundle root.
    pub init_script: String,

    /// Resource paths, relative to the bundle root.
    #[serde(default)]
    pub resources: Vec<String>,
}

impl Plugin {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Parse and validate an index document.
    pub fn from_json(text: &str) -> RepoResult<Self> {
        let plugin: Plugin = serde_json::from_str(text)?;
        plugin.validate()?;
        Ok(plugin)
    }

    pub fn to_json(&self) -> RepoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every file belonging to the bundle: resources first, then the init
    /// script.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.resources
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.init_script.as_str()))
    }

    /// Check that the plugin can be stored on disk without escaping its
    /// cache directory.
    pub fn validate(&self) -> RepoResult<()> {
        validate_segment("name", &self.metadata.name)?;
        validate_segment("version", &self.metadata.version)?;

        if relative_path(&self.init_script).is_empty() {
            return Err(RepoError::InvalidPlugin(format!(
                "{}: init script path cannot be empty",
                self
            )));
        }
        for file in self.files() {
            let escapes = file.split(['/', '\\']).any(|part| part == "..");
            if escapes {
                return Err(RepoError::InvalidPlugin(format!(
                    "{}: path '{}' leaves the plugin directory",
                    self, file
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.metadata.name, self.metadata.version)
    }
}

fn validate_segment(field: &str, value: &str) -> RepoResult<()> {
    if value.is_empty() {
        return Err(RepoError::InvalidPlugin(format!(
            "Plugin {} cannot be empty",
            field
        )));
    }
    // Dot-prefixed directories are reserved for download staging.
    if value.starts_with('.') || value.contains(['/', '\\']) {
        return Err(RepoError::InvalidPlugin(format!(
            "Plugin {} '{}' is not a valid directory name",
            field, value
        )));
    }
    Ok(())
}

/// Strip a leading `./` or `/` from a bundle-relative path.
pub fn relative_path(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_start_matches('/')
}

/// Descriptive metadata of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub name: String,

    #[serde(default)]
    pub icon: String,

    #[serde(default)]
    pub description: String,
}

impl RepoMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: String::new(),
            description: description.into(),
        }
    }
}

/// The document served at a remote repository's root URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoListing {
    pub metadata: RepoMetadata,

    /// Absolute URLs or paths relative to the listing, each pointing at a
    /// plugin index.
    #[serde(default)]
    pub plugins: Vec<String>,
}
