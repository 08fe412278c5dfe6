//! Registry of installed plugin languages.
//!
//! Dispatches a script file to the language whose extension list contains
//! the file's extension (everything after the first `.` of the file name).

use crate::error::RuntimeResult;
use crate::language::{LuaLanguage, PluginLanguage};
use crate::process::ScriptProcess;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps file extensions to plugin languages.
pub struct LanguageRegistry {
    languages: Vec<Arc<dyn PluginLanguage>>,
}

impl LanguageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            languages: Vec::new(),
        }
    }

    /// Registry with the bundled languages (Lua with its standard APIs).
    pub fn with_defaults() -> RuntimeResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(LuaLanguage::with_standard_apis()?));
        Ok(registry)
    }

    /// Install a language. Earlier registrations win on shared extensions.
    pub fn register(&mut self, language: Arc<dyn PluginLanguage>) {
        info!(
            "Registered plugin language: {} (api {}, extensions: {})",
            language.name(),
            language.api_version(),
            language.extensions().join(", ")
        );
        self.languages.push(language);
    }

    /// Installed languages, in registration order.
    pub fn languages(&self) -> &[Arc<dyn PluginLanguage>] {
        &self.languages
    }

    /// Find the language for a file name, if any handles its extension.
    pub fn get_language_for_file(&self, file_name: &str) -> Option<Arc<dyn PluginLanguage>> {
        let (_, extension) = file_name.split_once('.')?;
        self.languages
            .iter()
            .find(|lang| lang.extensions().contains(&extension))
            .cloned()
    }

    /// Prepare a process for a script file.
    ///
    /// Returns `Ok(None)` when no installed language handles the file;
    /// failing to read the file is an error.
    pub fn execute(&self, path: &Path) -> RuntimeResult<Option<ScriptProcess>> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        self.execute_as(file_name, path)
    }

    /// Like [`execute`](Self::execute), with the process labelled `label`.
    pub fn execute_as(&self, label: &str, path: &Path) -> RuntimeResult<Option<ScriptProcess>> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some(language) = self.get_language_for_file(file_name) else {
            debug!("No plugin language for {:?}", path);
            return Ok(None);
        };

        debug!("Executing {:?} with {}", path, language.name());
        language.execute_file_as(label, path).map(Some)
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
