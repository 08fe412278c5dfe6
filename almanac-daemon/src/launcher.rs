//! Plugin launcher: ties repositories to the language registry.
//!
//! Plugins are resolved in the local cache, installed from the remote
//! repositories when missing, and started by handing their init script to
//! the language registry.

use crate::config::Config;
use almanac_plugins::{
    AggregateRepository, HttpFetcher, LocalRepository, Plugin, PluginRepository, RemoteRepository,
};
use almanac_script::{LanguageRegistry, NativeValue, ScriptProcess};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A plugin as seen by the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Name of the repository listing this entry.
    pub source: String,
    /// Whether this exact plugin is in the local cache.
    pub installed: bool,
}

/// Installs and runs plugins.
pub struct PluginLauncher {
    local: Arc<LocalRepository>,
    aggregate: Arc<AggregateRepository>,
    languages: Arc<LanguageRegistry>,
}

impl PluginLauncher {
    /// Create a launcher from its parts.
    pub fn new(
        local: Arc<LocalRepository>,
        aggregate: Arc<AggregateRepository>,
        languages: Arc<LanguageRegistry>,
    ) -> Self {
        Self {
            local,
            aggregate,
            languages,
        }
    }

    /// Build the cache, the enabled remote repositories and the default
    /// languages described by `config`. Nothing is synced yet.
    pub fn from_config(config: &Config) -> Result<Self> {
        let plugins_dir = config.plugins_dir();
        info!("Using plugin cache at: {}", plugins_dir.display());
        let local = Arc::new(LocalRepository::new(&plugins_dir).with_context(|| {
            format!("Failed to open plugin cache: {}", plugins_dir.display())
        })?);

        let fetcher = match config.request_timeout() {
            Some(timeout) => HttpFetcher::new().with_timeout(timeout),
            None => HttpFetcher::new(),
        };
        let fetcher = Arc::new(fetcher);
        let aggregate = Arc::new(AggregateRepository::new());
        for url in config.enabled_repositories() {
            aggregate.add_repository(Arc::new(RemoteRepository::new(
                url,
                Arc::clone(&local),
                fetcher.clone(),
            )));
        }

        let languages =
            LanguageRegistry::with_defaults().context("Failed to initialize plugin languages")?;

        Ok(Self::new(local, aggregate, Arc::new(languages)))
    }

    pub fn local(&self) -> &Arc<LocalRepository> {
        &self.local
    }

    pub fn aggregate(&self) -> &Arc<AggregateRepository> {
        &self.aggregate
    }

    /// Rescan the local cache and sync every remote repository.
    ///
    /// Blocks for the whole sync.
    pub fn sync(&self) -> Result<()> {
        self.local
            .update_list()
            .context("Failed to scan the plugin cache")?;
        self.aggregate
            .update_list()
            .context("Failed to sync plugin repositories")?;
        info!(
            "Plugin sync complete: {} cached, {} available remotely",
            self.local.plugins().len(),
            self.aggregate.plugins().len()
        );
        Ok(())
    }

    /// Make sure a plugin is in the local cache, downloading it if needed.
    pub fn install(&self, name: &str) -> Result<Plugin> {
        if let Some(plugin) = self.local.find_plugin_by_name(name) {
            debug!("Plugin {} already installed", plugin);
            return Ok(plugin);
        }

        let plugin = self
            .aggregate
            .find_plugin_by_name(name)
            .with_context(|| format!("Plugin '{}' is not listed by any repository", name))?;
        self.aggregate
            .download_plugin(&plugin)
            .with_context(|| format!("Failed to download plugin {}", plugin))?;
        Ok(plugin)
    }

    /// Start a cached plugin's init script.
    ///
    /// The script sees `PLUGIN_NAME`, `PLUGIN_VERSION` and `PLUGIN_DIR`
    /// plus every variable in `env`. Returns `None` when the plugin is not
    /// cached or no language handles its init script.
    pub fn launch(
        &self,
        name: &str,
        env: impl IntoIterator<Item = (String, NativeValue)>,
    ) -> Result<Option<ScriptProcess>> {
        let Some(plugin) = self.local.find_plugin_by_name(name) else {
            warn!("Plugin '{}' is not installed", name);
            return Ok(None);
        };
        let (Some(dir), Some(script)) = (
            self.local.plugin_dir(&plugin),
            self.local.init_script_path(&plugin),
        ) else {
            return Ok(None);
        };

        let label = plugin.to_string();
        let Some(process) = self
            .languages
            .execute_as(&label, &script)
            .with_context(|| format!("Failed to load init script: {}", script.display()))?
        else {
            warn!("No plugin language for init script {}", script.display());
            return Ok(None);
        };

        process.set_env("PLUGIN_NAME", plugin.name())?;
        process.set_env("PLUGIN_VERSION", plugin.version())?;
        process.set_env("PLUGIN_DIR", dir.to_string_lossy().into_owned())?;
        for (key, value) in env {
            process.set_env(key, value)?;
        }

        process.on_complete(move |cancelled, error| match (cancelled, error) {
            (true, _) => info!("Plugin {} was cancelled", label),
            (false, Some(e)) => warn!("Plugin {} failed: {}", label, e),
            (false, None) => info!("Plugin {} finished", label),
        });

        info!("Launching plugin {}", plugin);
        process.start()?;
        Ok(Some(process))
    }

    /// Cached plugins first, then everything the remote repositories list.
    pub fn list_plugins(&self) -> Vec<PluginEntry> {
        let cached = self.local.plugins();
        let entry = |plugin: &Plugin, source: &str, installed: bool| PluginEntry {
            name: plugin.name().to_string(),
            version: plugin.version().to_string(),
            description: plugin.metadata.description.clone(),
            source: source.to_string(),
            installed,
        };

        let local_name = self.local.metadata().name;
        let mut entries: Vec<PluginEntry> = cached
            .iter()
            .map(|plugin| entry(plugin, &local_name, true))
            .collect();

        for repo in self.aggregate.repositories() {
            let source = repo.metadata().name;
            for plugin in repo.plugins() {
                entries.push(entry(&plugin, &source, cached.contains(&plugin)));
            }
        }
        entries
    }
}
