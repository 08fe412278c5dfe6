//! The local plugin cache.
//!
//! Layout: `<root>/<plugin-name>/<plugin-version>/index.json`, with the
//! bundle's files next to the index. Directories whose names start with a
//! dot are ignored; downloads are staged in them.

use crate::error::{RepoError, RepoResult};
use crate::plugin::{relative_path, Plugin, RepoMetadata, INDEX_FILE};
use crate::repository::{now_millis, PluginRepository};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Default cache root, relative to the working directory.
pub const DEFAULT_ROOT: &str = "plugins";

struct Catalog {
    plugins: Vec<(Plugin, PathBuf)>,
    last_updated: i64,
}

/// Plugins cached on local disk.
pub struct LocalRepository {
    root: PathBuf,
    catalog: Mutex<Catalog>,
}

impl LocalRepository {
    /// Open the cache at `root`, creating the directory if missing.
    pub fn new(root: impl Into<PathBuf>) -> RepoResult<Self> {
        let root = root.into();
        if !root.exists() {
            info!("Creating plugin cache directory: {:?}", root);
        }
        fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            catalog: Mutex::new(Catalog {
                plugins: Vec::new(),
                last_updated: -1,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a plugin is (or would be) cached.
    pub fn cache_dir(&self, plugin: &Plugin) -> PathBuf {
        self.root.join(plugin.name()).join(plugin.version())
    }

    /// Directory of a cataloged plugin.
    pub fn plugin_dir(&self, plugin: &Plugin) -> Option<PathBuf> {
        self.lock()
            .plugins
            .iter()
            .find(|(p, _)| p == plugin)
            .map(|(_, dir)| dir.clone())
    }

    /// Path of a cataloged plugin's init script.
    pub fn init_script_path(&self, plugin: &Plugin) -> Option<PathBuf> {
        self.plugin_dir(plugin)
            .map(|dir| dir.join(relative_path(&plugin.init_script)))
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scan(&self) -> RepoResult<Vec<(Plugin, PathBuf)>> {
        let mut found: Vec<(Plugin, PathBuf)> = Vec::new();

        for name_dir in subdirectories(&self.root)? {
            let versions = match subdirectories(&name_dir) {
                Ok(versions) => versions,
                Err(e) => {
                    warn!("Skipping unreadable plugin directory {:?}: {}", name_dir, e);
                    continue;
                }
            };

            for version_dir in versions {
                let index = version_dir.join(INDEX_FILE);
                if !index.is_file() {
                    debug!("No index in {:?}, skipping", version_dir);
                    continue;
                }

                match fs::read_to_string(&index)
                    .map_err(RepoError::from)
                    .and_then(|text| Plugin::from_json(&text))
                {
                    Ok(plugin) => {
                        debug!("Found cached plugin {} in {:?}", plugin, version_dir);
                        if !found.iter().any(|(p, _)| p == &plugin) {
                            found.push((plugin, version_dir));
                        }
                    }
                    Err(e) => warn!("Skipping invalid plugin index {:?}: {}", index, e),
                }
            }
        }

        Ok(found)
    }
}

impl PluginRepository for LocalRepository {
    fn metadata(&self) -> RepoMetadata {
        RepoMetadata::new("localhost", "The internal local repository.")
    }

    fn last_updated(&self) -> i64 {
        self.lock().last_updated
    }

    /// Rescans the cache, then returns its contents. A failed rescan keeps
    /// the previous catalog.
    fn plugins(&self) -> Vec<Plugin> {
        if let Err(e) = self.update_list() {
            warn!("Failed to rescan plugin cache {:?}: {}", self.root, e);
        }
        self.lock().plugins.iter().map(|(p, _)| p.clone()).collect()
    }

    fn update_list(&self) -> RepoResult<()> {
        let mut catalog = self.lock();
        let plugins = self.scan()?;
        debug!("Local plugin cache holds {} plugin(s)", plugins.len());
        catalog.plugins = plugins;
        catalog.last_updated = now_millis();
        Ok(())
    }
}

/// Visible subdirectories of `dir`, sorted by name.
fn subdirectories(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
