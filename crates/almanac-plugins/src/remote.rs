//! A single remote plugin repository.
//!
//! The root URL serves a [`RepoListing`]; every listed reference resolves
//! to a plugin index. Syncing is all-or-nothing: the new catalog is
//! committed only once every index has been fetched and parsed.

use crate::error::{RepoError, RepoResult};
use crate::fetch::Fetcher;
use crate::local::LocalRepository;
use crate::plugin::{relative_path, Plugin, RepoListing, RepoMetadata, INDEX_FILE};
use crate::repository::{now_millis, PluginRepository};
use std::fs;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use tracing::{debug, info};

struct Catalog {
    metadata: RepoMetadata,
    /// Each plugin with the base URL its files are served under.
    plugins: Vec<(Plugin, String)>,
    last_updated: i64,
}

/// Plugins listed by one remote repository.
pub struct RemoteRepository {
    url: String,
    local: Arc<LocalRepository>,
    fetcher: Arc<dyn Fetcher>,
    sync_lock: Mutex<()>,
    catalog: RwLock<Catalog>,
}

impl RemoteRepository {
    /// Create a repository for the listing at `url`. Nothing is fetched
    /// until [`PluginRepository::update_list`] is called.
    pub fn new(url: impl Into<String>, local: Arc<LocalRepository>, fetcher: Arc<dyn Fetcher>) -> Self {
        let url = url.into();
        Self {
            catalog: RwLock::new(Catalog {
                metadata: RepoMetadata::new(url.clone(), ""),
                plugins: Vec::new(),
                last_updated: -1,
            }),
            url,
            local,
            fetcher,
            sync_lock: Mutex::new(()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the current catalog lists `plugin`.
    pub fn hosts(&self, plugin: &Plugin) -> bool {
        self.base_url(plugin).is_some()
    }

    fn base_url(&self, plugin: &Plugin) -> Option<String> {
        self.read()
            .plugins
            .iter()
            .find(|(p, _)| p == plugin)
            .map(|(_, base)| base.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Download a plugin into the local cache.
    ///
    /// Skipped when the version directory already exists. Files are staged
    /// in a hidden directory and moved into place once all of them arrived,
    /// so a failed download leaves nothing behind. The local repository is
    /// rescanned afterwards.
    pub fn download_plugin(&self, plugin: &Plugin) -> RepoResult<()> {
        let base = self
            .base_url(plugin)
            .ok_or_else(|| RepoError::NotHosted(plugin.to_string()))?;

        let target = self.local.cache_dir(plugin);
        if target.exists() {
            debug!("Plugin {} already cached at {:?}", plugin, target);
            return Ok(());
        }

        info!("Downloading plugin {} from {}", plugin, base);
        let staging = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(self.local.root())?;

        // The index is already known, no need to fetch it again.
        fs::write(staging.path().join(INDEX_FILE), plugin.to_json()?)?;

        for file in plugin.files() {
            let path = relative_path(file);
            let dest = staging.path().join(path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            self.fetcher.download(&format!("{}{}", base, path), &dest)?;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(e) = fs::rename(staging.path(), &target) {
            if target.exists() {
                debug!("Plugin {} was cached concurrently", plugin);
                return Ok(());
            }
            return Err(e.into());
        }

        info!("Installed plugin {} into {:?}", plugin, target);
        self.local.update_list()
    }
}

impl PluginRepository for RemoteRepository {
    fn metadata(&self) -> RepoMetadata {
        self.read().metadata.clone()
    }

    fn last_updated(&self) -> i64 {
        self.read().last_updated
    }

    fn plugins(&self) -> Vec<Plugin> {
        self.read().plugins.iter().map(|(p, _)| p.clone()).collect()
    }

    fn update_list(&self) -> RepoResult<()> {
        let _sync = self.sync_lock.lock().unwrap_or_else(PoisonError::into_inner);
        info!("Syncing plugin repository {}", self.url);

        let listing: RepoListing = serde_json::from_str(&self.fetcher.get_text(&self.url)?)?;

        let mut plugins: Vec<(Plugin, String)> = Vec::with_capacity(listing.plugins.len());
        for reference in &listing.plugins {
            let index_url = normalize_url(&self.url, reference);
            let plugin = Plugin::from_json(&self.fetcher.get_text(&index_url)?)?;
            let base = index_url
                .strip_suffix(INDEX_FILE)
                .unwrap_or(&index_url)
                .to_string();
            debug!("Listed plugin {} at {}", plugin, base);
            if !plugins.iter().any(|(p, _)| p == &plugin) {
                plugins.push((plugin, base));
            }
        }

        info!("Repository {} lists {} plugin(s)", self.url, plugins.len());
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        *catalog = Catalog {
            metadata: listing.metadata,
            plugins,
            last_updated: now_millis(),
        };
        Ok(())
    }
}

/// Resolve a listing reference to the URL of a plugin index.
///
/// References without a scheme are relative to the listing URL (with a
/// trailing `index.json` removed). The result always ends in `/index.json`.
pub fn normalize_url(parent: &str, reference: &str) -> String {
    let mut url = if reference.contains("://") {
        reference.to_string()
    } else {
        let base = parent.strip_suffix(INDEX_FILE).unwrap_or(parent);
        let reference = reference.strip_prefix("./").unwrap_or(reference);
        match (base.ends_with('/'), reference.starts_with('/')) {
            (true, true) => format!("{}{}", base, &reference[1..]),
            (false, false) => format!("{}/{}", base, reference),
            _ => format!("{}{}", base, reference),
        }
    };

    if url.ends_with(INDEX_FILE) {
        return url;
    }
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str(INDEX_FILE);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    const ROOT: &str = "https://plugins.example.com/repo/";

    #[derive(Default)]
    struct MemoryFetcher {
        documents: Mutex<HashMap<String, String>>,
    }

    impl MemoryFetcher {
        fn serve(&self, url: &str, body: &str) {
            self.documents
                .lock()
                .unwrap()
                .insert(url.to_string(), body.to_string());
        }

        fn remove(&self, url: &str) {
            self.documents.lock().unwrap().remove(url);
        }
    }

    impl Fetcher for MemoryFetcher {
        fn get_text(&self, url: &str) -> RepoResult<String> {
            self.documents
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| RepoError::Fetch {
                    url: url.to_string(),
                    message: "404 Not Found".to_string(),
                })
        }

        fn download(&self, url: &str, dest: &Path) -> RepoResult<()> {
            let body = self.get_text(url)?;
            fs::write(dest, body)?;
            Ok(())
        }
    }

    fn index(name: &str, version: &str) -> String {
        format!(
            r#"{{"metadata": {{"name": "{name}", "version": "{version}"}},
                "init_script": "./init.lua", "resources": ["/res/icon.txt"]}}"#
        )
    }

    fn fixture() -> (TempDir, Arc<MemoryFetcher>, Arc<LocalRepository>, RemoteRepository) {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MemoryFetcher::default());
        fetcher.serve(
            ROOT,
            r#"{"metadata": {"name": "main", "icon": "", "description": "Main"},
                "plugins": ["calendar", "https://mirror.example.com/notes/"]}"#,
        );
        fetcher.serve(&format!("{ROOT}calendar/index.json"), &index("calendar", "1.0"));
        fetcher.serve(&format!("{ROOT}calendar/init.lua"), "-- calendar");
        fetcher.serve(&format!("{ROOT}calendar/res/icon.txt"), "icon");
        fetcher.serve("https://mirror.example.com/notes/index.json", &index("notes", "0.3"));

        let local = Arc::new(LocalRepository::new(dir.path()).unwrap());
        let remote = RemoteRepository::new(ROOT, Arc::clone(&local), fetcher.clone());
        (dir, fetcher, local, remote)
    }

    #[test]
    fn test_normalize_url() {
        let parent = "https://example.com/repo";
        assert_eq!(normalize_url(parent, "a"), "https://example.com/repo/a/index.json");
        assert_eq!(normalize_url(parent, "/a"), "https://example.com/repo/a/index.json");
        assert_eq!(normalize_url("https://example.com/repo/", "/a"), "https://example.com/repo/a/index.json");
        assert_eq!(normalize_url("https://example.com/repo/", "./a/"), "https://example.com/repo/a/index.json");
        assert_eq!(
            normalize_url("https://example.com/repo/index.json", "a"),
            "https://example.com/repo/a/index.json"
        );
        assert_eq!(
            normalize_url(parent, "https://cdn.example.com/x"),
            "https://cdn.example.com/x/index.json"
        );
        assert_eq!(
            normalize_url(parent, "https://cdn.example.com/x/index.json"),
            "https://cdn.example.com/x/index.json"
        );
    }

    #[test]
    fn test_metadata_before_sync() {
        let (_dir, _fetcher, _local, remote) = fixture();
        assert_eq!(remote.last_updated(), -1);
        assert_eq!(remote.metadata().name, ROOT);
        assert!(remote.plugins().is_empty());
    }

    #[test]
    fn test_sync_lists_plugins() {
        let (_dir, _fetcher, _local, remote) = fixture();
        remote.update_list().unwrap();

        assert!(remote.last_updated() > -1);
        assert_eq!(remote.metadata().name, "main");
        let names: Vec<String> = remote.plugins().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["calendar", "notes"]);
        assert!(remote.find_plugin_by_name("missing").is_none());
    }

    #[test]
    fn test_failed_sync_keeps_previous_catalog() {
        let (_dir, fetcher, _local, remote) = fixture();
        remote.update_list().unwrap();
        let synced_at = remote.last_updated();

        fetcher.remove("https://mirror.example.com/notes/index.json");
        let err = remote.update_list().unwrap_err();
        assert!(err.is_io());
        assert_eq!(remote.plugins().len(), 2);
        assert_eq!(remote.last_updated(), synced_at);
    }

    #[test]
    fn test_download_installs_into_cache() {
        let (dir, _fetcher, local, remote) = fixture();
        remote.update_list().unwrap();
        let calendar = remote.find_plugin_by_name("calendar").unwrap();

        remote.download_plugin(&calendar).unwrap();

        let cached = dir.path().join("calendar").join("1.0");
        assert_eq!(fs::read_to_string(cached.join("init.lua")).unwrap(), "-- calendar");
        assert_eq!(fs::read_to_string(cached.join("res/icon.txt")).unwrap(), "icon");
        assert_eq!(
            Plugin::from_json(&fs::read_to_string(cached.join(INDEX_FILE)).unwrap()).unwrap(),
            calendar
        );
        assert_eq!(local.find_plugin_by_name("calendar"), Some(calendar));
    }

    #[test]
    fn test_failed_download_leaves_nothing() {
        let (dir, _fetcher, local, remote) = fixture();
        remote.update_list().unwrap();
        // notes' files are not served
        let notes = remote.find_plugin_by_name("notes").unwrap();

        let err = remote.download_plugin(&notes).unwrap_err();
        assert!(err.is_io());
        assert!(!dir.path().join("notes").join("0.3").exists());
        assert!(local.plugins().is_empty());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".download-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_download_unlisted_plugin() {
        let (_dir, _fetcher, local, remote) = fixture();
        let stranger = Plugin::from_json(&index("stranger", "1")).unwrap();
        let err = remote.download_plugin(&stranger).unwrap_err();
        assert!(matches!(err, RepoError::NotHosted(_)));
        assert!(!err.is_io());
        assert!(local.plugins().is_empty());
    }
}
