//! Integration tests for the plugin launcher.

use almanac_daemon::config::Config;
use almanac_daemon::launcher::PluginLauncher;
use almanac_plugins::{
    AggregateRepository, Fetcher, LocalRepository, PluginRepository, RemoteRepository, RepoError,
    RepoResult,
};
use almanac_script::{LanguageRegistry, NativeValue, ProcessState};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ==============================================================================
// Test Fixture Helpers
// ==============================================================================

const REPO: &str = "https://plugins.example.com/";

struct StaticFetcher(HashMap<String, String>);

impl Fetcher for StaticFetcher {
    fn get_text(&self, url: &str) -> RepoResult<String> {
        self.0.get(url).cloned().ok_or_else(|| RepoError::Fetch {
            url: url.to_string(),
            message: "404 Not Found".to_string(),
        })
    }

    fn download(&self, url: &str, dest: &Path) -> RepoResult<()> {
        fs::write(dest, self.get_text(url)?)?;
        Ok(())
    }
}

fn index_json(name: &str, init_script: &str) -> String {
    format!(
        r#"{{"metadata": {{"name": "{name}", "version": "1.0", "description": "{name} plugin"}},
            "init_script": "{init_script}"}}"#
    )
}

fn cache_plugin(root: &Path, name: &str, init_script: &str, source: &str) {
    let dir = root.join(name).join("1.0");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("index.json"), index_json(name, init_script)).unwrap();
    fs::write(dir.join(init_script), source).unwrap();
}

fn launcher(dir: &TempDir) -> PluginLauncher {
    let mut documents = HashMap::new();
    documents.insert(
        REPO.to_string(),
        r#"{"metadata": {"name": "main"}, "plugins": ["weather"]}"#.to_string(),
    );
    documents.insert(
        format!("{REPO}weather/index.json"),
        index_json("weather", "init.lua"),
    );
    documents.insert(
        format!("{REPO}weather/init.lua"),
        "assert(PLUGIN_NAME == 'weather')".to_string(),
    );

    let local = Arc::new(LocalRepository::new(dir.path()).unwrap());
    let aggregate = Arc::new(AggregateRepository::new());
    aggregate.add_repository(Arc::new(RemoteRepository::new(
        REPO,
        Arc::clone(&local),
        Arc::new(StaticFetcher(documents)),
    )));
    let languages = Arc::new(LanguageRegistry::with_defaults().unwrap());

    PluginLauncher::new(local, aggregate, languages)
}

// ==============================================================================
// Launch Tests
// ==============================================================================

#[test]
fn test_launch_cached_plugin_with_env() {
    let dir = TempDir::new().unwrap();
    cache_plugin(
        dir.path(),
        "notes",
        "init.lua",
        r#"
        assert(PLUGIN_NAME == "notes")
        assert(PLUGIN_VERSION == "1.0")
        assert(type(PLUGIN_DIR) == "string")
        assert(greeting == "hello")
        log.info("notes plugin started")
        "#,
    );
    let launcher = launcher(&dir);

    let process = launcher
        .launch("notes", vec![("greeting".to_string(), NativeValue::from("hello"))])
        .unwrap()
        .expect("notes is cached");

    assert_eq!(process.label(), "notes@1.0");
    assert_eq!(process.wait(), ProcessState::Completed, "{:?}", process.error());
}

#[test]
fn test_launcher_from_config() {
    let dir = TempDir::new().unwrap();
    cache_plugin(dir.path(), "notes", "init.lua", "assert(PLUGIN_NAME == 'notes')");

    let mut config = Config::default();
    config.plugins.directory = Some(dir.path().to_path_buf());
    config.plugins.request_timeout_secs = Some(5);
    let launcher = PluginLauncher::from_config(&config).unwrap();

    assert_eq!(launcher.local().plugins().len(), 1);
    let process = launcher.launch("notes", Vec::new()).unwrap().unwrap();
    assert_eq!(process.wait(), ProcessState::Completed, "{:?}", process.error());
}

#[test]
fn test_launch_missing_plugin() {
    let dir = TempDir::new().unwrap();
    let launcher = launcher(&dir);
    assert!(launcher.launch("missing", Vec::new()).unwrap().is_none());
}

#[test]
fn test_launch_unknown_language() {
    let dir = TempDir::new().unwrap();
    cache_plugin(dir.path(), "py", "init.py", "print('hi')");
    let launcher = launcher(&dir);
    assert!(launcher.launch("py", Vec::new()).unwrap().is_none());
}

#[test]
fn test_launched_plugin_can_be_cancelled() {
    let dir = TempDir::new().unwrap();
    cache_plugin(dir.path(), "spin", "init.lua", "while true do end");
    let launcher = launcher(&dir);

    let process = launcher.launch("spin", Vec::new()).unwrap().unwrap();
    assert!(process.cancel());
    assert_eq!(process.state(), ProcessState::Cancelled);
}

// ==============================================================================
// Install Tests
// ==============================================================================

#[test]
fn test_install_then_launch() {
    let dir = TempDir::new().unwrap();
    let launcher = launcher(&dir);
    launcher.sync().unwrap();

    assert!(launcher.launch("weather", Vec::new()).unwrap().is_none());

    let plugin = launcher.install("weather").unwrap();
    assert_eq!(plugin.name(), "weather");
    assert!(dir.path().join("weather").join("1.0").join("init.lua").is_file());

    let process = launcher.launch("weather", Vec::new()).unwrap().unwrap();
    assert_eq!(process.wait(), ProcessState::Completed);
}

#[test]
fn test_install_unknown_plugin() {
    let dir = TempDir::new().unwrap();
    let launcher = launcher(&dir);
    launcher.sync().unwrap();
    assert!(launcher.install("nothing").is_err());
}

#[test]
fn test_list_plugins() {
    let dir = TempDir::new().unwrap();
    cache_plugin(dir.path(), "notes", "init.lua", "");
    let launcher = launcher(&dir);
    launcher.sync().unwrap();

    let entries = launcher.list_plugins();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "notes");
    assert_eq!(entries[0].source, "localhost");
    assert!(entries[0].installed);
    assert_eq!(entries[1].name, "weather");
    assert_eq!(entries[1].source, "main");
    assert!(!entries[1].installed);

    launcher.install("weather").unwrap();
    let entries = launcher.list_plugins();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().filter(|e| e.name == "weather").all(|e| e.installed));
}
