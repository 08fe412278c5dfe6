//! The common repository interface.

use crate::error::RepoResult;
use crate::plugin::{Plugin, RepoMetadata};

/// A catalog of plugins.
///
/// All operations block the caller; run them on a background thread when
/// responsiveness matters.
pub trait PluginRepository: Send + Sync {
    fn metadata(&self) -> RepoMetadata;

    /// Epoch milliseconds of the last successful sync, or `-1` before the
    /// first one.
    fn last_updated(&self) -> i64;

    fn plugins(&self) -> Vec<Plugin>;

    /// Rebuild the catalog from scratch.
    fn update_list(&self) -> RepoResult<()>;

    /// Find a plugin by exact name.
    fn find_plugin_by_name(&self, name: &str) -> Option<Plugin> {
        self.plugins().into_iter().find(|p| p.name() == name)
    }
}

/// Current time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
