//! Several remote repositories behind one catalog.
//!
//! Every operation works on a snapshot of the member list taken when it
//! starts, so members added or removed meanwhile affect only later calls.

use crate::error::{RepoError, RepoResult};
use crate::plugin::{Plugin, RepoMetadata};
use crate::remote::RemoteRepository;
use crate::repository::PluginRepository;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use tracing::{info, warn};

/// The union of an ordered list of [`RemoteRepository`]s.
pub struct AggregateRepository {
    members: RwLock<Vec<Arc<RemoteRepository>>>,
}

impl AggregateRepository {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(Vec::new()),
        }
    }

    pub fn add_repository(&self, repository: Arc<RemoteRepository>) {
        info!("Adding plugin repository {}", repository.url());
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(repository);
    }

    /// Remove every member with this URL. Returns whether any was removed.
    pub fn remove_repository(&self, url: &str) -> bool {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let before = members.len();
        members.retain(|repo| repo.url() != url);
        let removed = members.len() != before;
        if removed {
            info!("Removed plugin repository {}", url);
        }
        removed
    }

    /// Snapshot of the current members, in order.
    pub fn repositories(&self) -> Vec<Arc<RemoteRepository>> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Download a plugin from the first member that lists it.
    pub fn download_plugin(&self, plugin: &Plugin) -> RepoResult<()> {
        self.repositories()
            .into_iter()
            .find(|repo| repo.hosts(plugin))
            .ok_or_else(|| RepoError::NotHosted(plugin.to_string()))?
            .download_plugin(plugin)
    }
}

impl Default for AggregateRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRepository for AggregateRepository {
    fn metadata(&self) -> RepoMetadata {
        RepoMetadata::new("aggregate", "All configured plugin repositories.")
    }

    /// The oldest member sync time; `-1` while any member is unsynced.
    fn last_updated(&self) -> i64 {
        let members = self.repositories();
        let times: Vec<i64> = members.iter().map(|repo| repo.last_updated()).collect();
        match times.iter().min() {
            Some(&oldest) if oldest >= 0 => oldest,
            _ => -1,
        }
    }

    fn plugins(&self) -> Vec<Plugin> {
        self.repositories()
            .iter()
            .flat_map(|repo| repo.plugins())
            .collect()
    }

    /// Sync every member concurrently and wait for all of them. Returns the
    /// first member error, in member order.
    fn update_list(&self) -> RepoResult<()> {
        let members = self.repositories();

        let results: Vec<RepoResult<()>> = thread::scope(|scope| {
            let handles: Vec<_> = members
                .iter()
                .map(|repo| scope.spawn(move || repo.update_list()))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(RepoError::Io(std::io::Error::other(
                            "repository sync panicked",
                        )))
                    })
                })
                .collect()
        });

        let mut first_error = None;
        for (repo, result) in members.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to sync plugin repository {}: {}", repo.url(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
