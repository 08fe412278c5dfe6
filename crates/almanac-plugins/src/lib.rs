//! # almanac-plugins
//!
//! Plugin distribution for almanac.
//!
//! A plugin is a versioned bundle of one init script plus resource files,
//! described by an `index.json`. Bundles come from three kinds of
//! repositories:
//!
//! - [`LocalRepository`]: the on-disk cache, `<root>/<name>/<version>/`
//! - [`RemoteRepository`]: one remote listing, downloadable into the cache
//! - [`AggregateRepository`]: several remote listings as one catalog
//!
//! All repository operations are blocking.

pub mod aggregate;
pub mod error;
pub mod fetch;
pub mod local;
pub mod plugin;
pub mod remote;
pub mod repository;

pub use aggregate::AggregateRepository;
pub use error::{RepoError, RepoResult};
pub use fetch::{Fetcher, HttpFetcher};
pub use local::{LocalRepository, DEFAULT_ROOT};
pub use plugin::{Plugin, PluginMetadata, RepoListing, RepoMetadata, INDEX_FILE};
pub use remote::{normalize_url, RemoteRepository};
pub use repository::PluginRepository;
