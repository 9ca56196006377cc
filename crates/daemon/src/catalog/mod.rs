//! Remote catalog access
//!
//! The remote gallery is consumed as a black box exposing three calls: an
//! optional form login, a wildcard listing, and a per-file download. The
//! [`Catalog`] trait is the seam the watcher and session depend on, so tests
//! can inject an in-memory catalog instead of a live server.

mod client;
mod error;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

pub use client::RemoteCatalog;
pub use error::CatalogError;

/// Login credentials for the remote gallery.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One row of the listing response. The remote sends more fields; only the
/// filename matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub filename: String,
}

/// Operations the mirror needs from the remote gallery
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Perform the login handshake. Redirects count as success.
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), CatalogError>;

    /// Fetch every filename the remote currently lists.
    async fn list_entries(&self) -> Result<Vec<String>, CatalogError>;

    /// Download the full content of one file.
    async fn fetch(&self, filename: &str) -> Result<Bytes, CatalogError>;
}
