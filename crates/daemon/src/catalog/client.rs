use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{redirect::Policy, Client, Response};
use url::Url;

use super::{Catalog, CatalogEntry, CatalogError, Credentials};

/// HTTP client for the remote gallery.
///
/// Redirects are never followed: the login endpoint answers a successful
/// form post with a redirect, and following it would only fetch an HTML
/// page. The cookie store keeps the session cookie for later downloads.
#[derive(Debug, Clone)]
pub struct RemoteCatalog {
    remote: Url,
    client: Client,
}

impl RemoteCatalog {
    pub fn new(remote: &Url) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    /// Build an endpoint URL below the base, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CatalogError> {
        let mut url = self.remote.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::CannotBeABase(self.remote.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn ensure_success(response: Response) -> Result<Response, CatalogError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(CatalogError::Status {
                status,
                url: response.url().clone(),
            })
        }
    }
}

#[async_trait]
impl Catalog for RemoteCatalog {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), CatalogError> {
        let url = self.endpoint(&["login"])?;
        let response = self
            .client
            .post(url)
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_redirection() || status.is_success() {
            tracing::info!(username = %credentials.username, %status, "logged in to remote catalog");
            Ok(())
        } else {
            Err(CatalogError::LoginRejected(status))
        }
    }

    async fn list_entries(&self) -> Result<Vec<String>, CatalogError> {
        let url = self.endpoint(&["search"])?;
        let response = self
            .client
            .get(url)
            .query(&[("query", "*")])
            .send()
            .await?;
        let entries: Vec<CatalogEntry> = Self::ensure_success(response)?.json().await?;

        Ok(entries.into_iter().map(|entry| entry.filename).collect())
    }

    async fn fetch(&self, filename: &str) -> Result<Bytes, CatalogError> {
        let url = self.endpoint(&["uploads", filename])?;
        let response = self.client.get(url).send().await?;
        Ok(Self::ensure_success(response)?.bytes().await?)
    }
}
