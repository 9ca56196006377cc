use reqwest::StatusCode;
use url::Url;

/// Errors raised while talking to the remote catalog.
///
/// Whether one of these is fatal depends on the call site: during startup a
/// failed login or listing aborts the session, while a failed download only
/// fails the OPEN that asked for it.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: StatusCode, url: Url },
    #[error("login rejected with status {0}")]
    LoginRejected(StatusCode),
    #[error("server URL cannot be used as a base: {0}")]
    CannotBeABase(Url),
}

impl CatalogError {
    /// Status code reported by the remote, if the failure got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CatalogError::Status { status, .. } => Some(*status),
            CatalogError::LoginRejected(status) => Some(*status),
            CatalogError::Http(e) => e.status(),
            _ => None,
        }
    }
}
