//! Error types shared by the Supabase storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`SupabaseDaoError`] failures.
pub type SupabaseResult<T> = Result<T, SupabaseDaoError>;

/// Failures that can occur while talking to the Supabase REST API.
#[derive(Debug, Error)]
pub enum SupabaseDaoError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build Supabase client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send Supabase request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The API returned an unexpected status code.
    #[error("unexpected Supabase response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// Response payload could not be parsed.
    #[error("failed to decode Supabase response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<SupabaseDaoError> for StorageError {
    fn from(err: SupabaseDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
