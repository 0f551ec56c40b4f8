//! Error type shared by the session and table layers.

use thiserror::Error;

/// Errors surfaced by backend calls.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never completed (connection, TLS, timeout, decode).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status. The message is
    /// whatever the backend put in its error body, preserved verbatim.
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// A point lookup or update matched no row.
    #[error("no {table} row with id {id}")]
    NotFound { table: &'static str, id: i64 },

    /// A write with `return=representation` came back empty.
    #[error("backend returned no rows for a {table} write")]
    EmptyWrite { table: &'static str },

    /// The operation requires a signed-in session.
    #[error("not signed in")]
    NotSignedIn,

    /// The configured backend URL is not usable.
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
}
