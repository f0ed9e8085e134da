use thiserror::Error;

/// Errors surfaced at the session boundary.
///
/// The request/response path itself never fails; these only come from
/// obtaining a client or crossing the serialization boundary.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Unable to find client")]
    ClientUnavailable,

    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
