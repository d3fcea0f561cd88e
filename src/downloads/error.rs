use std::error::Error as _;

use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to establish a connection. Please check your internet connection.")]
    Connection(#[source] reqwest::Error),

    #[error("The request timed out. Please try again later.")]
    Timeout,

    #[error("The connection was interrupted while downloading: {0}")]
    Transfer(String),

    #[error("Downloaded data size does not match expected size")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Failed to write the downloaded file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl DownloadError {
    /// Failure while opening the request
    pub fn from_request(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            DownloadError::Timeout
        } else {
            DownloadError::Connection(error)
        }
    }

    /// Failure while reading the body
    pub fn from_stream(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            DownloadError::Timeout
        } else if error.is_connect() {
            DownloadError::Connection(error)
        } else {
            DownloadError::Transfer(describe(&error))
        }
    }

    /// Network-level failures are reported to the caller as a normal
    /// failure payload; the rest are server faults.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            DownloadError::Connection(_)
                | DownloadError::Timeout
                | DownloadError::Transfer(_)
                | DownloadError::SizeMismatch { .. }
        )
    }
}

// reqwest's own message is terse; append the source chain.
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
