use http::StatusCode;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::TaskId;

/// Possible errors when interacting with `stocksync_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The requests-per-second threshold must be a positive integer
    #[error("Invalid request rate `{0}`: rate must be at least 1 request per second")]
    InvalidRate(u32),

    /// A queue or channel was configured with zero capacity
    #[error("Invalid capacity for `{name}`: must be at least 1")]
    InvalidCapacity {
        /// Name of the offending configuration key
        name: &'static str,
    },

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    BuildClient(#[source] reqwest::Error),

    /// A configured or derived URL is not valid
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// No access token was configured for the commerce platform
    #[error("No access token configured for the commerce platform")]
    MissingAccessToken,

    /// Another task with the same identifier is still in flight
    #[error("Task `{0}` is already in flight, duplicate dropped")]
    DuplicateTask(TaskId),

    /// Network error while sending a request
    #[error("Network error while sending request: {0}")]
    NetworkRequest(#[source] reqwest::Error),

    /// The response body could not be read
    #[error("Error reading response body: {0}")]
    ReadResponseBody(#[source] reqwest::Error),

    /// The remote service answered with a non-success status code
    #[error("Request rejected by remote service with status {0}")]
    RejectedStatus(StatusCode),

    /// The remote service answered with an application-level error
    #[error("Remote service error {code}: {message}")]
    Upstream {
        /// Platform error code
        code: i64,
        /// Platform error message
        message: String,
    },

    /// A response body is not valid JSON for the expected shape
    #[error("Cannot parse response: {0}")]
    ParseJson(#[from] serde_json::Error),

    /// A response parsed fine but carried no payload
    #[error("Response contained no payload")]
    MissingPayload,

    /// The spreadsheet could not be opened or read
    #[error("Cannot read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    /// The spreadsheet must contain exactly one sheet
    #[error("Spreadsheet has {0} sheets, expected exactly one inventory sheet")]
    SheetCount(usize),

    /// A result-stream frame could not be decoded
    #[error("Invalid stream frame: {0}")]
    InvalidFrame(String),

    /// Reading or writing a stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `Dispatcher::start` was called more than once
    #[error("Dispatcher was already started")]
    AlreadyStarted,

    /// The results stream was already handed out
    #[error("Results stream was already taken")]
    ResultsTaken,
}

impl ErrorKind {
    /// Returns `true` if the error came from the network layer or from the
    /// remote service refusing a request
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NetworkRequest(_)
                | Self::ReadResponseBody(_)
                | Self::RejectedStatus(_)
                | Self::Upstream { .. }
        )
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidRate(r1), Self::InvalidRate(r2)) => r1 == r2,
            (Self::InvalidCapacity { name: n1 }, Self::InvalidCapacity { name: n2 }) => n1 == n2,
            (Self::InvalidUrl(e1), Self::InvalidUrl(e2)) => e1 == e2,
            (Self::DuplicateTask(i1), Self::DuplicateTask(i2)) => i1 == i2,
            (Self::RejectedStatus(s1), Self::RejectedStatus(s2)) => s1 == s2,
            (
                Self::Upstream {
                    code: c1,
                    message: m1,
                },
                Self::Upstream {
                    code: c2,
                    message: m2,
                },
            ) => c1 == c2 && m1 == m2,
            (Self::SheetCount(n1), Self::SheetCount(n2)) => n1 == n2,
            (Self::InvalidFrame(r1), Self::InvalidFrame(r2)) => r1 == r2,
            (Self::Io(e1), Self::Io(e2)) => e1.kind() == e2.kind(),
            (Self::BuildClient(e1), Self::BuildClient(e2))
            | (Self::NetworkRequest(e1), Self::NetworkRequest(e2))
            | (Self::ReadResponseBody(e1), Self::ReadResponseBody(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::ParseJson(e1), Self::ParseJson(e2)) => e1.to_string() == e2.to_string(),
            (Self::Spreadsheet(e1), Self::Spreadsheet(e2)) => e1.to_string() == e2.to_string(),
            (Self::MissingAccessToken, Self::MissingAccessToken)
            | (Self::MissingPayload, Self::MissingPayload)
            | (Self::AlreadyStarted, Self::AlreadyStarted)
            | (Self::ResultsTaken, Self::ResultsTaken) => true,
            _ => false,
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
