/// Error types for request building and parameter handling.
///
/// These are caller misuse errors. Untrusted pingback input never produces
/// one of these; see [`crate::pingback::ValidationError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A signature version code other than `1` or `2`.
    #[error("Invalid signature version: {0}")]
    InvalidSignatureVersion(String),

    /// Input that cannot be read as flat key/value pairs.
    #[error("Malformed input parameters: {0}")]
    MalformedParameters(String),

    /// A price that is negative, not a number, or has more than two decimals.
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// URL parsing errors.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A base URL that cannot carry path segments (e.g. `mailto:`).
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// Header values that are not valid HTTP header text.
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
