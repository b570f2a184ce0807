use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(mirrorkit_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid proxy `{proxy}`: {reason}")]
    #[diagnostic(
        code(mirrorkit_dl::invalid_proxy),
        help("Use a proxy URL such as `http://host:3128` or `socks5://host:1080`")
    )]
    InvalidProxy { proxy: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(mirrorkit_dl::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(mirrorkit_dl::http_error))]
    HttpError { status: u16, url: String },

    #[error(transparent)]
    #[diagnostic(code(mirrorkit_dl::io))]
    Io(#[from] std::io::Error),

    #[error("Giving up on {url} after {attempts} attempts")]
    #[diagnostic(
        code(mirrorkit_dl::exhausted),
        help("Raise `download_retries` or check that the archive is reachable")
    )]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },

    #[error("Download of {url} was cancelled")]
    #[diagnostic(code(mirrorkit_dl::cancelled))]
    Cancelled { url: String },
}

impl DownloadError {
    /// Whether another attempt at the same URL could succeed.
    ///
    /// Transport failures and server errors are retried. Client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Network(_) | DownloadError::Io(_) => true,
            DownloadError::HttpError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<ureq::Error> for DownloadError {
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
