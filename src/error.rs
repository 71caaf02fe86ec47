use thiserror::Error;

pub type Result<T> = std::result::Result<T, InvoiceError>;

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to launch browser: {0}")]
    BrowserLaunch(String),

    #[error("navigation to {url} failed")]
    Navigation {
        url: String,
        #[source]
        source: chromiumoxide::error::CdpError,
    },

    #[error("{target} not found on the page; the portal markup may have changed")]
    ElementNotFound { target: &'static str },

    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout { what: &'static str, ms: u64 },

    #[error(
        "manual verification (2FA/MFA) detected during login; \
         disable it for automated access or use an API key instead"
    )]
    VerificationRequired,

    #[error(transparent)]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
