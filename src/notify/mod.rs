pub mod email;

pub use email::EmailClient;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider rejected message: {0}")]
    Rejected(String),
    #[error("No email provider configured")]
    NotConfigured,
}
