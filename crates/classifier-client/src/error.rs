use damage_analytics::AnalyticsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Classifier not configured")]
    NotConfigured,

    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    #[error("Other error: {0}")]
    Other(String),
}

pub type ClassifierResult<T> = Result<T, ClassifierError>;
