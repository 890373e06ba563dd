use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Google session expired or was rejected, please sign in again")]
    AuthExpired,

    #[error("OAuth2 authentication error: {0}")]
    Auth(String),

    #[error("Google Sheets API error: {0}")]
    Sheets(String),

    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("No spreadsheet selected, run `expense-tracker select` first")]
    MissingSheetSelection,

    #[error("Sync aborted at pending entry {failed_at} of {pending}, queue left intact: {source}")]
    DrainPartialFailure {
        failed_at: usize,
        pending: usize,
        #[source]
        source: Box<AppError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True when the remote store rejected the session, directly or as the cause of a drain abort.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            AppError::AuthExpired => true,
            AppError::DrainPartialFailure { source, .. } => source.is_auth_expired(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_expired_seen_through_drain_failure() {
        let err = AppError::DrainPartialFailure {
            failed_at: 2,
            pending: 3,
            source: Box::new(AppError::AuthExpired),
        };
        assert!(err.is_auth_expired());
        assert!(!AppError::Sheets("boom".to_string()).is_auth_expired());
    }

    #[test]
    fn test_drain_failure_message() {
        let err = AppError::DrainPartialFailure {
            failed_at: 2,
            pending: 3,
            source: Box::new(AppError::Sheets("quota".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Sync aborted at pending entry 2 of 3, queue left intact: Google Sheets API error: quota"
        );
    }
}
