use thiserror::Error;

/// Domain failures surfaced to callers; infrastructure errors travel as `anyhow`.
#[derive(Debug, Error)]
pub enum EtfError {
    #[error("{0}")]
    NotFound(String),
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("{0}")]
    Limit(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("Troppi tentativi. Riprova tra {retry_after_secs} secondi.")]
    RateLimited { retry_after_secs: u64 },
    #[error("{0}")]
    InvalidBackup(String),
    #[error("errore di archiviazione: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("provider {provider}: {message}")]
    Upstream { provider: String, message: String },
}

impl EtfError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EtfError::Validation(vec![msg.into()])
    }

    /// Messages suitable for showing to the user one per line.
    pub fn messages(&self) -> Vec<String> {
        match self {
            EtfError::Validation(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<rusqlite::Error> for EtfError {
    fn from(err: rusqlite::Error) -> Self {
        EtfError::Storage(err.into())
    }
}

impl From<serde_json::Error> for EtfError {
    fn from(err: serde_json::Error) -> Self {
        EtfError::Storage(err.into())
    }
}

impl From<std::io::Error> for EtfError {
    fn from(err: std::io::Error) -> Self {
        EtfError::Storage(err.into())
    }
}

pub type EtfResult<T> = std::result::Result<T, EtfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_joins_messages() {
        let err = EtfError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "a; b");
        assert_eq!(err.messages().len(), 2);
    }

    #[test]
    fn rate_limited_message_is_localised() {
        let err = EtfError::RateLimited { retry_after_secs: 42 };
        assert_eq!(err.to_string(), "Troppi tentativi. Riprova tra 42 secondi.");
    }
}
