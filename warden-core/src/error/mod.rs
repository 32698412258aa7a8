pub mod utilities;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Credential verifier error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Failure of the external credential verifier.
///
/// A rejected secret is not an error; the verifier reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential verifier unavailable: {0}")]
    Unavailable(String),

    #[error("Credential verifier timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event bus error: {0}")]
    BusError(String),

    #[error("Event handler error: {0}")]
    HandlerError(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),
}

impl Error {
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_credential_error(&self) -> bool {
        matches!(self, Error::Credential(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Errors that may clear up on retry.
    ///
    /// None of these are ever a security decision: callers deny progress and
    /// let the client try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Storage(StorageError::Database(_))
                | Error::Storage(StorageError::Connection(_))
                | Error::Credential(_)
                | Error::Notifier(NotifierError::Delivery(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let validation_error =
            Error::Validation(ValidationError::InvalidIdentifier("empty".to_string()));
        assert_eq!(
            validation_error.to_string(),
            "Validation error: Invalid identifier: empty"
        );

        let storage_error = Error::Storage(StorageError::NotFound);
        assert_eq!(storage_error.to_string(), "Storage error: Record not found");

        let credential_error = Error::Credential(CredentialError::Timeout);
        assert_eq!(
            credential_error.to_string(),
            "Credential verifier error: Credential verifier timed out"
        );
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::InvalidValue {
            key: "WARDEN_LOCKOUT_THRESHOLD".to_string(),
            value: "five".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value for WARDEN_LOCKOUT_THRESHOLD: five"
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(Error::Storage(StorageError::Database("locked".into())).is_transient());
        assert!(Error::Storage(StorageError::Connection("refused".into())).is_transient());
        assert!(Error::Credential(CredentialError::Unavailable("503".into())).is_transient());
        assert!(Error::Notifier(NotifierError::Delivery("smtp".into())).is_transient());

        assert!(!Error::Storage(StorageError::NotFound).is_transient());
        assert!(!Error::Validation(ValidationError::InvalidCode).is_transient());
        assert!(
            !Error::Notifier(NotifierError::InvalidDestination("nobody".into())).is_transient()
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(Error::Storage(StorageError::NotFound).is_storage_error());
        assert!(Error::Validation(ValidationError::InvalidCode).is_validation_error());
        assert!(Error::Credential(CredentialError::Timeout).is_credential_error());
        assert!(Error::Config(ConfigError::InvalidPolicy("x".into())).is_config_error());
        assert!(!Error::Storage(StorageError::NotFound).is_validation_error());
    }

    #[test]
    fn test_error_from_conversions() {
        let error: Error = ValidationError::InvalidCode.into();
        assert!(matches!(error, Error::Validation(ValidationError::InvalidCode)));

        let error: Error = NotifierError::Delivery("bounce".to_string()).into();
        assert!(matches!(error, Error::Notifier(NotifierError::Delivery(_))));

        let error: Error = EventError::HandlerError("timeout".to_string()).into();
        assert!(matches!(error, Error::Event(EventError::HandlerError(_))));
    }
}
