use tripwire_storage::StorageError;

/// Errors that can occur within the notification subsystem.
///
/// Delivery failures are not errors: they end up as `failed` attempts. This
/// type covers configuration problems and the storage calls around a send.
///
/// # Examples
///
/// ```rust
/// use tripwire_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp_host".to_string());
/// assert!(err.to_string().contains("smtp_host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not a registered provider kind.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// Reading or writing channels and attempts failed.
    #[error("Notify: storage error: {0}")]
    Storage(#[from] StorageError),

    /// SMTP transport error when sending email.
    #[error("Notify: SMTP error: {0}")]
    SmtpError(String),

    /// Serializing a provider payload failed.
    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
