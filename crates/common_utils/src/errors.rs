//! Error types for universal use.

/// A `Result` whose error variant is wrapped in an [`error_stack::Report`],
/// allowing context switching and diagnostic attachments along the way.
pub type CustomResult<T, E> = error_stack::Result<T, E>;

/// Failure while parsing bytes or values into a typed structure.
#[derive(Debug, thiserror::Error)]
#[error("Parsing error")]
pub struct ParsingError;

/// Validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// An incorrect value was provided for the field specified by `field_name`.
    #[error("Incorrect value provided for field: {field_name}")]
    IncorrectValueProvided {
        /// Name of the malformed field.
        field_name: &'static str,
    },
}

/// Cryptographic algorithm errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The cryptographic algorithm was unable to sign the message.
    #[error("Failed to sign message")]
    MessageSigningFailed,
    /// The cryptographic algorithm was unable to verify the given signature.
    #[error("Failed to verify signature")]
    SignatureVerificationFailed,
}
