use thiserror::Error;

/// Error kinds surfaced by the protocol layer.
///
/// Configuration errors are reported locally only (there is no approved
/// Config to bind an error artifact to); every other kind is collected by
/// the driver and posted to the board as this trustee's error file.
#[derive(Debug, Error)]
pub enum TrusteeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("config validation failure: {0}")]
    Validation(String),

    #[error("statement mismatch: {0}")]
    StatementMismatch(String),

    #[error("signature failure: {0}")]
    SignatureFailure(String),

    #[error("proof failure: {0}")]
    ProofFailure(String),

    #[error("mix chain failure: {0}")]
    ChainFailure(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("artifact not found: {0}")]
    Missing(String),

    #[error("malformed artifact: {0}")]
    Malformed(String),

    #[error("symmetric decryption failure: {0}")]
    Symmetric(String),

    #[error("unexpected: {0}")]
    Unexpected(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("rsa signature error: {0}")]
    RsaSignature(#[from] rsa::signature::Error),
}

impl TrusteeError {
    /// Configuration errors have nothing on the board to bind to and
    /// must not be published.
    pub fn postable(&self) -> bool {
        !matches!(self, TrusteeError::Configuration(_))
    }
}
