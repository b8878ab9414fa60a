use thiserror::Error;

/// Failure classes surfaced by the coordination layer.
///
/// A stale result is not represented here: an operation whose context
/// changed mid-flight discards its result silently, which is expected
/// behavior rather than a failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Preconditions unmet: the operation never started.
    #[error("not ready: {0}")]
    NotReady(String),

    /// The external signer declined or aborted the signature request.
    #[error("signature request rejected: {0}")]
    SigningRejected(String),

    /// The cryptographic collaborator could not produce a keypair.
    #[error("keypair generation failed: {0}")]
    KeyGenerationFailed(String),

    /// A chain read/write or decrypt call failed. Never retried
    /// automatically; re-triggering the operation is the retry mechanism.
    #[error("external call failed: {0}")]
    ExternalCallFailed(String),

    /// Persisting a credential failed. Warning-level: the in-memory
    /// credential is still usable for the current call.
    #[error("credential persistence failed: {0}")]
    StoragePersistFailure(String),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
