use parley_api::types::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity rejected")]
    Rejected,
}

/// Seam for the external credential collaborator. The daemon hands it the
/// handshake line and trusts the returned identity for the connection's
/// whole lifetime; no credential checks happen anywhere else.
#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, IdentityError>;
}

/// Accepts tokens of the form `user:<id>` that an upstream proxy has
/// already validated and rewritten. Anything else is rejected.
pub struct TrustedTokenVerifier;

#[async_trait::async_trait]
impl IdentityVerifier for TrustedTokenVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, IdentityError> {
        let id = token.strip_prefix("user:").ok_or(IdentityError::Rejected)?;
        if id.trim().is_empty() {
            return Err(IdentityError::Rejected);
        }
        Ok(UserId::new(id.trim()))
    }
}
