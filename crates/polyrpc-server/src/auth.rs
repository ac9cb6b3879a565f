//! The authorization capability seam.
//!
//! The engine only ever asks an [`Authorizer`] to admit or deny a call;
//! credential stores and session backends live behind this trait, outside
//! the engine.

use async_trait::async_trait;

/// Decides whether a token may invoke a method. Consulted only for entries
/// registered with `requires_auth`, before the method runs.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, token: Option<&str>, method: &str) -> bool;
}

/// Default capability: every call is admitted.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _token: Option<&str>, _method: &str) -> bool {
        true
    }
}
