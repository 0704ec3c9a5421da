//! The queueing service as seen by the admission engine.

use crate::protocol::models::{RoomConfig, TokenResponse};
use crate::CrowdgateError;
use std::sync::Arc;

/// Token placeholder the service understands as "issue me a new one".
pub const TOKEN_NOT_SUPPLIED: &str = "notsupplied";

/// Operations the engine needs from the queueing service.
///
/// [`ApiClient`](crate::client::http::ApiClient) is the HTTP
/// implementation; anything else (a test double, a proxy) can stand in.
pub trait QueueApi: Send + Sync {
    /// Request a token for a visitor, or re-check an existing one.
    ///
    /// `token` of `None` (or [`TOKEN_NOT_SUPPLIED`]) asks for a new token.
    fn get_token(
        &self,
        url: &str,
        user_agent: &str,
        language: &str,
        ip: &str,
        token: Option<&str>,
    ) -> Result<TokenResponse, CrowdgateError>;

    /// Current room configuration. Rooms are immutable once fetched, so
    /// the list is shared rather than copied per call.
    fn room_config(&self) -> Result<Arc<Vec<RoomConfig>>, CrowdgateError>;
}

/// Normalize the caller's token: empty and the placeholder both mean none.
pub fn supplied_token(token: Option<&str>) -> Option<&str> {
    token.filter(|t| !t.is_empty() && *t != TOKEN_NOT_SUPPLIED)
}
