//! GateKeeper - the main public API for Crowdgate.
//!
//! One [`GateKeeper`] is built at startup and shared by every in-flight
//! request. Each [`GateKeeper::validate`] call walks the same pipeline:
//!
//! 1. Parse the URL and pull out the `ch-*` control parameters
//! 2. Decode the visitor's cookie
//! 3. Notify the queue service if this is a checkout URL
//! 4. Let excluded paths straight through
//! 5. Find the room guarding this URL (none: allow)
//! 6. Verify the visitor's signature for that room
//! 7. On failure, ask the service for a token; queued visitors are redirected
//! 8. Rebuild the cookie and decide

use crate::client::api::{supplied_token, QueueApi};
use crate::client::http::ApiClient;
use crate::clock::{Clock, SystemClock};
use crate::config::CrowdgateConfig;
use crate::cookie::format::{CookieSignature, CookieState, CookieToken};
use crate::crypto::signature::{SignatureOutcome, SignatureProof, SignatureVerifier};
use crate::policy::exclusion::ExclusionFilter;
use crate::policy::failure::FailurePolicy;
use crate::policy::rooms::{is_checkout_buster, match_room, BustCookie};
use crate::protocol::models::RoomConfig;
use crate::protocol::query::{normalize, path_and_query, target_url};
use crate::CrowdgateError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Headers hosts should set alongside any redirect decision.
pub const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Expires", "Fri, 01 Jan 1970 00:00:00 GMT"),
    ("Pragma", "no-cache"),
];

/// Request attributes the host hands to the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateRequest<'a> {
    /// Full request URL including query string.
    pub url: &'a str,

    /// `User-Agent` header.
    pub user_agent: &'a str,

    /// `Accept-Language` header.
    pub language: &'a str,

    /// Client IP address.
    pub ip: &'a str,

    /// Stored cookie value; empty when the visitor has none.
    pub cookie: &'a str,
}

impl<'a> ValidateRequest<'a> {
    /// Request for `url` with every other attribute empty.
    pub fn new(url: &'a str) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }
}

/// What the host should do with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Let the request through.
    #[default]
    Allow,
    /// Redirect to `redirect_url`.
    Redirect,
}

/// Admission decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidateResult {
    /// Allow or redirect.
    pub action: Action,

    /// Where to redirect, when `action` is [`Action::Redirect`].
    pub redirect_url: Option<String>,

    /// The URL the visitor asked for.
    pub target_url: Option<String>,

    /// Whether `cookie_value` should be written.
    pub set_cookie: bool,

    /// Percent-escaped cookie payload.
    pub cookie_value: Option<String>,

    /// Checkout signal.
    pub bust_cookie: BustCookie,

    /// The visitor's token after this decision.
    pub token: Option<String>,

    /// Waiting room code carried through from the URL.
    pub code: Option<String>,

    /// The visitor was recognized but their session had expired.
    pub expired: bool,
}

impl ValidateResult {
    /// Plain pass-through.
    pub fn allow(bust_cookie: BustCookie) -> Self {
        Self {
            action: Action::Allow,
            bust_cookie,
            ..Self::default()
        }
    }

    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        self.action == Action::Allow
    }

    /// Decoded cookie payload, if one is to be set.
    pub fn cookie_state(&self) -> Result<Option<CookieState>, CrowdgateError> {
        match self.cookie_value.as_deref() {
            Some(value) => CookieState::from_cookie_value(value),
            None => Ok(None),
        }
    }

    /// Cache-busting headers for this decision; empty when allowing.
    pub fn no_cache_headers(&self) -> &'static [(&'static str, &'static str)] {
        match self.action {
            Action::Allow => &[],
            Action::Redirect => &NO_CACHE_HEADERS,
        }
    }
}

/// Build a waiting room URL.
///
/// Format: `{endpoint}/{slug}?url={target}&ch-code={code}&ch-id={token}&ch-public-key={key}`
pub fn waiting_room_url(
    endpoint: &str,
    slug: &str,
    target: &str,
    code: &str,
    token: &str,
    public_key: &str,
) -> String {
    format!(
        "{}/{}?url={}&ch-code={}&ch-id={}&ch-public-key={}",
        endpoint.trim_end_matches('/'),
        slug,
        urlencoding::encode(target),
        urlencoding::encode(code),
        urlencoding::encode(token),
        urlencoding::encode(public_key)
    )
}

fn parse_requested(requested: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(requested)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// The admission decision engine.
///
/// Safe to share across threads; nothing from one call leaks into another
/// except through the returned [`ValidateResult`].
pub struct GateKeeper {
    config: CrowdgateConfig,
    api: Arc<dyn QueueApi>,
    clock: Arc<dyn Clock>,
    verifier: SignatureVerifier,
    exclusions: ExclusionFilter,
}

impl std::fmt::Debug for GateKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateKeeper")
            .field("config", &self.config)
            .field("exclusions", &self.exclusions)
            .finish_non_exhaustive()
    }
}

impl GateKeeper {
    /// Create a gatekeeper backed by the HTTP queue API client.
    ///
    /// # Errors
    /// `ConfigError` if configuration validation fails.
    pub fn new(config: CrowdgateConfig) -> Result<Self, CrowdgateError> {
        config.validate()?;
        let api = Arc::new(ApiClient::new(&config));
        Self::build(config, api, Arc::new(SystemClock))
    }

    /// Create a gatekeeper over any queue API implementation.
    pub fn with_api(
        config: CrowdgateConfig,
        api: Arc<dyn QueueApi>,
    ) -> Result<Self, CrowdgateError> {
        config.validate()?;
        Self::build(config, api, Arc::new(SystemClock))
    }

    /// Create a gatekeeper with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        config: CrowdgateConfig,
        api: Arc<dyn QueueApi>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CrowdgateError> {
        config.validate()?;
        Self::build(config, api, clock)
    }

    fn build(
        config: CrowdgateConfig,
        api: Arc<dyn QueueApi>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CrowdgateError> {
        let exclusions = ExclusionFilter::new(config.exclusions.as_deref())?;
        let verifier = SignatureVerifier::new(&config.private_key);

        Ok(Self {
            config,
            api,
            clock,
            verifier,
            exclusions,
        })
    }

    /// Decide whether `request` may proceed.
    ///
    /// # Errors
    /// - `ProtocolError` - unparseable request URL or unusable API response
    /// - `Timeout` / `Transport` - the queue API could not be reached
    pub fn validate(&self, request: &ValidateRequest<'_>) -> Result<ValidateResult, CrowdgateError> {
        self.run(request, None)
    }

    /// Like [`validate`](Self::validate), but against a known room instead
    /// of matching one from the room configuration.
    pub fn validate_with_room(
        &self,
        request: &ValidateRequest<'_>,
        room: &RoomConfig,
    ) -> Result<ValidateResult, CrowdgateError> {
        self.run(request, Some(room))
    }

    fn run(
        &self,
        request: &ValidateRequest<'_>,
        room_override: Option<&RoomConfig>,
    ) -> Result<ValidateResult, CrowdgateError> {
        let request_start = self.clock.now_utc();

        // 1. Parse
        let url = Url::parse(request.url)
            .map_err(|e| CrowdgateError::ProtocolError(format!("Invalid request URL: {}", e)))?;
        let host = url.host_str().unwrap_or_default();
        let path = path_and_query(&url);
        let target = target_url(&url);
        let normalized = normalize(&url);
        let control = &normalized.control;

        // 2. Cookie
        let cookie = match CookieState::from_cookie_value(request.cookie) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "discarding undecodable cookie");
                None
            }
        };

        let mut token = if !control.id.is_empty() {
            control.id.clone()
        } else {
            cookie
                .as_ref()
                .and_then(CookieState::active_token)
                .map(|t| t.token.clone())
                .unwrap_or_default()
        };

        // 3. Checkout
        let rooms = self.api.room_config()?;
        let bust_cookie = is_checkout_buster(host, &path, &rooms);
        if bust_cookie == BustCookie::Busted {
            self.notify_checkout(request, &target, &token);
        }

        // 4. Exclusions
        if self.exclusions.is_excluded(url.path()) {
            debug!(path = url.path(), "path excluded");
            return Ok(ValidateResult::allow(bust_cookie));
        }

        // 5. Room
        let Some(room) = room_override.or_else(|| match_room(host, &path, &rooms)) else {
            return Ok(ValidateResult::allow(bust_cookie));
        };

        // 6. Signature
        let mut issued: Option<CookieSignature> = None;
        let outcome = if !control.id_signature.is_empty() {
            match parse_requested(&control.requested) {
                Some(requested_at) => {
                    issued = Some(CookieSignature {
                        gen: requested_at,
                        sig: control.id_signature.clone(),
                    });
                    self.verifier.verify(
                        SignatureProof::Explicit {
                            signature: &control.id_signature,
                            requested_at,
                        },
                        &token,
                        room,
                        self.clock.as_ref(),
                    )
                }
                None => {
                    warn!(requested = %control.requested, "unparseable ch-requested");
                    SignatureOutcome::Failed
                }
            }
        } else {
            match cookie
                .as_ref()
                .and_then(CookieState::active_token)
                .filter(|t| !t.signatures.is_empty())
            {
                Some(active) => self.verifier.verify(
                    SignatureProof::Candidates { token: active },
                    &token,
                    room,
                    self.clock.as_ref(),
                ),
                None => SignatureOutcome::Failed,
            }
        };
        debug!(slug = %room.slug, ?outcome, "signature verified");

        // 7. Token refresh
        if !outcome.is_success() {
            let current = (!token.is_empty()).then_some(token.as_str());
            let response = self.api.get_token(
                &target,
                request.user_agent,
                request.language,
                request.ip,
                supplied_token(current),
            )?;

            if !response.promoted {
                let slug = if response.slug.is_empty() {
                    room.slug.as_str()
                } else {
                    response.slug.as_str()
                };
                info!(slug, expired = outcome.is_expired(), "visitor sent to waiting room");

                return Ok(ValidateResult {
                    action: Action::Redirect,
                    redirect_url: Some(waiting_room_url(
                        &self.config.waiting_room_endpoint,
                        slug,
                        &target,
                        &control.code,
                        &response.token,
                        &self.config.public_key,
                    )),
                    target_url: Some(target),
                    token: Some(response.token),
                    code: Some(control.code.clone()),
                    expired: outcome.is_expired(),
                    ..ValidateResult::default()
                });
            }

            let sig = response.hash.filter(|h| !h.is_empty()).ok_or_else(|| {
                CrowdgateError::ProtocolError("Promoted token response missing hash".to_string())
            })?;
            let gen = response.requested.ok_or_else(|| {
                CrowdgateError::ProtocolError(
                    "Promoted token response missing requested".to_string(),
                )
            })?;

            token = response.token;
            issued = Some(CookieSignature { gen, sig });
        }

        // 8. Cookie
        let state = self.rebuild_cookie(cookie, &token, issued, &request_start);
        let cookie_value = state.to_cookie_value()?;

        if normalized.had_control_params {
            return Ok(ValidateResult {
                action: Action::Redirect,
                redirect_url: Some(normalized.cleaned_url),
                target_url: Some(target),
                set_cookie: true,
                cookie_value: Some(cookie_value),
                token: Some(token),
                ..ValidateResult::default()
            });
        }

        Ok(ValidateResult {
            action: Action::Allow,
            set_cookie: true,
            cookie_value: Some(cookie_value),
            bust_cookie,
            token: Some(token),
            ..ValidateResult::default()
        })
    }

    /// Carry the visitor's state forward to `token`.
    ///
    /// A token different from the cookie's current one starts over with a
    /// single entry; the same token keeps its history and gains `issued`.
    fn rebuild_cookie(
        &self,
        prior: Option<CookieState>,
        token: &str,
        issued: Option<CookieSignature>,
        now: &DateTime<Utc>,
    ) -> CookieState {
        let mut state = CookieState::new(&self.config.integration);
        let prior_tokens = prior.map(|c| c.tokens).unwrap_or_default();

        let is_new_token = prior_tokens.last().map_or(true, |t| t.token != token);

        if is_new_token {
            state.tokens = vec![CookieToken::new(token, issued)];
        } else {
            state.tokens = prior_tokens;
            if let (Some(active), Some(signature)) = (state.active_token_mut(), issued) {
                active.add_signature(signature);
            }
        }

        if let Some(active) = state.active_token_mut() {
            active.touch(self.verifier.hashed_private_key(), now);
        }

        state
    }

    /// Tell the queue service this visitor reached checkout. Failures are
    /// logged and otherwise ignored.
    fn notify_checkout(&self, request: &ValidateRequest<'_>, target: &str, token: &str) {
        let current = (!token.is_empty()).then_some(token);
        match self.api.get_token(
            target,
            request.user_agent,
            request.language,
            request.ip,
            supplied_token(current),
        ) {
            Ok(_) => info!(url = target, "checkout bust notified"),
            Err(e) => warn!(url = target, error = %e, "checkout bust notification failed"),
        }
    }

    /// Validate, turning any non-configuration error into a decision via
    /// `policy`.
    ///
    /// # Errors
    /// Only `ConfigError`.
    pub fn validate_or(
        &self,
        request: &ValidateRequest<'_>,
        policy: &FailurePolicy,
    ) -> Result<ValidateResult, CrowdgateError> {
        self.validate(request)
            .or_else(|e| policy.resolve(e, &self.config, request))
    }

    /// Get the current configuration.
    pub fn config(&self) -> &CrowdgateConfig {
        &self.config
    }
}
