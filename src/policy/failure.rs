//! What to do when a decision cannot be made.
//!
//! The queue API may be slow or down. Hosts pick between letting visitors
//! through ([`FailurePolicy::Trust`]) and parking them in a dedicated
//! safety-net room ([`FailurePolicy::SafetyNet`]). Configuration errors are
//! never covered by either: they mean the integration itself is broken.

use crate::config::CrowdgateConfig;
use crate::gatekeeper::{waiting_room_url, Action, ValidateRequest, ValidateResult};
use crate::policy::rooms::BustCookie;
use crate::CrowdgateError;
use tracing::warn;

/// Fallback behavior for failed validations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Let the visitor through.
    #[default]
    Trust,
    /// Send the visitor to the named waiting room.
    SafetyNet {
        /// Slug of the safety-net room.
        slug: String,
    },
}

impl FailurePolicy {
    /// `SafetyNet` when the config names a safety-net room, `Trust` otherwise.
    pub fn from_config(config: &CrowdgateConfig) -> Self {
        match config.safety_net_slug.as_deref().filter(|s| !s.is_empty()) {
            Some(slug) => FailurePolicy::SafetyNet {
                slug: slug.to_string(),
            },
            None => FailurePolicy::Trust,
        }
    }

    /// Turn a validation error into a decision.
    ///
    /// # Errors
    /// Returns `error` unchanged when it is a `ConfigError`.
    pub fn resolve(
        &self,
        error: CrowdgateError,
        config: &CrowdgateConfig,
        request: &ValidateRequest<'_>,
    ) -> Result<ValidateResult, CrowdgateError> {
        if error.is_config() {
            return Err(error);
        }

        match self {
            FailurePolicy::Trust => {
                warn!(error = %error, "validation failed, trusting visitor");
                Ok(ValidateResult::allow(BustCookie::Absent))
            }
            FailurePolicy::SafetyNet { slug } => {
                warn!(error = %error, slug = %slug, "validation failed, using safety net room");
                Ok(ValidateResult {
                    action: Action::Redirect,
                    redirect_url: Some(waiting_room_url(
                        &config.waiting_room_endpoint,
                        slug,
                        request.url,
                        "",
                        "",
                        &config.public_key,
                    )),
                    target_url: Some(request.url.to_string()),
                    ..ValidateResult::default()
                })
            }
        }
    }
}
