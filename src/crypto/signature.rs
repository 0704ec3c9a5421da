//! Hash-chain signature verification.
//!
//! A signature binds a token to a room and a generation time:
//!
//! ```text
//! sha256_hex( sha256_hex(private_key) + slug + iso8601z(queue_activates_on)
//!             + token + iso8601z(generated_at) )
//! ```
//!
//! The cookie's touched time is bound the same way:
//! `sha256_hex( sha256_hex(private_key) + touched_unix_seconds )`.

use crate::clock::{from_unix_seconds, iso8601z, Clock};
use crate::cookie::format::CookieToken;
use crate::crypto::digest::{hashed_private_key, sha256_hex};
use crate::crypto::freshness::within_timeout;
use crate::protocol::models::RoomConfig;
use chrono::{DateTime, Utc};

/// Outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// Recognized and inside the room timeout.
    Success,
    /// Never recognized.
    Failed,
    /// Recognized but stale, or the touched hash did not verify.
    FailedExpired,
}

impl SignatureOutcome {
    /// Whether the visitor may pass without a fresh token.
    pub fn is_success(self) -> bool {
        self == SignatureOutcome::Success
    }

    /// Whether the identity was recognized but had expired.
    pub fn is_expired(self) -> bool {
        self == SignatureOutcome::FailedExpired
    }
}

/// What the visitor presented.
#[derive(Debug, Clone, Copy)]
pub enum SignatureProof<'a> {
    /// `ch-id-signature` and `ch-requested` from the URL.
    Explicit {
        /// Presented signature.
        signature: &'a str,
        /// Generation time it claims.
        requested_at: DateTime<Utc>,
    },
    /// The signature history of the cookie's active token.
    Candidates {
        /// Active cookie token.
        token: &'a CookieToken,
    },
}

/// Compute a room signature from an already hashed private key.
pub fn room_signature(
    hashed_private_key: &str,
    room: &RoomConfig,
    token: &str,
    generated_at: &DateTime<Utc>,
) -> String {
    sha256_hex(&format!(
        "{}{}{}{}{}",
        hashed_private_key,
        room.slug,
        iso8601z(&room.queue_activates_on),
        token,
        iso8601z(generated_at)
    ))
}

/// Compute the keyed hash of a touched timestamp.
pub fn touched_signature(hashed_private_key: &str, touched: u64) -> String {
    sha256_hex(&format!("{}{}", hashed_private_key, touched))
}

/// Verifies visitor signatures for one private key.
#[derive(Clone)]
pub struct SignatureVerifier {
    hashed_private_key: String,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Create a verifier; the private key is hashed once here.
    pub fn new(private_key: &str) -> Self {
        Self {
            hashed_private_key: hashed_private_key(private_key),
        }
    }

    /// The hashed private key prefixing every signature input.
    pub fn hashed_private_key(&self) -> &str {
        &self.hashed_private_key
    }

    /// Sign `token` for `room` at `generated_at`.
    pub fn sign(&self, room: &RoomConfig, token: &str, generated_at: &DateTime<Utc>) -> String {
        room_signature(&self.hashed_private_key, room, token, generated_at)
    }

    /// Check a proof for `token` against `room`.
    pub fn verify<C: Clock + ?Sized>(
        &self,
        proof: SignatureProof<'_>,
        token: &str,
        room: &RoomConfig,
        clock: &C,
    ) -> SignatureOutcome {
        match proof {
            SignatureProof::Explicit {
                signature,
                requested_at,
            } => self.verify_explicit(signature, &requested_at, token, room, clock),
            SignatureProof::Candidates { token: cookie } => {
                self.verify_candidates(cookie, token, room, clock)
            }
        }
    }

    fn verify_explicit<C: Clock + ?Sized>(
        &self,
        signature: &str,
        requested_at: &DateTime<Utc>,
        token: &str,
        room: &RoomConfig,
        clock: &C,
    ) -> SignatureOutcome {
        if self.sign(room, token, requested_at) != signature {
            return SignatureOutcome::Failed;
        }

        if within_timeout(requested_at, room.timeout, clock) {
            SignatureOutcome::Success
        } else {
            SignatureOutcome::FailedExpired
        }
    }

    fn verify_candidates<C: Clock + ?Sized>(
        &self,
        cookie: &CookieToken,
        token: &str,
        room: &RoomConfig,
        clock: &C,
    ) -> SignatureOutcome {
        let recognized = cookie
            .signatures
            .iter()
            .rev()
            .map(|candidate| self.sign(room, token, &candidate.gen))
            .any(|hash| cookie.has_signature(&hash));

        if !recognized {
            return SignatureOutcome::Failed;
        }

        let touched_ok =
            touched_signature(&self.hashed_private_key, cookie.touched) == cookie.touched_sig;
        let touched_at = from_unix_seconds(cookie.touched);

        if touched_ok && within_timeout(&touched_at, room.timeout, clock) {
            SignatureOutcome::Success
        } else {
            SignatureOutcome::FailedExpired
        }
    }
}
