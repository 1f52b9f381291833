//! Caller token utilities shared across fan meeting services.
//!
//! Callers authenticate with an HS256 JWT whose `sub` is the participant id
//! and whose `auth` claim carries the role key (`ROLE_FAN`, `ROLE_IDOL`,
//! `ROLE_ADMIN`). Signature verification lives in the service; this module
//! holds the claim shape and the checks that run around it:
//!
//! - Size limit checked BEFORE any parsing
//! - `iat` clock skew validation after verification
//! - `sub` redacted in Debug output
//!
//! ```rust,ignore
//! use common::jwt::{check_token_size, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! check_token_size(token)?;
//! let claims: UserClaims = verify_signature(token)?;
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Caller tokens are a few hundred bytes. Anything above this is rejected
/// before base64 decoding or HMAC verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while checking a caller token.
///
/// Messages are intentionally identical so a client cannot tell which check
/// failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a three-segment JWT.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Claims carried by a caller (fan, idol, admin) token.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Subject (participant id) - redacted in Debug output.
    pub sub: String,

    /// Role key, e.g. `ROLE_FAN`.
    pub auth: String,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,
}

impl fmt::Debug for UserClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClaims")
            .field("sub", &"[REDACTED]")
            .field("auth", &self.auth)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Reject oversized or structurally invalid tokens before verification.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` if the token does not have exactly three non-empty segments
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let segments = token.split('.').collect::<Vec<_>>();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        tracing::debug!(
            target: "common.jwt",
            segments = segments.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(())
}

/// Validate the `iat` claim against the current time.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat` is more than `clock_skew` ahead of now.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    validate_iat_at(iat, clock_skew, chrono::Utc::now().timestamp())
}

/// Deterministic variant of [`validate_iat`] for boundary tests.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // clock_skew is bounded by MAX_CLOCK_SKEW
    #[allow(clippy::cast_possible_wrap)]
    let max_iat = now + clock_skew.as_secs() as i64;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}
