//! Caller identity resolution.
//!
//! Turns a bearer token into a [`Caller`] (participant id + role). The
//! resolved value is passed explicitly to each operation and never stored
//! on shared state.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted
//! - `exp` and `iat` are validated with clock skew tolerance
//! - All token failures share one generic client message

use crate::errors::EntryError;
use crate::models::{Caller, Role};
use common::jwt::{check_token_size, validate_iat, UserClaims};
use common::secret::{ExposeSecret, SecretString};
use common::types::ParticipantId;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const INVALID_TOKEN: &str = "The access token is invalid or expired";

/// Resolves request credentials to a caller.
pub trait IdentityResolver: Send + Sync {
    /// # Errors
    ///
    /// - `Unauthenticated` for any token problem
    /// - `UnauthorizedRole` when the token carries an unknown role
    fn resolve(&self, token: &str) -> Result<Caller, EntryError>;
}

/// HS256 caller-token validator.
pub struct JwtIdentityResolver {
    key: DecodingKey,
    clock_skew: Duration,
}

impl JwtIdentityResolver {
    pub fn new(secret: &SecretString, clock_skew: Duration) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            clock_skew,
        }
    }
}

impl IdentityResolver for JwtIdentityResolver {
    #[instrument(skip_all, name = "fm.auth.resolve")]
    fn resolve(&self, token: &str) -> Result<Caller, EntryError> {
        check_token_size(token).map_err(|e| {
            tracing::debug!(target: "fm.auth.jwt", error = ?e, "Token rejected before parsing");
            EntryError::Unauthenticated(INVALID_TOKEN.to_string())
        })?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.clock_skew.as_secs();
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<UserClaims>(token, &self.key, &validation)
            .map_err(|e| {
                tracing::debug!(target: "fm.auth.jwt", error = %e, "Token verification failed");
                EntryError::Unauthenticated(INVALID_TOKEN.to_string())
            })?
            .claims;

        if let Err(e) = validate_iat(claims.iat, self.clock_skew) {
            tracing::debug!(target: "fm.auth.jwt", error = ?e, "Token iat validation failed");
            return Err(EntryError::Unauthenticated(INVALID_TOKEN.to_string()));
        }

        let participant_id = Uuid::parse_str(&claims.sub).map(ParticipantId).map_err(|_| {
            tracing::debug!(target: "fm.auth.jwt", "Token subject is not a participant id");
            EntryError::Unauthenticated(INVALID_TOKEN.to_string())
        })?;

        let role = Role::from_claim(&claims.auth).ok_or_else(|| {
            tracing::warn!(target: "fm.auth.jwt", role = %claims.auth, "Unknown role claim");
            EntryError::UnauthorizedRole
        })?;

        Ok(Caller {
            participant_id,
            role,
        })
    }
}
