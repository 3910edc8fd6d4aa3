//! Anti-scalping guard and device tokens.
//!
//! The guard runs before the reservation transaction using non-locking reads.
//! It is the fast path only: the partial unique indexes on `guard_email` and
//! `device_id` enforce the same rules inside the transaction.

use chrono::Duration as ChronoDuration;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use slotbook_core::environment::Clock;
use slotbook_core::error::{BookingError, DuplicateReason};
use slotbook_core::store::BookingLookup;
use slotbook_core::types::{AntiScalpingLevel, Appointment, normalize_email};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Audience claim of device tokens.
pub const DEVICE_TOKEN_AUDIENCE: &str = "slotbook-device";

/// Default device token lifetime.
pub const DEFAULT_DEVICE_TOKEN_TTL: Duration = Duration::from_secs(600);

/// Device token failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceTokenError {
    /// Token is past its expiry
    #[error("Device token expired")]
    Expired,

    /// Signature does not match
    #[error("Invalid device token signature")]
    InvalidSignature,

    /// Token is not a valid device token
    #[error("Malformed device token: {0}")]
    Malformed(String),

    /// Token could not be signed
    #[error("Device token signing failed: {0}")]
    Signing(String),
}

impl From<DeviceTokenError> for BookingError {
    fn from(error: DeviceTokenError) -> Self {
        Self::DeviceTokenInvalid(error.to_string())
    }
}

/// Verifies a device token and returns the device id it vouches for.
pub trait DeviceTokenVerifier: Send + Sync {
    /// Verify `token`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceTokenError`] when the token is expired, forged or malformed.
    fn verify(&self, token: &str) -> Result<String, DeviceTokenError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct DeviceClaims {
    sub: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// HS256 device tokens: `sub` is the device id, `aud` is [`DEVICE_TOKEN_AUDIENCE`].
///
/// Expiry is checked against the injected clock rather than the system time.
pub struct JwtDeviceTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl JwtDeviceTokens {
    /// Create a token service signing with `secret`.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
            clock,
        }
    }

    /// Issue a token for `device_id`, valid for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceTokenError::Signing`] if encoding fails.
    pub fn issue(&self, device_id: &str) -> Result<String, DeviceTokenError> {
        if device_id.trim().is_empty() {
            return Err(DeviceTokenError::Malformed("empty device id".to_string()));
        }
        let now = self.clock.now();
        let ttl = ChronoDuration::from_std(self.ttl)
            .map_err(|e| DeviceTokenError::Signing(e.to_string()))?;
        let claims = DeviceClaims {
            sub: device_id.to_string(),
            aud: DEVICE_TOKEN_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| DeviceTokenError::Signing(e.to_string()))
    }
}

impl DeviceTokenVerifier for JwtDeviceTokens {
    fn verify(&self, token: &str) -> Result<String, DeviceTokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[DEVICE_TOKEN_AUDIENCE]);
        validation.set_required_spec_claims(&["sub", "exp", "aud"]);
        validation.validate_exp = false;

        let data = decode::<DeviceClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                JwtErrorKind::InvalidSignature => DeviceTokenError::InvalidSignature,
                JwtErrorKind::ExpiredSignature => DeviceTokenError::Expired,
                _ => DeviceTokenError::Malformed(e.to_string()),
            }
        })?;

        if data.claims.exp <= self.clock.now().timestamp() {
            return Err(DeviceTokenError::Expired);
        }
        if data.claims.sub.trim().is_empty() {
            return Err(DeviceTokenError::Malformed("empty subject".to_string()));
        }
        Ok(data.claims.sub)
    }
}

/// What the guard vouches for; stored on the reservation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardPass {
    /// Verified device id (strict only, empty otherwise)
    pub device_id: String,
    /// Normalised email when the level checks email
    pub guard_email: Option<String>,
}

/// Duplicate-booking prevention by email and device.
pub struct AntiScalpingGuard<L> {
    lookup: L,
    verifier: Option<Arc<dyn DeviceTokenVerifier>>,
}

impl<L: BookingLookup> AntiScalpingGuard<L> {
    /// Create a guard; without a verifier every strict booking fails its token check.
    pub fn new(lookup: L, verifier: Option<Arc<dyn DeviceTokenVerifier>>) -> Self {
        Self { lookup, verifier }
    }

    /// Check a booking attempt against the appointment's level.
    ///
    /// Token problems are reported before any read.
    ///
    /// # Errors
    ///
    /// - [`BookingError::DeviceTokenMissing`] / [`BookingError::DeviceTokenInvalid`] under `strict`
    /// - [`BookingError::DuplicateBooking`] when a holding booking already exists
    pub async fn check(
        &self,
        appointment: &Appointment,
        email: &str,
        device_token: Option<&str>,
    ) -> Result<GuardPass, BookingError> {
        let level = appointment.anti_scalping_level;
        if level == AntiScalpingLevel::None {
            return Ok(GuardPass::default());
        }

        let device_id = if level.requires_device() {
            let token = device_token
                .filter(|t| !t.trim().is_empty())
                .ok_or(BookingError::DeviceTokenMissing)?;
            let verifier = self.verifier.as_ref().ok_or_else(|| {
                BookingError::DeviceTokenInvalid("device tokens are not configured".to_string())
            })?;
            verifier.verify(token)?
        } else {
            String::new()
        };

        let email = normalize_email(email);
        if self
            .lookup
            .has_holding_booking_for_email(appointment.id, &email)
            .await?
        {
            tracing::info!(app_code = %appointment.app_code, "Duplicate booking by email refused");
            return Err(BookingError::DuplicateBooking {
                reason: DuplicateReason::Email,
            });
        }

        if !device_id.is_empty()
            && self
                .lookup
                .has_holding_booking_for_device(appointment.id, &device_id)
                .await?
        {
            tracing::info!(app_code = %appointment.app_code, "Duplicate booking by device refused");
            return Err(BookingError::DuplicateBooking {
                reason: DuplicateReason::Device,
            });
        }

        Ok(GuardPass {
            device_id,
            guard_email: Some(email),
        })
    }
}
