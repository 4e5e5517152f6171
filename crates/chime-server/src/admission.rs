//! Connection admission: authenticate the token, authorize the channel.
//!
//! Runs before the upgrade. A rejected request never becomes a connection,
//! and the hub trusts whatever identity admission returns.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chime_core::{ChannelId, UserId};
use chime_settings::AuthSettings;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value;
use tracing::debug;

use crate::errors::AdmissionError;

/// Decides whether a request may subscribe to a channel, and as whom.
#[async_trait]
pub trait Admission: Send + Sync {
    /// Resolve the caller's identity and check access to `channel_id`.
    async fn admit(
        &self,
        token: Option<&str>,
        channel_id: &ChannelId,
    ) -> Result<UserId, AdmissionError>;
}

/// Channel-level authorization, typically a membership lookup.
#[async_trait]
pub trait ChannelAccess: Send + Sync {
    /// Whether `user_id` may read `channel_id`.
    async fn can_access(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
    ) -> Result<bool, AdmissionError>;
}

/// Lets every authenticated user into every channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenChannelAccess;

#[async_trait]
impl ChannelAccess for OpenChannelAccess {
    async fn can_access(&self, _: &UserId, _: &ChannelId) -> Result<bool, AdmissionError> {
        Ok(true)
    }
}

/// HS256 bearer tokens carrying the user ID in a configurable claim.
///
/// `exp` is required. An empty secret rejects every token.
pub struct JwtAdmission {
    key: Option<DecodingKey>,
    validation: Validation,
    user_claim: String,
    access: Arc<dyn ChannelAccess>,
}

impl JwtAdmission {
    /// Build from a shared secret and the name of the user-ID claim.
    pub fn new(secret: &str, user_claim: impl Into<String>, access: Arc<dyn ChannelAccess>) -> Self {
        let key = (!secret.is_empty()).then(|| DecodingKey::from_secret(secret.as_bytes()));
        Self {
            key,
            validation: Validation::new(Algorithm::HS256),
            user_claim: user_claim.into(),
            access,
        }
    }

    /// Build from the `auth` settings section.
    pub fn from_settings(settings: &AuthSettings, access: Arc<dyn ChannelAccess>) -> Self {
        Self::new(&settings.jwt_secret, settings.user_claim.clone(), access)
    }

    fn user_id(&self, token: &str) -> Result<UserId, AdmissionError> {
        let Some(key) = &self.key else {
            return Err(AdmissionError::InvalidToken(
                "no signing secret configured".into(),
            ));
        };
        let data = decode::<HashMap<String, Value>>(token, key, &self.validation)
            .map_err(|e| AdmissionError::InvalidToken(e.to_string()))?;

        let user = match data.claims.get(&self.user_claim) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(AdmissionError::InvalidToken(format!(
                    "missing '{}' claim",
                    self.user_claim
                )));
            }
        };
        Ok(UserId::from(user))
    }
}

#[async_trait]
impl Admission for JwtAdmission {
    async fn admit(
        &self,
        token: Option<&str>,
        channel_id: &ChannelId,
    ) -> Result<UserId, AdmissionError> {
        if channel_id.is_empty() {
            return Err(AdmissionError::MissingChannel);
        }
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AdmissionError::MissingToken)?;
        let user_id = self.user_id(token)?;

        if !self.access.can_access(&user_id, channel_id).await? {
            debug!(user_id = %user_id, channel_id = %channel_id, "channel access denied");
            return Err(AdmissionError::Forbidden);
        }
        Ok(user_id)
    }
}

impl std::fmt::Debug for JwtAdmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAdmission")
            .field("configured", &self.key.is_some())
            .field("user_claim", &self.user_claim)
            .finish_non_exhaustive()
    }
}
