//! Global API health and connectivity gating.

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;

use crate::properties::{self, PropertyKey, SyncedModel};
use crate::settings::SyncSettings;

/// Health of the remote API as seen by this replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiState {
    /// No key configured.
    ApiKeyMissing,
    /// The server answered 401; the user must supply a new key.
    ApiKeyRejected,
    /// The last call failed; cleared by a successful user fetch or a background run.
    Error,
    /// No call has ever succeeded.
    Unknown,
    /// No call has succeeded recently.
    Expired,
    /// The cached user profile is stale.
    RefreshUserData,
    Ok,
}

impl ApiState {
    /// Whether a user-profile fetch may be attempted in this state.
    pub fn can_get_user_data(self) -> bool {
        matches!(
            self,
            ApiState::Unknown | ApiState::Expired | ApiState::RefreshUserData | ApiState::Ok
        )
    }

    pub fn is_ok(self) -> bool {
        self == ApiState::Ok
    }

    /// Pure state derivation from the stored flags and timestamps.
    pub fn derive(
        has_key: bool,
        key_rejected: bool,
        in_error: bool,
        last_api_success: Option<DateTime<Utc>>,
        last_user_sync: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        settings: &SyncSettings,
    ) -> Self {
        if !has_key {
            return ApiState::ApiKeyMissing;
        }
        if key_rejected {
            return ApiState::ApiKeyRejected;
        }
        if in_error {
            return ApiState::Error;
        }
        let Some(last_success) = last_api_success else {
            return ApiState::Unknown;
        };
        if now - last_success > settings.api_success_ttl {
            return ApiState::Expired;
        }
        match last_user_sync {
            Some(synced) if now - synced <= settings.user_data_ttl => ApiState::Ok,
            _ => ApiState::RefreshUserData,
        }
    }

    /// Load the current state from the property store.
    pub async fn load(db: &DatabaseConnection, settings: &SyncSettings) -> Result<Self, DbErr> {
        let has_key = settings.api_key.as_deref().is_some_and(|k| !k.is_empty());
        Ok(Self::derive(
            has_key,
            properties::get_bool(db, PropertyKey::ApiKeyRejected).await?,
            properties::get_bool(db, PropertyKey::ApiInError).await?,
            properties::get_timestamp(db, PropertyKey::LastApiSuccess).await?,
            properties::get_timestamp(db, PropertyKey::Watermark(SyncedModel::User)).await?,
            Utc::now(),
            settings,
        ))
    }
}

impl std::fmt::Display for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ApiState::ApiKeyMissing => "api_key_missing",
            ApiState::ApiKeyRejected => "api_key_rejected",
            ApiState::Error => "error",
            ApiState::Unknown => "unknown",
            ApiState::Expired => "expired",
            ApiState::RefreshUserData => "refresh_user_data",
            ApiState::Ok => "ok",
        };
        f.write_str(label)
    }
}

/// Network reachability as reported by the host platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnlineStatus {
    NoConnection,
    Metered,
    Unmetered,
}

impl OnlineStatus {
    /// Whether API calls are allowed on this connection.
    pub fn allows_api_calls(self, allow_metered: bool) -> bool {
        match self {
            OnlineStatus::NoConnection => false,
            OnlineStatus::Metered => allow_metered,
            OnlineStatus::Unmetered => true,
        }
    }
}

/// Source of connectivity information, supplied by the embedding application.
pub trait Connectivity: Send + Sync {
    fn status(&self) -> OnlineStatus;
}

/// Connectivity probe for hosts that are always online (servers, the CLI).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn status(&self) -> OnlineStatus {
        OnlineStatus::Unmetered
    }
}

impl Connectivity for OnlineStatus {
    fn status(&self) -> OnlineStatus {
        *self
    }
}
