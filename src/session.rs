use crate::error::Result;
use crate::store::{KeyValueStore, SESSION_TOKEN, USER_HAS_SIGNED_IN};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Token handed back by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds from the moment of the grant
    pub expires_in: u64,
}

/// Issues Google access tokens.
#[async_trait]
pub trait AuthProvider {
    /// Run the user-visible consent flow.
    async fn request_interactive_sign_in(&self) -> Result<Option<TokenGrant>>;

    /// Refresh without user interaction. `Ok(None)` when that is not possible.
    async fn request_silent_token(&self) -> Result<Option<TokenGrant>>;
}

/// Access token as persisted under `gapi_token`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub access_token: String,
    /// Expiry as milliseconds since Unix epoch
    pub expiration_time: i64,
}

impl SessionToken {
    pub fn from_grant(grant: &TokenGrant, now: DateTime<Utc>) -> Self {
        let lifetime_ms = i64::try_from(grant.expires_in)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        Self {
            access_token: grant.access_token.clone(),
            expiration_time: now.timestamp_millis().saturating_add(lifetime_ms),
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() < self.expiration_time
    }
}

pub struct Session;

impl Session {
    /// Persist a fresh grant and remember that this user has signed in before.
    pub fn record(
        store: &impl KeyValueStore,
        grant: &TokenGrant,
        now: DateTime<Utc>,
    ) -> Result<SessionToken> {
        let token = SessionToken::from_grant(grant, now);
        store.set(USER_HAS_SIGNED_IN, "true")?;
        store.set(SESSION_TOKEN, &serde_json::to_string(&token)?)?;
        Ok(token)
    }

    /// The stored token, if there is one and it has not expired.
    pub fn restore(store: &impl KeyValueStore, now: DateTime<Utc>) -> Result<Option<SessionToken>> {
        let Some(raw) = store.get(SESSION_TOKEN)? else {
            return Ok(None);
        };

        let token: SessionToken = match serde_json::from_str(&raw) {
            Ok(token) => token,
            Err(e) => {
                warn!("Ignoring unreadable stored session: {}", e);
                return Ok(None);
            }
        };

        if !token.is_valid(now) {
            debug!("Stored session has expired");
            return Ok(None);
        }

        Ok(Some(token))
    }

    pub fn user_has_signed_in(store: &impl KeyValueStore) -> Result<bool> {
        Ok(store.get(USER_HAS_SIGNED_IN)?.as_deref() == Some("true"))
    }

    pub fn sign_out(store: &impl KeyValueStore) -> Result<()> {
        store.remove(SESSION_TOKEN)?;
        store.remove(USER_HAS_SIGNED_IN)?;
        Ok(())
    }

    /// Resolve a usable token at startup: a still-valid stored one, else a silent refresh for
    /// returning users, else nothing.
    pub async fn resume(
        store: &impl KeyValueStore,
        auth: &(impl AuthProvider + Sync),
        now: DateTime<Utc>,
    ) -> Result<Option<SessionToken>> {
        if let Some(token) = Self::restore(store, now)? {
            debug!("Using stored session");
            return Ok(Some(token));
        }

        if !Self::user_has_signed_in(store)? {
            return Ok(None);
        }

        match auth.request_silent_token().await {
            Ok(Some(grant)) => Ok(Some(Self::record(store, &grant, now)?)),
            Ok(None) => {
                debug!("Silent refresh unavailable");
                Ok(None)
            }
            Err(e) => {
                warn!("Silent refresh failed: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub(crate) struct MockAuth {
        pub silent_grant: Option<TokenGrant>,
        pub interactive_grant: Option<TokenGrant>,
        pub silent_calls: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl AuthProvider for MockAuth {
        async fn request_interactive_sign_in(&self) -> Result<Option<TokenGrant>> {
            Ok(self.interactive_grant.clone())
        }

        async fn request_silent_token(&self) -> Result<Option<TokenGrant>> {
            *self.silent_calls.lock().unwrap() += 1;
            Ok(self.silent_grant.clone())
        }
    }

    pub(crate) fn mock_grant(access_token: &str) -> TokenGrant {
        TokenGrant {
            access_token: access_token.to_string(),
            expires_in: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::{MockAuth, mock_grant};
    use super::*;
    use crate::store::test_helpers::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_token_serializes_in_camel_case() {
        let token = SessionToken {
            access_token: "ya29".to_string(),
            expiration_time: 1_704_103_200_000,
        };
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(
            json,
            r#"{"accessToken":"ya29","expirationTime":1704103200000}"#
        );
    }

    #[test]
    fn test_restore_honours_expiry() {
        let store = MemoryStore::default();
        Session::record(&store, &mock_grant("ya29"), now()).unwrap();

        let restored = Session::restore(&store, now() + Duration::minutes(59)).unwrap();
        assert_eq!(restored.map(|t| t.access_token), Some("ya29".to_string()));

        let expired = Session::restore(&store, now() + Duration::minutes(60)).unwrap();
        assert_eq!(expired, None);
    }

    #[test]
    fn test_sign_out_clears_both_keys() {
        let store = MemoryStore::default();
        Session::record(&store, &mock_grant("ya29"), now()).unwrap();
        assert!(Session::user_has_signed_in(&store).unwrap());

        Session::sign_out(&store).unwrap();
        assert!(!Session::user_has_signed_in(&store).unwrap());
        assert_eq!(Session::restore(&store, now()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_resume_skips_silent_refresh_for_new_users() {
        let store = MemoryStore::default();
        let auth = MockAuth {
            silent_grant: Some(mock_grant("fresh")),
            ..Default::default()
        };

        let token = Session::resume(&store, &auth, now()).await.unwrap();
        assert_eq!(token, None);
        assert_eq!(*auth.silent_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resume_refreshes_expired_session_silently() {
        let store = MemoryStore::default();
        Session::record(&store, &mock_grant("stale"), now() - Duration::hours(2)).unwrap();
        let auth = MockAuth {
            silent_grant: Some(mock_grant("fresh")),
            ..Default::default()
        };

        let token = Session::resume(&store, &auth, now()).await.unwrap();
        assert_eq!(token.map(|t| t.access_token), Some("fresh".to_string()));
        assert_eq!(
            Session::restore(&store, now()).unwrap().map(|t| t.access_token),
            Some("fresh".to_string())
        );
    }
}
