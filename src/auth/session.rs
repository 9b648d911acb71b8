//! Credential-scoped sessions.
//!
//! A session is opened from a credential, handed explicitly to the operation that needs
//! it, and closed exactly once when the operation finishes, whatever its outcome.

use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::credential::ClientCredential;
use super::oauth::IdentityClient;
use crate::error::{AppError, AuthError};

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECONDS: i64 = 30;

/// Handle to an authenticated connection. Clones share the same underlying state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionState>,
}

struct SessionState {
    id: Uuid,
    scope: String,
    opened_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    access_token: Mutex<Option<Zeroizing<String>>>,
}

impl Session {
    pub fn new(scope: impl Into<String>, access_token: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(SessionState {
                id: Uuid::new_v4(),
                scope: scope.into(),
                opened_at: Utc::now(),
                expires_at,
                access_token: Mutex::new(Some(Zeroizing::new(access_token))),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.inner.expires_at
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.inner.opened_at
    }

    /// Bearer token for a request. Fails once the session is closed or expired.
    pub fn bearer(&self) -> Result<String, AuthError> {
        if Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS) >= self.inner.expires_at {
            return Err(AuthError::Expired);
        }

        let guard = self
            .inner
            .access_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        guard
            .as_ref()
            .map(|token| token.as_str().to_string())
            .ok_or(AuthError::Expired)
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .access_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    /// Discard the token. Returns false if the session was already closed.
    pub fn invalidate(&self) -> bool {
        self.inner
            .access_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("scope", &self.inner.scope)
            .field("expires_at", &self.inner.expires_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens and closes sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Authenticate and open a session for `scope`.
    async fn open(&self, credential: &ClientCredential, scope: &str)
        -> Result<Session, AuthError>;

    /// Release a session. Failures are logged, never returned.
    async fn close(&self, session: &Session);
}

#[async_trait]
impl SessionProvider for IdentityClient {
    async fn open(
        &self,
        credential: &ClientCredential,
        scope: &str,
    ) -> Result<Session, AuthError> {
        let token = self.acquire_token(credential, scope).await?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in as i64);
        Ok(Session::new(scope, token.access_token, expires_at))
    }

    async fn close(&self, session: &Session) {
        // App-only tokens cannot be revoked; dropping the token ends the session locally.
        if !session.invalidate() {
            warn!(session = %session.id(), "Session was already closed");
        }
    }
}

/// Open a session, run `op` with it, and close it on every exit path.
///
/// If opening fails `op` is never run and nothing is closed.
pub async fn with_session<P, F, Fut, T>(
    provider: &P,
    credential: &ClientCredential,
    scope: &str,
    op: F,
) -> Result<T, AppError>
where
    P: SessionProvider + ?Sized,
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let session = provider.open(credential, scope).await?;
    info!(
        session = %session.id(),
        scope = %session.scope(),
        "Session opened, valid for {}",
        time_until_expiry(session.expires_at())
            .map(format_duration)
            .unwrap_or_else(|| "< 1 min".to_string())
    );

    let result = op(session.clone()).await;

    provider.close(&session).await;
    debug!(
        session = %session.id(),
        "Session closed after {}",
        format_duration(Utc::now() - session.opened_at())
    );

    result
}

/// Calculate the remaining time until expiry.
pub fn time_until_expiry(expiry: DateTime<Utc>) -> Option<Duration> {
    let now = Utc::now();

    if expiry > now {
        Some(expiry - now)
    } else {
        None
    }
}

/// Format duration as human-readable string (e.g., "45 min", "1 hour").
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes();

    if total_minutes < 1 {
        "< 1 min".to_string()
    } else if total_minutes < 60 {
        format!("{} min", total_minutes)
    } else {
        let hours = total_minutes / 60;
        let mins = total_minutes % 60;
        if mins == 0 {
            format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
        } else {
            format!("{}h {}m", hours, mins)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake provider that records opens and closes.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FakeSessionProvider {
        pub opens: AtomicUsize,
        pub closes: AtomicUsize,
        reject: bool,
    }

    impl FakeSessionProvider {
        pub fn accepting() -> Self {
            Self {
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                reject: false,
            }
        }

        pub fn rejecting() -> Self {
            Self {
                reject: true,
                ..Self::accepting()
            }
        }

        pub fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionProvider for FakeSessionProvider {
        async fn open(
            &self,
            _credential: &ClientCredential,
            scope: &str,
        ) -> Result<Session, AuthError> {
            if self.reject {
                return Err(AuthError::Rejected {
                    status: 401,
                    error: "invalid_client: certificate expired".to_string(),
                });
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Session::new(
                scope,
                "fake-token".to_string(),
                Utc::now() + Duration::hours(1),
            ))
        }

        async fn close(&self, session: &Session) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            session.invalidate();
        }
    }

    pub fn credential() -> ClientCredential {
        use crate::auth::credential::{ClientSecret, CredentialSecret};

        ClientCredential::new(
            "tenant-1",
            "app-1",
            CredentialSecret::ClientSecret(ClientSecret::new("s3cret").unwrap()),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{credential, FakeSessionProvider};
    use super::*;
    use crate::error::ApiError;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(30)), "< 1 min");
        assert_eq!(format_duration(Duration::minutes(5)), "5 min");
        assert_eq!(format_duration(Duration::hours(1)), "1 hour");
        assert_eq!(format_duration(Duration::hours(2)), "2 hours");
        assert_eq!(format_duration(Duration::minutes(90)), "1h 30m");
    }

    #[test]
    fn test_time_until_expiry() {
        let duration = time_until_expiry(Utc::now() + Duration::hours(1));
        assert!(duration.unwrap().num_minutes() > 55);
        assert!(time_until_expiry(Utc::now() - Duration::hours(1)).is_none());
    }

    #[test]
    fn test_bearer_fails_after_invalidate() {
        let session = Session::new("scope", "tok".into(), Utc::now() + Duration::hours(1));
        let clone = session.clone();

        assert_eq!(clone.bearer().unwrap(), "tok");
        assert!(session.invalidate());
        assert!(clone.is_closed());
        assert!(matches!(clone.bearer(), Err(AuthError::Expired)));
        assert!(!session.invalidate());
    }

    #[test]
    fn test_bearer_fails_when_expired() {
        let session = Session::new("scope", "tok".into(), Utc::now() + Duration::seconds(5));
        assert!(matches!(session.bearer(), Err(AuthError::Expired)));
    }

    #[tokio::test]
    async fn test_with_session_closes_on_success() {
        let provider = FakeSessionProvider::accepting();

        let value = with_session(&provider, &credential(), "scope", |session| async move {
            Ok::<_, AppError>(session.bearer()?)
        })
        .await
        .unwrap();

        assert_eq!(value, "fake-token");
        assert_eq!(provider.opens(), 1);
        assert_eq!(provider.closes(), 1);
    }

    #[tokio::test]
    async fn test_with_session_closes_on_error() {
        let provider = FakeSessionProvider::accepting();

        let result: Result<(), AppError> =
            with_session(&provider, &credential(), "scope", |_session| async move {
                Err::<(), AppError>(ApiError::RateLimited { body: String::new() }.into())
            })
            .await;

        assert!(matches!(result, Err(AppError::Api(ApiError::RateLimited { .. }))));
        assert_eq!(provider.opens(), 1);
        assert_eq!(provider.closes(), 1);
    }

    #[tokio::test]
    async fn test_with_session_skips_op_when_open_fails() {
        let provider = FakeSessionProvider::rejecting();
        let mut ran = false;

        let result = with_session(&provider, &credential(), "scope", |_session| {
            ran = true;
            async move { Ok::<(), AppError>(()) }
        })
        .await;

        assert!(matches!(result, Err(AppError::Auth(AuthError::Rejected { .. }))));
        assert!(!ran);
        assert_eq!(provider.opens(), 0);
        assert_eq!(provider.closes(), 0);
    }
}
