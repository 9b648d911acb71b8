//! Session-scoped device unisolation.
//!
//! Opens one session, issues a single POST, and closes the session whatever the outcome.

use tracing::{info, warn};

use crate::auth::{with_session, ClientCredential, SessionProvider};
use crate::error::AppError;
use crate::graph::devices::UNISOLATE_PERMISSION;
use crate::graph::{DeviceId, GraphClient};

/// What to unisolate.
#[derive(Debug, Clone)]
pub struct UnisolateRequest {
    pub device: DeviceId,
    pub comment: Option<String>,
    pub dry_run: bool,
}

/// Result of a successful (or dry) run.
#[derive(Debug, Clone, PartialEq)]
pub struct UnisolateOutcome {
    pub device: DeviceId,
    pub url: String,
    /// HTTP status of the accepted request; `None` for a dry run.
    pub status: Option<u16>,
}

impl UnisolateOutcome {
    pub fn applied(&self) -> bool {
        self.status.is_some()
    }
}

/// Authenticate, lift isolation on one device, and close the session.
pub async fn unisolate<P>(
    provider: &P,
    graph: &GraphClient,
    credential: &ClientCredential,
    scope: &str,
    request: &UnisolateRequest,
) -> Result<UnisolateOutcome, AppError>
where
    P: SessionProvider + ?Sized,
{
    let url = graph.unisolate_url(&request.device).to_string();
    info!(
        device = %request.device,
        permission = UNISOLATE_PERMISSION,
        credential = credential.kind(),
        "Starting unisolate"
    );

    let target = url.as_str();
    let status = with_session(provider, credential, scope, |session| async move {
        if request.dry_run {
            warn!(url = target, "Dry run: no request sent");
            return Ok::<_, AppError>(None);
        }

        let status = graph
            .unisolate_device(&session, &request.device, request.comment.as_deref())
            .await?;
        Ok(Some(status))
    })
    .await?;

    if let Some(status) = status {
        info!(device = %request.device, status, "Unisolate request accepted");
    }

    Ok(UnisolateOutcome {
        device: request.device.clone(),
        url,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::testing::{credential, FakeSessionProvider};
    use crate::config::HttpConfig;
    use crate::error::{ApiError, AuthError};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEVICE_PATH: &str = "/v1.0/deviceManagement/managedDevices/dev-123/unisolate";

    fn graph(server: &MockServer) -> GraphClient {
        GraphClient::with_base_url(
            &server.uri(),
            &HttpConfig {
                timeout_seconds: 5,
                connect_timeout_seconds: 5,
            },
        )
        .unwrap()
    }

    fn request() -> UnisolateRequest {
        UnisolateRequest {
            device: DeviceId::new("dev-123").unwrap(),
            comment: None,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_single_post_to_expected_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .and(header("authorization", "Bearer fake-token"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = FakeSessionProvider::accepting();
        let graph = graph(&server);
        let outcome = unisolate(&provider, &graph, &credential(), "scope", &request())
            .await
            .unwrap();

        assert_eq!(outcome.status, Some(204));
        assert!(outcome.applied());
        assert_eq!(outcome.url, format!("{}{}", server.uri(), DEVICE_PATH));
        assert_eq!(provider.opens(), 1);
        assert_eq!(provider.closes(), 1);
    }

    #[tokio::test]
    async fn test_comment_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .and(body_json(serde_json::json!({"comment": "incident closed"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let provider = FakeSessionProvider::accepting();
        let mut req = request();
        req.comment = Some("incident closed".into());

        let outcome = unisolate(&provider, &graph(&server), &credential(), "scope", &req)
            .await
            .unwrap();
        assert_eq!(outcome.status, Some(202));
    }

    #[tokio::test]
    async fn test_failure_reports_status_and_body_and_closes_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .respond_with(
                ResponseTemplate::new(500).set_body_string(r#"{"error":{"code":"InternalError"}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = FakeSessionProvider::accepting();
        let err = unisolate(&provider, &graph(&server), &credential(), "scope", &request())
            .await
            .unwrap_err();

        match err {
            AppError::Api(ApiError::RequestFailed { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("InternalError"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.opens(), 1);
        assert_eq!(provider.closes(), 1);
    }

    #[tokio::test]
    async fn test_not_found_device() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such device"))
            .mount(&server)
            .await;

        let provider = FakeSessionProvider::accepting();
        let err = unisolate(&provider, &graph(&server), &credential(), "scope", &request())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Api(ApiError::NotFound { .. })));
        assert_eq!(provider.closes(), 1);
    }

    #[tokio::test]
    async fn test_throttled_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("throttled by tenant policy"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = FakeSessionProvider::accepting();
        let err = unisolate(&provider, &graph(&server), &credential(), "scope", &request())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("throttled by tenant policy"));
        match err {
            AppError::Api(api) => {
                assert_eq!(api.status(), Some(429));
                assert!(matches!(
                    api,
                    ApiError::RateLimited { ref body } if body == "throttled by tenant policy"
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.closes(), 1);
    }

    #[tokio::test]
    async fn test_rejected_credential_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let provider = FakeSessionProvider::rejecting();
        let err = unisolate(&provider, &graph(&server), &credential(), "scope", &request())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Auth(AuthError::Rejected { .. })));
        assert_eq!(provider.opens(), 0);
        assert_eq!(provider.closes(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let provider = FakeSessionProvider::accepting();
        let mut req = request();
        req.dry_run = true;

        let outcome = unisolate(&provider, &graph(&server), &credential(), "scope", &req)
            .await
            .unwrap();

        assert!(!outcome.applied());
        assert_eq!(provider.opens(), 1);
        assert_eq!(provider.closes(), 1);
    }
}
