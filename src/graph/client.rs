//! Microsoft Graph API client.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use crate::auth::Session;
use crate::config::{Config, HttpConfig};
use crate::error::{ApiError, AppError};

/// Graph API version used for every call.
pub const GRAPH_API_VERSION: &str = "v1.0";

/// Microsoft Graph API client. Holds no credentials; every call takes a session.
pub struct GraphClient {
    base_url: Url,
    http_client: Client,
}

impl GraphClient {
    /// Create a new Graph client from configuration.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Self::with_base_url(&config.api.graph_base_url, &config.http)
    }

    /// Create a client for an explicit base URL (scheme and host, optionally a path prefix).
    pub fn with_base_url(base_url: &str, http: &HttpConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid Graph base URL '{}': {}", base_url, e)))?;

        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "Graph base URL '{}' cannot be used as a base",
                base_url
            )));
        }

        let http_client = Client::builder()
            .timeout(http.timeout())
            .connect_timeout(http.connect_timeout())
            .build()?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Build `{base}/v1.0/{segments...}`. Segments are percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(GRAPH_API_VERSION).extend(segments);
        }
        url
    }

    /// Parse a server-provided link and accept it only if it points at the configured Graph origin.
    pub fn same_origin_url(&self, link: &str) -> Result<Url, AppError> {
        let url = Url::parse(link)
            .map_err(|e| ApiError::ParseFailed(format!("invalid link '{}': {}", link, e)))?;

        if url.origin() != self.base_url.origin() {
            return Err(ApiError::GraphRequestFailed(format!(
                "refusing to follow link to {} outside {}",
                url.origin().ascii_serialization(),
                self.base_url.origin().ascii_serialization()
            ))
            .into());
        }

        Ok(url)
    }

    /// POST a JSON body and return the successful response.
    pub(crate) async fn post_json<B: Serialize + ?Sized>(
        &self,
        session: &Session,
        url: &Url,
        body: &B,
    ) -> Result<Response, AppError> {
        let token = session.bearer()?;
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(url.clone())
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::GraphRequestFailed(e.to_string()))?;

        ensure_success(response).await
    }

    /// GET a URL and deserialize the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        url: &str,
    ) -> Result<T, AppError> {
        let token = session.bearer()?;
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::GraphRequestFailed(e.to_string()))?;

        let response = ensure_success(response).await?;
        let body = response
            .json::<T>()
            .await
            .map_err(|e| ApiError::ParseFailed(e.to_string()))?;
        Ok(body)
    }
}

/// Pass 2xx responses through; turn anything else into an error carrying status and body.
async fn ensure_success(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    error!("Graph request to {} failed: HTTP {} - {}", url, status, body);
    Err(ApiError::from_status(status.as_u16(), body).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http() -> HttpConfig {
        HttpConfig {
            timeout_seconds: 5,
            connect_timeout_seconds: 5,
        }
    }

    #[test]
    fn test_endpoint_builds_versioned_path() {
        let client = GraphClient::with_base_url("https://graph.microsoft.com", &http()).unwrap();
        let url = client.endpoint(&["security", "auditLog", "queries"]);
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/security/auditLog/queries"
        );
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = GraphClient::with_base_url("http://127.0.0.1:8080/", &http()).unwrap();
        let url = client.endpoint(&["deviceManagement", "managedDevices", "a b/c"]);
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/v1.0/deviceManagement/managedDevices/a%20b%2Fc"
        );
    }

    #[test]
    fn test_same_origin_url() {
        let client = GraphClient::with_base_url("https://graph.microsoft.com", &http()).unwrap();

        assert!(client
            .same_origin_url("https://graph.microsoft.com/v1.0/x?$skiptoken=abc")
            .is_ok());
        assert!(client.same_origin_url("https://attacker.example/v1.0/x").is_err());
        assert!(client.same_origin_url("http://graph.microsoft.com/v1.0/x").is_err());
        assert!(client.same_origin_url("https://graph.microsoft.com:8443/x").is_err());
        assert!(client.same_origin_url("not a url").is_err());
    }

    #[test]
    fn test_rejects_invalid_base() {
        assert!(GraphClient::with_base_url("not a url", &http()).is_err());
        assert!(GraphClient::with_base_url("mailto:ops@example.com", &http()).is_err());
    }
}
