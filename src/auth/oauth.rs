//! OAuth2 client-credentials flow against the Microsoft identity platform.

use serde::Deserialize;
use tracing::{debug, error};

use super::credential::{ClientCredential, CredentialSecret};
use crate::config::{Config, HttpConfig};
use crate::error::AuthError;

/// OAuth2 client for app-only (daemon) authentication.
pub struct IdentityClient {
    authority_host: String,
    http_client: reqwest::Client,
}

impl IdentityClient {
    /// Create a new identity client from configuration.
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        Self::with_authority(&config.identity.authority_host, &config.http)
    }

    /// Create a client for an explicit authority host.
    pub fn with_authority(authority_host: &str, http: &HttpConfig) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(http.timeout())
            .connect_timeout(http.connect_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::TokenRequestFailed(e.to_string()))?;

        Ok(Self {
            authority_host: authority_host.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Token endpoint for a tenant.
    pub fn token_url(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id)
    }

    /// Request an app-only access token for `scope`.
    pub async fn acquire_token(
        &self,
        credential: &ClientCredential,
        scope: &str,
    ) -> Result<TokenResponse, AuthError> {
        let token_endpoint = self.token_url(&credential.tenant_id);

        let mut params: Vec<(&str, String)> = vec![
            ("client_id", credential.client_id.clone()),
            ("grant_type", "client_credentials".to_string()),
            ("scope", scope.to_string()),
        ];

        match &credential.secret {
            CredentialSecret::Certificate(cert) => {
                let assertion = cert.client_assertion(&credential.client_id, &token_endpoint)?;
                params.push((
                    "client_assertion_type",
                    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
                ));
                params.push(("client_assertion", assertion));
            }
            CredentialSecret::ClientSecret(secret) => {
                params.push(("client_secret", secret.expose().to_string()));
            }
        }

        debug!(
            tenant = %credential.tenant_id,
            client_id = %credential.client_id,
            credential = credential.kind(),
            "Requesting access token"
        );

        let response = self
            .http_client
            .post(&token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let error = describe_token_error(&body);
            error!("Token request failed: HTTP {} - {}", status, error);
            return Err(AuthError::Rejected { status, error });
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenRequestFailed(e.to_string()))?;

        Ok(token_response)
    }
}

/// Token response from the identity platform.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Summarise an error body as `code: first line of description`.
fn describe_token_error(body: &str) -> String {
    match serde_json::from_str::<TokenErrorBody>(body) {
        Ok(parsed) => match parsed.error_description {
            Some(description) => format!(
                "{}: {}",
                parsed.error,
                description.lines().next().unwrap_or_default()
            ),
            None => parsed.error,
        },
        Err(_) if body.is_empty() => "empty response".to_string(),
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::ClientSecret;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> HttpConfig {
        HttpConfig {
            timeout_seconds: 5,
            connect_timeout_seconds: 5,
        }
    }

    fn credential() -> ClientCredential {
        ClientCredential::new(
            "tenant-1",
            "app-1",
            CredentialSecret::ClientSecret(ClientSecret::new("s3cret").unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn test_describe_token_error() {
        let body = r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret provided.\r\nTrace ID: abc"}"#;
        assert_eq!(
            describe_token_error(body),
            "invalid_client: AADSTS7000215: Invalid client secret provided."
        );
        assert_eq!(describe_token_error(""), "empty response");
        assert_eq!(describe_token_error("oops"), "oops");
    }

    #[tokio::test]
    async fn test_acquire_token_with_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "token-abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = IdentityClient::with_authority(&server.uri(), &http()).unwrap();
        let token = client
            .acquire_token(&credential(), "https://graph.microsoft.com/.default")
            .await
            .unwrap();

        assert_eq!(token.access_token, "token-abc");
        assert_eq!(token.expires_in, 3599);
    }

    #[tokio::test]
    async fn test_acquire_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "AADSTS700027: Client assertion contains an invalid signature."
            })))
            .mount(&server)
            .await;

        let client = IdentityClient::with_authority(&server.uri(), &http()).unwrap();
        let err = client
            .acquire_token(&credential(), "https://graph.microsoft.com/.default")
            .await
            .unwrap_err();

        match err {
            AuthError::Rejected { status, error } => {
                assert_eq!(status, 401);
                assert!(error.starts_with("invalid_client"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
