//! Application credentials used to open a session.
//!
//! Secret material is zeroized on drop and never printed by `Debug`.

use std::fmt;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::AuthError;

/// Lifetime of a signed client assertion.
const ASSERTION_LIFETIME_MINUTES: i64 = 10;

/// Tenant, application and secret used for the client-credentials grant.
pub struct ClientCredential {
    pub tenant_id: String,
    pub client_id: String,
    pub secret: CredentialSecret,
}

/// How the application proves its identity.
pub enum CredentialSecret {
    Certificate(CertificateCredential),
    ClientSecret(ClientSecret),
}

/// Certificate identity: thumbprint plus the PEM-encoded RSA private key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CertificateCredential {
    thumbprint: String,
    private_key_pem: String,
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClientSecret(String);

impl ClientCredential {
    /// Build a credential. Each identifier must be non-empty after trimming.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        secret: CredentialSecret,
    ) -> Result<Self, AuthError> {
        let tenant_id = required("tenant id", tenant_id.into())?;
        let client_id = required("application id", client_id.into())?;

        Ok(Self {
            tenant_id,
            client_id,
            secret,
        })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self.secret {
            CredentialSecret::Certificate(_) => "certificate",
            CredentialSecret::ClientSecret(_) => "client secret",
        }
    }
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("secret", &self.kind())
            .finish()
    }
}

impl CertificateCredential {
    pub fn new(
        thumbprint: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let thumbprint = required("certificate thumbprint", thumbprint.into())?;
        let private_key_pem = private_key_pem.into();
        if private_key_pem.trim().is_empty() {
            return Err(AuthError::InvalidCredential(
                "certificate private key is empty".to_string(),
            ));
        }

        Ok(Self {
            thumbprint,
            private_key_pem,
        })
    }

    /// Read the private key from a PEM file.
    pub fn from_pem_file(thumbprint: impl Into<String>, path: &Path) -> Result<Self, AuthError> {
        let pem = std::fs::read_to_string(path).map_err(|e| {
            AuthError::CertificateUnreadable(format!("{}: {}", path.display(), e))
        })?;
        Self::new(thumbprint, pem)
    }

    /// Sign a client assertion JWT for the given token endpoint.
    pub fn client_assertion(&self, client_id: &str, token_url: &str) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(thumbprint_x5t(&self.thumbprint)?);

        let now = Utc::now();
        let claims = AssertionClaims {
            aud: token_url,
            iss: client_id,
            sub: client_id,
            jti: Uuid::new_v4().to_string(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ASSERTION_LIFETIME_MINUTES)).timestamp(),
        };

        let key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .map_err(|e| AuthError::AssertionFailed(format!("invalid RSA key: {}", e)))?;

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| AuthError::AssertionFailed(e.to_string()))
    }
}

impl ClientSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        Ok(Self(required("client secret", secret.into())?))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

/// Claims of a client assertion as expected by the identity platform.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

/// Convert a hex SHA-1 thumbprint (spaces and colons allowed) to the `x5t` header value.
pub fn thumbprint_x5t(thumbprint: &str) -> Result<String, AuthError> {
    let cleaned: String = thumbprint
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    let bytes = hex::decode(&cleaned).map_err(|_| {
        AuthError::InvalidCredential("certificate thumbprint is not a hex string".to_string())
    })?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn required(name: &str, value: String) -> Result<String, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::InvalidCredential(format!("{} is required", name)));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> CredentialSecret {
        CredentialSecret::ClientSecret(ClientSecret::new("s3cret").unwrap())
    }

    #[test]
    fn test_rejects_empty_identifiers() {
        let err = ClientCredential::new("  ", "app", secret()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));

        let err = ClientCredential::new("tenant", "", secret()).unwrap_err();
        assert!(err.to_string().contains("application id"));

        assert!(CertificateCredential::new("", "key").is_err());
        assert!(ClientSecret::new("").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = ClientCredential::new("tenant", "app", secret()).unwrap();
        let debug = format!("{:?}", credential);
        assert!(debug.contains("client secret"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_thumbprint_x5t() {
        // 20-byte SHA-1 thumbprint, formatted the way certificate stores print it
        let x5t = thumbprint_x5t("01:23:45:67:89:AB:CD:EF:01:23 45 67 89 ab cd ef 01 23 45 67")
            .unwrap();
        assert_eq!(x5t, "ASNFZ4mrze8BI0VniavN7wEjRWc");
    }

    #[test]
    fn test_thumbprint_not_hex() {
        let err = thumbprint_x5t("not-a-thumbprint").unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[test]
    fn test_assertion_with_bad_key() {
        let cert = CertificateCredential::new("0123456789abcdef", "-----BEGIN NOTHING-----").unwrap();
        let err = cert
            .client_assertion("app", "https://login.example/tenant/oauth2/v2.0/token")
            .unwrap_err();
        assert!(matches!(err, AuthError::AssertionFailed(_)));
    }

    #[test]
    fn test_assertion_header_and_claims() {
        let token_url = "https://login.example/tenant-1/oauth2/v2.0/token";
        let cert = CertificateCredential::new(
            "0123456789ABCDEF0123456789ABCDEF01234567",
            include_str!("testdata/assertion_key.pem"),
        )
        .unwrap();

        let jwt = cert.client_assertion("app-1", token_url).unwrap();

        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.x5t.as_deref(), Some("ASNFZ4mrze8BI0VniavN7wEjRWc"));

        let payload = jwt.split('.').nth(1).unwrap();
        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(claims["aud"], token_url);
        assert_eq!(claims["iss"], "app-1");
        assert_eq!(claims["sub"], "app-1");
        assert_eq!(
            claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
            ASSERTION_LIFETIME_MINUTES * 60
        );
    }

    #[test]
    fn test_missing_pem_file() {
        let result = CertificateCredential::from_pem_file(
            "0123",
            Path::new("/definitely/not/here/key.pem"),
        );
        assert!(matches!(result, Err(AuthError::CertificateUnreadable(_))));
    }
}
