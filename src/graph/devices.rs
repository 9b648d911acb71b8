//! Intune managed device actions.

use serde::Serialize;
use tracing::info;
use url::Url;

use super::client::GraphClient;
use crate::auth::Session;
use crate::error::AppError;

/// Application permission required to lift device isolation.
pub const UNISOLATE_PERMISSION: &str = "DeviceManagementManagedDevices.PrivilegedOperations.All";

/// Opaque managed device identifier. Only presence is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(value: impl Into<String>) -> Result<Self, AppError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidArgument("device id is required".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize)]
struct UnisolateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

impl GraphClient {
    /// `{base}/v1.0/deviceManagement/managedDevices/{id}/unisolate`
    pub fn unisolate_url(&self, device: &DeviceId) -> Url {
        self.endpoint(&[
            "deviceManagement",
            "managedDevices",
            device.as_str(),
            "unisolate",
        ])
    }

    /// Lift network isolation. Returns the HTTP status on success.
    pub async fn unisolate_device(
        &self,
        session: &Session,
        device: &DeviceId,
        comment: Option<&str>,
    ) -> Result<u16, AppError> {
        let url = self.unisolate_url(device);
        info!(device = %device, "Requesting unisolation");

        let response = self
            .post_json(session, &url, &UnisolateBody { comment })
            .await?;

        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_requires_value() {
        assert!(DeviceId::new("   ").is_err());
        assert_eq!(DeviceId::new(" abc-123 ").unwrap().as_str(), "abc-123");
    }

    #[test]
    fn test_unisolate_body() {
        let body = serde_json::to_string(&UnisolateBody { comment: None }).unwrap();
        assert_eq!(body, "{}");

        let body = serde_json::to_string(&UnisolateBody {
            comment: Some("incident closed"),
        })
        .unwrap();
        assert_eq!(body, r#"{"comment":"incident closed"}"#);
    }
}
