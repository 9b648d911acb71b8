//! Microsoft Purview audit log query API (`/security/auditLog/queries`).
//!
//! Queries run asynchronously on the service: create, poll until finished, then page
//! through the records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::GraphClient;
use crate::auth::Session;
use crate::error::{ApiError, AppError};

/// Application permission required to run audit log queries.
pub const AUDIT_QUERY_PERMISSION: &str = "AuditLogsQuery.Read.All";

/// Processing state of an audit log query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditQueryStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl AuditQueryStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "notStarted",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

/// Query resource as returned by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub status: AuditQueryStatus,
}

/// Body for creating a query.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditLogQuery<'a> {
    #[serde(rename = "@odata.type")]
    pub odata_type: &'static str,
    pub display_name: &'a str,
    pub filter_start_date_time: String,
    pub filter_end_date_time: String,
    pub operation_filters: Vec<String>,
}

impl<'a> NewAuditLogQuery<'a> {
    pub fn new(
        display_name: &'a str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        operations: Vec<String>,
    ) -> Self {
        Self {
            odata_type: "#microsoft.graph.security.auditLogQuery",
            display_name,
            filter_start_date_time: start.to_rfc3339_opts(SecondsFormat::Secs, true),
            filter_end_date_time: end.to_rfc3339_opts(SecondsFormat::Secs, true),
            operation_filters: operations,
        }
    }
}

/// One audit event as returned by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRecord {
    pub id: String,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub audit_log_record_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub audit_data: Option<serde_json::Value>,
}

/// One page of records.
#[derive(Debug, Deserialize)]
pub struct AuditRecordPage {
    #[serde(default)]
    pub value: Vec<AuditLogRecord>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

impl GraphClient {
    /// Submit a new audit log query.
    pub async fn create_audit_query(
        &self,
        session: &Session,
        query: &NewAuditLogQuery<'_>,
    ) -> Result<AuditLogQuery, AppError> {
        let url = self.endpoint(&["security", "auditLog", "queries"]);
        let response = self.post_json(session, &url, query).await?;

        let created: AuditLogQuery = response
            .json()
            .await
            .map_err(|e| ApiError::ParseFailed(e.to_string()))?;

        debug!(
            query_id = %created.id,
            name = created.display_name.as_deref().unwrap_or_default(),
            status = created.status.as_str(),
            "Audit query created"
        );
        Ok(created)
    }

    /// Fetch the current state of a query.
    pub async fn get_audit_query(
        &self,
        session: &Session,
        query_id: &str,
    ) -> Result<AuditLogQuery, AppError> {
        let url = self.endpoint(&["security", "auditLog", "queries", query_id]);
        self.get_json(session, url.as_str()).await
    }

    /// URL of the first records page for a query.
    pub fn audit_records_url(&self, query_id: &str) -> String {
        self.endpoint(&["security", "auditLog", "queries", query_id, "records"])
            .to_string()
    }

    /// Fetch one page of records from a first-page URL or a `nextLink`.
    ///
    /// Links pointing outside the Graph origin are refused so the token never leaves it.
    pub async fn get_audit_records_page(
        &self,
        session: &Session,
        page_url: &str,
    ) -> Result<AuditRecordPage, AppError> {
        let url = self.same_origin_url(page_url)?;
        self.get_json(session, url.as_str()).await
    }
}
