//! Audit export job: search the audit log for lifecycle events and write them to CSV.

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::export::{export_directory, export_to_csv};
use super::models::{AuditExportSummary, AuditJobOptions, AuditWindow};
use crate::auth::{with_session, ClientCredential, Session, SessionProvider};
use crate::error::{ApiError, AppError};
use crate::graph::audit_log::AUDIT_QUERY_PERMISSION;
use crate::graph::{AuditLogRecord, AuditQueryStatus, GraphClient, NewAuditLogQuery};

/// Display name given to queries created by this job.
const QUERY_DISPLAY_NAME: &str = "endpoint-ops data lifecycle export";

/// Records gathered from a finished query.
#[derive(Debug)]
pub struct CollectedRecords {
    pub records: Vec<AuditLogRecord>,
    pub truncated: bool,
    pub pages: usize,
}

/// Run the export end to end. The session is closed whether the search or the write fails.
///
/// A missing export directory is reported before any session is opened.
pub async fn run_audit_export<P>(
    provider: &P,
    graph: &GraphClient,
    credential: &ClientCredential,
    scope: &str,
    options: &AuditJobOptions,
) -> Result<AuditExportSummary, AppError>
where
    P: SessionProvider + ?Sized,
{
    let window = AuditWindow::months_before(Utc::now(), options.window_months)?;
    export_directory(&options.export_path)?;

    info!(
        start = %window.start,
        end = %window.end,
        operations = ?options.operations.iter().map(|o| o.operation()).collect::<Vec<_>>(),
        result_cap = ?options.result_cap,
        permission = AUDIT_QUERY_PERMISSION,
        "Starting audit export"
    );

    with_session(provider, credential, scope, |session| async move {
        let query_id = submit_and_wait(graph, &session, &window, options).await?;
        let collected = collect_records(graph, &session, &query_id, options.result_cap).await?;

        if collected.truncated {
            warn!(
                cap = ?options.result_cap,
                exported = collected.records.len(),
                "Result cap reached: more matching events exist than were exported"
            );
        }

        let rows = export_to_csv(&collected.records, &options.export_path)?;

        Ok::<_, AppError>(AuditExportSummary {
            query_id,
            window,
            export_path: options.export_path.clone(),
            rows,
            truncated: collected.truncated,
        })
    })
    .await
}

/// Create the query and poll until the service finishes it. Returns the query id.
pub async fn submit_and_wait(
    graph: &GraphClient,
    session: &Session,
    window: &AuditWindow,
    options: &AuditJobOptions,
) -> Result<String, AppError> {
    let operations = options
        .operations
        .iter()
        .map(|kind| kind.operation().to_string())
        .collect();
    let body = NewAuditLogQuery::new(QUERY_DISPLAY_NAME, window.start, window.end, operations);

    let mut query = graph.create_audit_query(session, &body).await?;
    info!(query_id = %query.id, "Audit query submitted");

    let started = Instant::now();
    while !query.status.is_finished() {
        if started.elapsed() >= options.max_wait {
            return Err(ApiError::QueryTimedOut {
                query_id: query.id,
                waited_seconds: started.elapsed().as_secs(),
            }
            .into());
        }

        sleep(options.poll_interval).await;
        query = graph.get_audit_query(session, &query.id).await?;
        debug!(query_id = %query.id, status = query.status.as_str(), "Polled audit query");
    }

    match query.status {
        AuditQueryStatus::Succeeded => Ok(query.id),
        status => Err(ApiError::QueryFailed {
            query_id: query.id,
            status: status.as_str().to_string(),
        }
        .into()),
    }
}

/// Page through a finished query's records.
///
/// With `cap = None` every page is fetched. With a cap, collection stops at the cap and
/// `truncated` is set if at least one further record exists.
pub async fn collect_records(
    graph: &GraphClient,
    session: &Session,
    query_id: &str,
    cap: Option<usize>,
) -> Result<CollectedRecords, AppError> {
    let mut page_url = graph.audit_records_url(query_id);
    let mut records = Vec::new();
    let mut truncated = false;
    let mut pages = 0;

    loop {
        let page = graph.get_audit_records_page(session, &page_url).await?;
        pages += 1;

        for record in page.value {
            if cap.is_some_and(|cap| records.len() >= cap) {
                truncated = true;
                break;
            }
            records.push(record);
        }

        if truncated {
            break;
        }

        match page.next_link {
            Some(next) => page_url = next,
            None => break,
        }
    }

    info!(
        records = records.len(),
        pages,
        truncated,
        "Collected audit records"
    );

    Ok(CollectedRecords {
        records,
        truncated,
        pages,
    })
}
