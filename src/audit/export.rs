//! CSV export of audit records.
//!
//! The file is written next to its destination and renamed into place, so a failed
//! write never leaves a partial export at the target path.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::ExportError;
use crate::graph::AuditLogRecord;

/// Column header. Each column maps to one record field, in this order.
pub const CSV_COLUMNS: [&str; 12] = [
    "Id",
    "CreatedDateTime",
    "Operation",
    "Service",
    "AuditLogRecordType",
    "UserId",
    "UserPrincipalName",
    "UserType",
    "ObjectId",
    "ClientIp",
    "OrganizationId",
    "AuditData",
];

/// Write all records to `path`, replacing any existing file. Returns the row count.
pub fn export_to_csv(records: &[AuditLogRecord], path: &Path) -> Result<usize, ExportError> {
    let parent = export_directory(path)?;

    if path.exists() {
        info!(path = %path.display(), "Overwriting existing export");
    }

    let partial = partial_path(&parent, path);
    let result = write_rows(records, &partial).and_then(|rows| {
        std::fs::rename(&partial, path).map_err(|source| ExportError::WriteFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(rows)
    });

    if result.is_err() && partial.exists() {
        if let Err(e) = std::fs::remove_file(&partial) {
            warn!(path = %partial.display(), "Failed to remove partial export: {}", e);
        }
    }

    let rows = result?;
    info!("CSV file exported to: {} ({} rows)", path.display(), rows);
    Ok(rows)
}

/// Directory the export will be written to. Fails if it does not exist.
pub fn export_directory(path: &Path) -> Result<PathBuf, ExportError> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if !parent.is_dir() {
        return Err(ExportError::MissingDirectory(parent.display().to_string()));
    }

    Ok(parent)
}

fn partial_path(parent: &Path, path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export.csv".to_string());
    parent.join(format!(".{}.partial", name))
}

fn write_rows(records: &[AuditLogRecord], path: &Path) -> Result<usize, ExportError> {
    let write_failed = |source: std::io::Error| ExportError::WriteFailed {
        path: path.display().to_string(),
        source,
    };

    let file = File::create(path).map_err(write_failed)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", CSV_COLUMNS.join(",")).map_err(write_failed)?;

    for record in records {
        let line = record_fields(record)
            .iter()
            .map(|field| escape_field(field))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(writer, "{}", line).map_err(write_failed)?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| write_failed(e.into_error()))?;
    file.sync_all().map_err(write_failed)?;

    Ok(records.len())
}

/// Field values in `CSV_COLUMNS` order. Missing values become empty strings.
fn record_fields(record: &AuditLogRecord) -> [String; 12] {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();

    [
        record.id.clone(),
        text(&record.created_date_time),
        text(&record.operation),
        text(&record.service),
        text(&record.audit_log_record_type),
        text(&record.user_id),
        text(&record.user_principal_name),
        text(&record.user_type),
        text(&record.object_id),
        text(&record.client_ip),
        text(&record.organization_id),
        record
            .audit_data
            .as_ref()
            .map(|data| data.to_string())
            .unwrap_or_default(),
    ]
}

/// Quote a field when it contains a delimiter, quote or line break (RFC 4180).
fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, operation: &str) -> AuditLogRecord {
        AuditLogRecord {
            id: id.to_string(),
            created_date_time: Some("2026-09-01T10:00:00Z".into()),
            operation: Some(operation.to_string()),
            service: Some("SharePoint".into()),
            audit_log_record_type: Some("sharePointFileOperation".into()),
            user_id: Some("ana@contoso.com".into()),
            user_principal_name: Some("ana@contoso.com".into()),
            user_type: Some("regular".into()),
            object_id: Some("https://contoso.sharepoint.com/sites/hr/Shared Documents/a.docx".into()),
            client_ip: Some("203.0.113.7".into()),
            organization_id: Some("org-1".into()),
            audit_data: Some(serde_json::json!({"SiteUrl": "https://contoso.sharepoint.com/sites/hr"})),
        }
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_row_count_matches_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DataLifecycleEvents.csv");
        let records = vec![
            record("r1", "FileDeleted"),
            record("r2", "TagApplied"),
            record("r3", "TagRemoved"),
        ];

        let rows = export_to_csv(&records, &path).unwrap();
        assert_eq!(rows, 3);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_COLUMNS.join(","));
        assert!(lines[1].starts_with("r1,2026-09-01T10:00:00Z,FileDeleted,SharePoint,"));
        assert!(lines[1]
            .ends_with(r#",org-1,"{""SiteUrl"":""https://contoso.sharepoint.com/sites/hr""}""#));
        assert!(!dir.path().join(".DataLifecycleEvents.csv.partial").exists());
    }

    #[test]
    fn test_columns_map_to_fields() {
        let fields = record_fields(&record("r9", "FileDeleted"));
        assert_eq!(fields.len(), CSV_COLUMNS.len());

        let column = |name: &str| CSV_COLUMNS.iter().position(|c| *c == name).unwrap();
        assert_eq!(fields[column("Id")], "r9");
        assert_eq!(fields[column("Operation")], "FileDeleted");
        assert_eq!(fields[column("UserId")], "ana@contoso.com");
        assert_eq!(fields[column("ClientIp")], "203.0.113.7");
        assert_eq!(
            fields[column("AuditData")],
            r#"{"SiteUrl":"https://contoso.sharepoint.com/sites/hr"}"#
        );
    }

    #[test]
    fn test_empty_export_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        assert_eq!(export_to_csv(&[], &path).unwrap(), 0);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{}\n", CSV_COLUMNS.join(",")));
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale").unwrap();

        export_to_csv(&[record("r1", "FileDeleted")], &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale"));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_missing_directory_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");

        let err = export_to_csv(&[record("r1", "FileDeleted")], &path).unwrap_err();
        assert!(matches!(err, ExportError::MissingDirectory(_)));
        assert!(!path.exists());
    }
}
