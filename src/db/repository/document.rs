use std::str::FromStr;

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

use super::{format_timestamp, parse_optional_uuid, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::{
    DocumentFilter, ResolutionMethod, StatusChange, ValidatedDocument, ValidationStatus,
};

const DOCUMENT_COLUMNS: &str = "id, contract_id, filename, original_filename, file_hash, status,
     manifest_item_id, batch_id, confidence, matched_document_code, extracted_code,
     error_message, resolution_method, created_at, updated_at";

struct DocumentRow {
    id: String,
    contract_id: String,
    filename: String,
    original_filename: Option<String>,
    file_hash: Option<String>,
    status: String,
    manifest_item_id: Option<String>,
    batch_id: Option<String>,
    confidence: Option<f64>,
    matched_document_code: Option<String>,
    extracted_code: Option<String>,
    error_message: Option<String>,
    resolution_method: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_document_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        contract_id: row.get(1)?,
        filename: row.get(2)?,
        original_filename: row.get(3)?,
        file_hash: row.get(4)?,
        status: row.get(5)?,
        manifest_item_id: row.get(6)?,
        batch_id: row.get(7)?,
        confidence: row.get(8)?,
        matched_document_code: row.get(9)?,
        extracted_code: row.get(10)?,
        error_message: row.get(11)?,
        resolution_method: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<ValidatedDocument, DatabaseError> {
    Ok(ValidatedDocument {
        id: parse_uuid(&row.id)?,
        contract_id: parse_uuid(&row.contract_id)?,
        filename: row.filename,
        original_filename: row.original_filename,
        file_hash: row.file_hash,
        status: ValidationStatus::from_str(&row.status)?,
        manifest_item_id: parse_optional_uuid(row.manifest_item_id)?,
        batch_id: parse_optional_uuid(row.batch_id)?,
        confidence: row.confidence,
        matched_document_code: row.matched_document_code,
        extracted_code: row.extracted_code,
        error_message: row.error_message,
        resolution_method: row
            .resolution_method
            .as_deref()
            .map(ResolutionMethod::from_str)
            .transpose()?,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

fn collect_documents(
    conn: &Connection,
    sql: &str,
    values: Vec<String>,
) -> Result<Vec<ValidatedDocument>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), read_document_row)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

pub fn insert_document(conn: &Connection, doc: &ValidatedDocument) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO validated_documents (id, contract_id, filename, original_filename, file_hash,
         status, manifest_item_id, batch_id, confidence, matched_document_code, extracted_code,
         error_message, resolution_method, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            doc.id.to_string(),
            doc.contract_id.to_string(),
            doc.filename,
            doc.original_filename,
            doc.file_hash,
            doc.status.as_str(),
            doc.manifest_item_id.map(|id| id.to_string()),
            doc.batch_id.map(|id| id.to_string()),
            doc.confidence,
            doc.matched_document_code,
            doc.extracted_code,
            doc.error_message,
            doc.resolution_method.map(|m| m.as_str()),
            format_timestamp(&doc.created_at),
            format_timestamp(&doc.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<ValidatedDocument>, DatabaseError> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM validated_documents WHERE id = ?1");
    match conn.query_row(&sql, params![id.to_string()], read_document_row) {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Earliest document of the contract carrying this content hash.
pub fn find_document_by_hash(
    conn: &Connection,
    contract_id: &Uuid,
    file_hash: &str,
) -> Result<Option<ValidatedDocument>, DatabaseError> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM validated_documents
         WHERE contract_id = ?1 AND file_hash = ?2
         ORDER BY created_at, rowid LIMIT 1"
    );
    match conn.query_row(&sql, params![contract_id.to_string(), file_hash], read_document_row) {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_documents(conn: &Connection, filter: &DocumentFilter) -> Result<Vec<ValidatedDocument>, DatabaseError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(contract_id) = filter.contract_id {
        values.push(contract_id.to_string());
        clauses.push(format!("contract_id = ?{}", values.len()));
    }
    if !filter.statuses.is_empty() {
        let mut slots = Vec::with_capacity(filter.statuses.len());
        for status in &filter.statuses {
            values.push(status.as_str().to_string());
            slots.push(format!("?{}", values.len()));
        }
        clauses.push(format!("status IN ({})", slots.join(", ")));
    }
    if let Some(batch_id) = filter.batch_id {
        values.push(batch_id.to_string());
        clauses.push(format!("batch_id = ?{}", values.len()));
    }
    if filter.unassigned_only {
        clauses.push("batch_id IS NULL".to_string());
    }
    if let Some(hash) = &filter.file_hash {
        values.push(hash.clone());
        clauses.push(format!("file_hash = ?{}", values.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let order_sql = if filter.newest_first {
        "ORDER BY created_at DESC, rowid DESC"
    } else {
        "ORDER BY created_at, rowid"
    };
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM validated_documents {where_sql} {order_sql}");

    collect_documents(conn, &sql, values)
}

/// Documents of a contract not assigned to any batch, oldest first.
pub fn list_unassigned_documents(
    conn: &Connection,
    contract_id: &Uuid,
) -> Result<Vec<ValidatedDocument>, DatabaseError> {
    let filter = DocumentFilter {
        unassigned_only: true,
        ..DocumentFilter::for_contract(*contract_id)
    };
    list_documents(conn, &filter)
}

/// Compare-and-set the verdict of a document.
///
/// Writes only when the stored status still equals `expected` and the
/// document is not a member of a finalized batch. Returns whether a row changed.
pub fn update_document_status_if(
    conn: &Connection,
    id: &Uuid,
    expected: ValidationStatus,
    change: &StatusChange,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE validated_documents
         SET status = ?3, manifest_item_id = ?4, confidence = ?5, matched_document_code = ?6,
             error_message = ?7, resolution_method = ?8,
             extracted_code = COALESCE(?9, extracted_code), updated_at = ?10
         WHERE id = ?1 AND status = ?2
           AND (batch_id IS NULL OR batch_id NOT IN
                (SELECT id FROM validation_batches WHERE validated_at IS NOT NULL))",
        params![
            id.to_string(),
            expected.as_str(),
            change.status.as_str(),
            change.manifest_item_id.map(|m| m.to_string()),
            change.confidence,
            change.matched_document_code,
            change.error_message,
            change.resolution_method.map(|m| m.as_str()),
            change.extracted_code,
            format_timestamp(&Utc::now()),
        ],
    )?;
    Ok(rows > 0)
}

/// Record a code found by OCR without touching the verdict.
pub fn set_extracted_code(conn: &Connection, id: &Uuid, code: &str) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE validated_documents SET extracted_code = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), code, format_timestamp(&Utc::now())],
    )?;
    if rows == 0 {
        return Err(DatabaseError::not_found("ValidatedDocument", id));
    }
    Ok(())
}

/// Point the given documents at `batch_id` (or detach them with `None`).
pub fn set_documents_batch(
    conn: &Connection,
    document_ids: &[Uuid],
    batch_id: Option<&Uuid>,
) -> Result<usize, DatabaseError> {
    let now = format_timestamp(&Utc::now());
    let batch = batch_id.map(|b| b.to_string());
    let mut stmt = conn.prepare(
        "UPDATE validated_documents SET batch_id = ?2, updated_at = ?3 WHERE id = ?1",
    )?;
    let mut changed = 0;
    for id in document_ids {
        changed += stmt.execute(params![id.to_string(), batch, now])?;
    }
    Ok(changed)
}

/// Detach every member of a batch. Returns the number of documents released.
pub fn detach_batch_documents(conn: &Connection, batch_id: &Uuid) -> Result<usize, DatabaseError> {
    let rows = conn.execute(
        "UPDATE validated_documents SET batch_id = NULL, updated_at = ?2 WHERE batch_id = ?1",
        params![batch_id.to_string(), format_timestamp(&Utc::now())],
    )?;
    Ok(rows)
}
