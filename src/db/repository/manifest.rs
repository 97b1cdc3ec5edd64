use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{format_timestamp, like_pattern, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::ManifestItem;

const MANIFEST_COLUMNS: &str = "id, contract_id, document_code, revision, title, created_at";

struct ManifestRow {
    id: String,
    contract_id: String,
    document_code: String,
    revision: Option<String>,
    title: String,
    created_at: String,
}

fn read_manifest_row(row: &Row<'_>) -> rusqlite::Result<ManifestRow> {
    Ok(ManifestRow {
        id: row.get(0)?,
        contract_id: row.get(1)?,
        document_code: row.get(2)?,
        revision: row.get(3)?,
        title: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn manifest_from_row(row: ManifestRow) -> Result<ManifestItem, DatabaseError> {
    Ok(ManifestItem {
        id: parse_uuid(&row.id)?,
        contract_id: parse_uuid(&row.contract_id)?,
        document_code: row.document_code,
        revision: row.revision,
        title: row.title,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

pub fn insert_manifest_item(conn: &Connection, item: &ManifestItem) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO manifest_items (id, contract_id, document_code, revision, title, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            item.id.to_string(),
            item.contract_id.to_string(),
            item.document_code,
            item.revision,
            item.title,
            format_timestamp(&item.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_manifest_item(conn: &Connection, id: &Uuid) -> Result<Option<ManifestItem>, DatabaseError> {
    let sql = format!("SELECT {MANIFEST_COLUMNS} FROM manifest_items WHERE id = ?1");
    match conn.query_row(&sql, params![id.to_string()], read_manifest_row) {
        Ok(row) => Ok(Some(manifest_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All items of a contract in insertion order.
pub fn list_manifest_items(conn: &Connection, contract_id: &Uuid) -> Result<Vec<ManifestItem>, DatabaseError> {
    let sql = format!(
        "SELECT {MANIFEST_COLUMNS} FROM manifest_items WHERE contract_id = ?1 ORDER BY rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![contract_id.to_string()], read_manifest_row)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(manifest_from_row(row?)?);
    }
    Ok(items)
}

/// Items whose code or title contains `query` (case-insensitive), in insertion order.
pub fn search_manifest_items(
    conn: &Connection,
    contract_id: &Uuid,
    query: &str,
) -> Result<Vec<ManifestItem>, DatabaseError> {
    let sql = format!(
        "SELECT {MANIFEST_COLUMNS} FROM manifest_items
         WHERE contract_id = ?1
           AND (document_code LIKE ?2 ESCAPE '\\' OR title LIKE ?2 ESCAPE '\\')
         ORDER BY rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![contract_id.to_string(), like_pattern(query.trim())],
        read_manifest_row,
    )?;

    let mut items = Vec::new();
    for row in rows {
        items.push(manifest_from_row(row?)?);
    }
    Ok(items)
}

pub fn delete_manifest_item(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute("DELETE FROM manifest_items WHERE id = ?1", params![id.to_string()])?;
    if rows == 0 {
        return Err(DatabaseError::not_found("ManifestItem", id));
    }
    Ok(())
}
