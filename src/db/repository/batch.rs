use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::{BatchCounts, ValidationBatch};

const BATCH_COLUMNS: &str = "id, contract_id, name, description, grdt_number, sequence_number,
     validated_at, total_items, valid_count, pending_count, invalid_count, created_at";

struct BatchRow {
    id: String,
    contract_id: String,
    name: String,
    description: Option<String>,
    grdt_number: String,
    sequence_number: i64,
    validated_at: Option<String>,
    total_items: u32,
    valid_count: u32,
    pending_count: u32,
    invalid_count: u32,
    created_at: String,
}

fn read_batch_row(row: &Row<'_>) -> rusqlite::Result<BatchRow> {
    Ok(BatchRow {
        id: row.get(0)?,
        contract_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        grdt_number: row.get(4)?,
        sequence_number: row.get(5)?,
        validated_at: row.get(6)?,
        total_items: row.get(7)?,
        valid_count: row.get(8)?,
        pending_count: row.get(9)?,
        invalid_count: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn batch_from_row(row: BatchRow) -> Result<ValidationBatch, DatabaseError> {
    Ok(ValidationBatch {
        id: parse_uuid(&row.id)?,
        contract_id: parse_uuid(&row.contract_id)?,
        name: row.name,
        description: row.description,
        grdt_number: row.grdt_number,
        sequence_number: row.sequence_number,
        validated_at: row.validated_at.as_deref().map(parse_timestamp).transpose()?,
        counts: BatchCounts {
            total_items: row.total_items,
            valid_count: row.valid_count,
            pending_count: row.pending_count,
            invalid_count: row.invalid_count,
        },
        created_at: parse_timestamp(&row.created_at)?,
    })
}

/// Allocate the next GRDT sequence value of a contract.
///
/// The counter only grows; deleting a batch never frees its number.
pub fn next_grdt_sequence(conn: &Connection, contract_id: &Uuid) -> Result<i64, DatabaseError> {
    let value = conn.query_row(
        "INSERT INTO grdt_sequences (contract_id, last_value) VALUES (?1, 1)
         ON CONFLICT (contract_id) DO UPDATE SET last_value = last_value + 1
         RETURNING last_value",
        params![contract_id.to_string()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(value)
}

pub fn insert_batch(conn: &Connection, batch: &ValidationBatch) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO validation_batches (id, contract_id, name, description, grdt_number,
         sequence_number, validated_at, total_items, valid_count, pending_count, invalid_count,
         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            batch.id.to_string(),
            batch.contract_id.to_string(),
            batch.name,
            batch.description,
            batch.grdt_number,
            batch.sequence_number,
            batch.validated_at.as_ref().map(format_timestamp),
            batch.counts.total_items,
            batch.counts.valid_count,
            batch.counts.pending_count,
            batch.counts.invalid_count,
            format_timestamp(&batch.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_batch(conn: &Connection, id: &Uuid) -> Result<Option<ValidationBatch>, DatabaseError> {
    let sql = format!("SELECT {BATCH_COLUMNS} FROM validation_batches WHERE id = ?1");
    match conn.query_row(&sql, params![id.to_string()], read_batch_row) {
        Ok(row) => Ok(Some(batch_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Batches of a contract in GRDT sequence order.
pub fn list_batches(conn: &Connection, contract_id: &Uuid) -> Result<Vec<ValidationBatch>, DatabaseError> {
    let sql = format!(
        "SELECT {BATCH_COLUMNS} FROM validation_batches
         WHERE contract_id = ?1 ORDER BY sequence_number, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![contract_id.to_string()], read_batch_row)?;

    let mut batches = Vec::new();
    for row in rows {
        batches.push(batch_from_row(row?)?);
    }
    Ok(batches)
}

/// Rename or re-describe an open batch. Returns false when the batch is finalized or absent.
pub fn update_open_batch(
    conn: &Connection,
    id: &Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE validation_batches SET name = ?2, description = ?3
         WHERE id = ?1 AND validated_at IS NULL",
        params![id.to_string(), name, description],
    )?;
    Ok(rows > 0)
}

/// Freeze counts and stamp `validated_at`, only if the batch is still open.
pub fn mark_batch_finalized(
    conn: &Connection,
    id: &Uuid,
    counts: &BatchCounts,
    at: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE validation_batches
         SET validated_at = ?2, total_items = ?3, valid_count = ?4, pending_count = ?5,
             invalid_count = ?6
         WHERE id = ?1 AND validated_at IS NULL",
        params![
            id.to_string(),
            format_timestamp(at),
            counts.total_items,
            counts.valid_count,
            counts.pending_count,
            counts.invalid_count,
        ],
    )?;
    Ok(rows > 0)
}

pub fn delete_batch_row(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute("DELETE FROM validation_batches WHERE id = ?1", params![id.to_string()])?;
    if rows == 0 {
        return Err(DatabaseError::not_found("ValidationBatch", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::{detach_batch_documents, get_document, insert_document, set_documents_batch};
    use crate::models::ValidatedDocument;

    fn make_batch(conn: &Connection, contract_id: Uuid, grdt: &str) -> ValidationBatch {
        let batch = ValidationBatch {
            id: Uuid::new_v4(),
            contract_id,
            name: "Lote 1".into(),
            description: None,
            grdt_number: grdt.into(),
            sequence_number: next_grdt_sequence(conn, &contract_id).unwrap(),
            validated_at: None,
            counts: BatchCounts::default(),
            created_at: Utc::now(),
        };
        insert_batch(conn, &batch).unwrap();
        batch
    }

    #[test]
    fn sequence_is_monotonic_per_contract() {
        let conn = open_memory_database().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(next_grdt_sequence(&conn, &a).unwrap(), 1);
        assert_eq!(next_grdt_sequence(&conn, &a).unwrap(), 2);
        assert_eq!(next_grdt_sequence(&conn, &b).unwrap(), 1);
        assert_eq!(next_grdt_sequence(&conn, &a).unwrap(), 3);
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let batch = make_batch(&conn, Uuid::new_v4(), "eGRDT-CT-2026-0001");
        assert_eq!(get_batch(&conn, &batch.id).unwrap().unwrap(), batch);
        assert!(get_batch(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn grdt_number_unique_per_contract() {
        let conn = open_memory_database().unwrap();
        let contract = Uuid::new_v4();
        let first = make_batch(&conn, contract, "G-1");
        // Same number in another contract is fine
        make_batch(&conn, Uuid::new_v4(), "G-1");

        let clash = ValidationBatch {
            id: Uuid::new_v4(),
            sequence_number: 2,
            ..first
        };
        let err = insert_batch(&conn, &clash).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn finalize_only_once() {
        let conn = open_memory_database().unwrap();
        let batch = make_batch(&conn, Uuid::new_v4(), "G-1");
        let counts = BatchCounts { total_items: 3, valid_count: 3, ..BatchCounts::default() };

        assert!(mark_batch_finalized(&conn, &batch.id, &counts, &Utc::now()).unwrap());
        assert!(!mark_batch_finalized(&conn, &batch.id, &BatchCounts::default(), &Utc::now()).unwrap());

        let loaded = get_batch(&conn, &batch.id).unwrap().unwrap();
        assert!(loaded.is_finalized());
        assert_eq!(loaded.counts, counts);
        assert!(!update_open_batch(&conn, &batch.id, "renamed", None).unwrap());
    }

    #[test]
    fn list_orders_by_sequence() {
        let conn = open_memory_database().unwrap();
        let contract = Uuid::new_v4();
        make_batch(&conn, contract, "G-1");
        make_batch(&conn, contract, "G-2");
        let numbers: Vec<i64> = list_batches(&conn, &contract)
            .unwrap()
            .iter()
            .map(|b| b.sequence_number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn delete_after_detach_keeps_documents() {
        let conn = open_memory_database().unwrap();
        let contract = Uuid::new_v4();
        let batch = make_batch(&conn, contract, "G-1");
        let doc = ValidatedDocument::pending(contract, "DOC-001.pdf");
        insert_document(&conn, &doc).unwrap();
        assert_eq!(set_documents_batch(&conn, &[doc.id], Some(&batch.id)).unwrap(), 1);

        assert_eq!(detach_batch_documents(&conn, &batch.id).unwrap(), 1);
        delete_batch_row(&conn, &batch.id).unwrap();

        let loaded = get_document(&conn, &doc.id).unwrap().unwrap();
        assert!(loaded.batch_id.is_none());
        assert!(matches!(
            delete_batch_row(&conn, &batch.id),
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
