use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An expected document entry a contract is waiting to receive.
///
/// Owned by the manifest side; the validator only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestItem {
    pub id: Uuid,
    pub contract_id: Uuid,
    /// Canonical code: uppercase, no extension, no revision marker.
    pub document_code: String,
    pub revision: Option<String>,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl ManifestItem {
    pub fn new(contract_id: Uuid, document_code: &str, revision: Option<&str>, title: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract_id,
            document_code: document_code.trim().to_uppercase(),
            revision: revision.map(|r| r.trim().to_uppercase()),
            title: title.to_string(),
            created_at: Utc::now(),
        }
    }
}
