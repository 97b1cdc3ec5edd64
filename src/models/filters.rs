use uuid::Uuid;

use super::enums::ValidationStatus;

#[derive(Debug, Default, Clone)]
pub struct DocumentFilter {
    pub contract_id: Option<Uuid>,
    /// Empty means any status.
    pub statuses: Vec<ValidationStatus>,
    pub batch_id: Option<Uuid>,
    pub unassigned_only: bool,
    pub file_hash: Option<String>,
    /// Newest first instead of upload order.
    pub newest_first: bool,
}

impl DocumentFilter {
    pub fn for_contract(contract_id: Uuid) -> Self {
        Self {
            contract_id: Some(contract_id),
            ..Self::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[ValidationStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }
}
