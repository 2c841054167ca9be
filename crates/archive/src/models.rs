//! In-memory shapes for a cold-storage blob. A blob groups every execution
//! row created on a given UTC calendar date into a single gzip-compressed
//! JSON document (spec.md §4.6); `ArchiveMetadataRow` in the `db` crate is
//! the durable pointer to where that document lives.

use chrono::NaiveDate;
use db::models::ExecutionRow;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveBlob {
    pub id: Uuid,
    pub date: NaiveDate,
    pub count: usize,
    pub executions: Vec<ExecutionRow>,
}

impl ArchiveBlob {
    pub fn new(id: Uuid, date: NaiveDate, executions: Vec<ExecutionRow>) -> Self {
        Self { id, date, count: executions.len(), executions }
    }

    pub fn storage_key(&self) -> String {
        format!("archive/executions/{}/{}.json.gz", self.date, self.id)
    }
}

/// Filter used by both `QueryArchived` (cold storage only) and
/// `GetUnifiedExecutions` (hot + cold merged).
#[derive(Debug, Clone, Default)]
pub struct ArchiveFilter {
    pub workflow_id: Option<Uuid>,
    pub status: Option<String>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
}

impl ArchiveFilter {
    fn matches(&self, row: &ExecutionRow) -> bool {
        if let Some(workflow_id) = self.workflow_id {
            if row.workflow_id != workflow_id {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if &row.status != status {
                return false;
            }
        }
        if let Some(since) = self.since {
            if row.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if row.created_at > until {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, rows: Vec<ExecutionRow>) -> Vec<ExecutionRow> {
        rows.into_iter().filter(|row| self.matches(row)).collect()
    }
}
