//! Conversions between the durable `db::models::TriggerRow` and the
//! in-memory `engine::models::Trigger` domain type.

use db::models::TriggerRow;
use engine::models::{Trigger, TriggerKind, TriggerStatus};

use crate::error::TriggerError;

pub fn row_to_trigger(row: &TriggerRow) -> Result<Trigger, TriggerError> {
    let kind: TriggerKind = serde_json::from_value(row.kind.clone())?;
    let status = match row.status.as_str() {
        "active" => TriggerStatus::Active,
        "paused" => TriggerStatus::Paused,
        _ => TriggerStatus::Inactive,
    };
    Ok(Trigger {
        id: row.id,
        workflow_id: row.workflow_id,
        kind,
        status,
        last_fired_at: row.last_fired_at,
        fire_count: row.fire_count.max(0) as u64,
        error_count: row.error_count.max(0) as u64,
        created_at: row.created_at,
    })
}

pub fn status_str(status: TriggerStatus) -> &'static str {
    match status {
        TriggerStatus::Inactive => "inactive",
        TriggerStatus::Active => "active",
        TriggerStatus::Paused => "paused",
    }
}
