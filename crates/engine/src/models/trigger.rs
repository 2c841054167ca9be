//! `Trigger` — the polymorphic descriptor that binds a workflow to a rule
//! for submitting execution requests (spec.md §3).
//!
//! Not to be confused with [`super::workflow::NodeType::Trigger`], which is
//! a graph node. A workflow's `Trigger` entities decide *when* an execution
//! request is submitted; the `trigger`/`webhook` graph nodes are where the
//! resulting data enters the DAG.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Inactive,
    Active,
    Paused,
}

/// Policy applied when a scheduled firing is missed because the previous
/// run of the same workflow is still executing (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MisfirePolicy {
    /// Drop the missed firing. Default.
    #[default]
    Skip,
    /// Coalesce all missed firings into a single follow-up run.
    RunOnce,
    /// Enqueue one execution per missed instant.
    RunAll,
}

/// Per-type trigger configuration (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    Webhook {
        path: String,
        method: String,
        hmac_secret: Option<String>,
    },
    Schedule {
        /// Five-field cron expression.
        cron_expression: String,
        /// IANA timezone name, e.g. "America/New_York".
        timezone: String,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        #[serde(default)]
        misfire_policy: MisfirePolicy,
    },
    Event {
        event_type: String,
        source: Option<String>,
        #[serde(default)]
        filter: HashMap<String, Value>,
    },
    Manual {
        #[serde(default)]
        allowed_user_ids: Vec<Uuid>,
        #[serde(default)]
        confirmation_required: bool,
    },
    Email {
        mailbox: String,
        subject_prefix: Option<String>,
        #[serde(default)]
        from_allow_list: Vec<String>,
        #[serde(default)]
        keywords: Vec<String>,
    },
}

impl TriggerKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Webhook { .. } => "webhook",
            Self::Schedule { .. } => "schedule",
            Self::Event { .. } => "event",
            Self::Manual { .. } => "manual",
            Self::Email { .. } => "email",
        }
    }
}

/// A trigger bound to a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub kind: TriggerKind,
    pub status: TriggerStatus,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub fire_count: u64,
    pub error_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Trigger {
    pub fn new(workflow_id: Uuid, kind: TriggerKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            kind,
            status: TriggerStatus::Inactive,
            last_fired_at: None,
            fire_count: 0,
            error_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn record_fire(&mut self) {
        self.last_fired_at = Some(Utc::now());
        self.fire_count += 1;
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Does this trigger match an inbound signal? Schedule triggers never
    /// match here — they're driven by the scheduler's own clock, not by an
    /// `IncomingEvent`, so `get_next_run_time` (computed by the caller from
    /// `TriggerKind::Schedule`'s cron expression) is what decides those.
    pub fn should_fire(&self, event: &IncomingEvent<'_>) -> bool {
        if self.status != TriggerStatus::Active {
            return false;
        }
        match (&self.kind, event) {
            (
                TriggerKind::Webhook { path, method, .. },
                IncomingEvent::Webhook { path: event_path, method: event_method, .. },
            ) => path == event_path && method.eq_ignore_ascii_case(event_method),
            (
                TriggerKind::Event { event_type, source, filter },
                IncomingEvent::Event { event_type: incoming_type, source: incoming_source, payload },
            ) => {
                event_type == incoming_type
                    && source.as_deref() == *incoming_source
                    && filter.iter().all(|(key, expected)| {
                        payload.get(key).map(|value| value == expected).unwrap_or(false)
                    })
            }
            (
                TriggerKind::Email { mailbox, subject_prefix, from_allow_list, keywords },
                IncomingEvent::Email { to_mailbox, from, subject, body },
            ) => {
                mailbox == to_mailbox
                    && subject_prefix.as_deref().map(|prefix| subject.starts_with(prefix)).unwrap_or(true)
                    && (from_allow_list.is_empty() || from_allow_list.iter().any(|allowed| allowed == from))
                    && (keywords.is_empty() || keywords.iter().any(|keyword| body.contains(keyword.as_str()) || subject.contains(keyword.as_str())))
            }
            (TriggerKind::Manual { allowed_user_ids, .. }, IncomingEvent::Manual { user_id }) => {
                allowed_user_ids.is_empty() || allowed_user_ids.contains(user_id)
            }
            _ => false,
        }
    }
}

/// An inbound signal evaluated against active triggers.
#[derive(Debug, Clone)]
pub enum IncomingEvent<'a> {
    Webhook {
        path: &'a str,
        method: &'a str,
        raw_body: &'a [u8],
        signature: Option<&'a str>,
    },
    Event {
        event_type: &'a str,
        source: Option<&'a str>,
        payload: &'a Value,
    },
    Email {
        to_mailbox: &'a str,
        from: &'a str,
        subject: &'a str,
        body: &'a str,
    },
    Manual {
        user_id: Uuid,
    },
}
