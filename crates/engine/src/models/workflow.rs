//! `Workflow`, `Node`, and `Connection` — the static graph definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of built-in node types (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Webhook,
    Action,
    Condition,
    Switch,
    Loop,
    Foreach,
    While,
    Split,
    Merge,
    Aggregate,
    HttpRequest,
    Database,
    Code,
    Email,
    Slack,
    Set,
    Function,
    Wait,
    Datetime,
    Crypto,
    Json,
    Math,
    Text,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Webhook => "webhook",
            Self::Action => "action",
            Self::Condition => "condition",
            Self::Switch => "switch",
            Self::Loop => "loop",
            Self::Foreach => "foreach",
            Self::While => "while",
            Self::Split => "split",
            Self::Merge => "merge",
            Self::Aggregate => "aggregate",
            Self::HttpRequest => "http_request",
            Self::Database => "database",
            Self::Code => "code",
            Self::Email => "email",
            Self::Slack => "slack",
            Self::Set => "set",
            Self::Function => "function",
            Self::Wait => "wait",
            Self::Datetime => "datetime",
            Self::Crypto => "crypto",
            Self::Json => "json",
            Self::Math => "math",
            Self::Text => "text",
        }
    }

    /// Entry-point node types never receive incoming connections.
    pub fn is_entry_point(&self) -> bool {
        matches!(self, Self::Trigger | Self::Webhook)
    }

    /// Default per-node timeout if the node doesn't specify one.
    pub fn default_timeout_seconds(&self) -> u32 {
        if matches!(self, Self::Wait) {
            300
        } else {
            30
        }
    }
}

/// UI layout position. Carried for round-tripping; never consulted by the
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by connections).
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub position: Position,
    /// Arbitrary configuration passed to the node executor at run time.
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub retry_count: u32,
    pub timeout_seconds: Option<u32>,
    #[serde(default)]
    pub disabled: bool,
    /// If true, a failed dependency does not halt downstream execution of
    /// nodes that depend on this one's *success* path elsewhere in the graph.
    #[serde(default)]
    pub continue_on_fail: bool,
}

impl Node {
    pub fn effective_timeout_seconds(&self) -> u32 {
        self.timeout_seconds
            .unwrap_or_else(|| self.node_type.default_timeout_seconds())
    }
}

/// The two named ports `split` nodes can emit data-carrying branches on,
/// plus the implicit `output`/`input` default used by every other node.
pub const PORT_OUTPUT: &str = "output";
pub const PORT_INPUT: &str = "input";
pub const PORT_TRUE: &str = "true";
pub const PORT_FALSE: &str = "false";

/// A directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub source: String,
    pub target: String,
    #[serde(default = "default_port_output")]
    pub source_port: String,
    #[serde(default = "default_port_input")]
    pub target_port: String,
    #[serde(default)]
    pub data: Option<Value>,
}

fn default_port_output() -> String {
    PORT_OUTPUT.to_string()
}
fn default_port_input() -> String {
    PORT_INPUT.to_string()
}

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
    pub name: String,
    /// Monotonically increasing; bumped on every versioned update.
    pub version: i64,
    pub is_active: bool,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Convenience constructor for tests and CLI scaffolding.
    pub fn new(name: impl Into<String>, owner_id: Uuid, nodes: Vec<Node>, connections: Vec<Connection>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            team_id: None,
            name: name.into(),
            version: 1,
            is_active: false,
            nodes,
            connections,
            tags: Vec::new(),
            settings: Value::Null,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// An immutable snapshot of a workflow taken on every versioned update
/// (spec.md §9 — "every update appends an immutable version row").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub workflow_id: Uuid,
    pub version: i64,
    pub snapshot: Value,
    pub created_at: DateTime<Utc>,
}
