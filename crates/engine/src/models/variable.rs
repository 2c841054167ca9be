//! `VariableContext` — the layered scope that resolves templated
//! references (spec.md §3, glossary: "Variable context").

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    Development,
    Staging,
    Production,
}

impl EnvironmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

/// A single scoped key-value entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub encrypted: bool,
}

impl Variable {
    /// A copy with its value masked, for public/debug views that must never
    /// leak secret values.
    pub fn masked(&self) -> Variable {
        if self.encrypted {
            Variable {
                key: self.key.clone(),
                value: Value::String("***".to_string()),
                read_only: self.read_only,
                encrypted: true,
            }
        } else {
            self.clone()
        }
    }
}

/// Resolves `{{name}}` references in precedence order
/// global < workflow < environment < runtime (later scopes win).
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    global: HashMap<String, Variable>,
    workflow: HashMap<String, Variable>,
    environment: HashMap<String, Variable>,
    runtime: HashMap<String, Variable>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(mut self, vars: impl IntoIterator<Item = Variable>) -> Self {
        self.global = vars.into_iter().map(|v| (v.key.clone(), v)).collect();
        self
    }

    pub fn with_workflow(mut self, vars: impl IntoIterator<Item = Variable>) -> Self {
        self.workflow = vars.into_iter().map(|v| (v.key.clone(), v)).collect();
        self
    }

    pub fn with_environment(mut self, vars: impl IntoIterator<Item = Variable>) -> Self {
        self.environment = vars.into_iter().map(|v| (v.key.clone(), v)).collect();
        self
    }

    /// Runtime scope holds the request's input payload and prior node
    /// outputs, keyed `{{name}}` and `{{nodeId.field}}` respectively.
    pub fn set_runtime(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.runtime.insert(
            key.clone(),
            Variable { key, value, read_only: false, encrypted: false },
        );
    }

    /// Resolve a plain variable name against all four scopes, in
    /// precedence order (runtime wins).
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.runtime
            .get(name)
            .or_else(|| self.environment.get(name))
            .or_else(|| self.workflow.get(name))
            .or_else(|| self.global.get(name))
            .map(|v| &v.value)
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.runtime
            .get(name)
            .or_else(|| self.environment.get(name))
            .or_else(|| self.workflow.get(name))
            .or_else(|| self.global.get(name))
            .map(|v| v.read_only)
            .unwrap_or(false)
    }
}
