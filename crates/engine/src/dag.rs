//! DAG validation and topological ordering — run before persisting or
//! dispatching a workflow (spec.md §4.1).
//!
//! `validate` never stops at the first problem: every check that doesn't
//! require a prior step's result runs and contributes to the returned error
//! and warning lists. Checks that structurally depend on an earlier one
//! (cycle detection needs valid connection endpoints; port/parameter checks
//! are only meaningful once duplicate ids are ruled out) still run in the
//! spec's listed order, short-circuiting on those specific prerequisites.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{ValidationError, ValidationWarning};
use crate::models::workflow::{NodeType, PORT_FALSE, PORT_OUTPUT, PORT_TRUE};
use crate::models::Workflow;
use crate::EngineError;

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];
const DB_OPERATIONS: &[&str] = &["select", "insert", "update", "delete", "upsert"];
const CODE_LANGUAGES: &[&str] = &["javascript", "python"];

/// Validate a workflow's structure and per-node-type parameters.
///
/// Returns `(errors, warnings)`. An empty `errors` vec means the workflow
/// may be admitted; `warnings` never block admission.
pub fn validate(workflow: &Workflow) -> (Vec<ValidationError>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // 1. Duplicate node ids.
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }
    if !errors.is_empty() {
        // Every later check indexes nodes by id; a duplicate id makes that
        // indexing ambiguous, so stop here as the spec's ordering implies.
        return (errors, warnings);
    }

    // 2. At least one trigger or webhook node.
    let has_entry_point = workflow
        .nodes
        .iter()
        .any(|n| n.node_type.is_entry_point());
    if !has_entry_point {
        errors.push(ValidationError::NoTrigger);
    }

    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
    let node_by_id: HashMap<&str, _> = workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    // 3. Connection endpoints must resolve.
    let mut endpoints_ok = true;
    for conn in &workflow.connections {
        if !node_set.contains(conn.source.as_str()) {
            errors.push(ValidationError::UnknownNodeReference {
                node_id: conn.source.clone(),
                side: "from",
            });
            endpoints_ok = false;
        }
        if !node_set.contains(conn.target.as_str()) {
            errors.push(ValidationError::UnknownNodeReference {
                node_id: conn.target.clone(),
                side: "to",
            });
            endpoints_ok = false;
        }
    }

    // 4. Cycle detection (DFS + recursion stack), only meaningful once every
    // endpoint resolves.
    if endpoints_ok && has_cycle(workflow) {
        errors.push(ValidationError::CycleDetected);
    }

    // 5 & 6. Incoming-edge warnings.
    if endpoints_ok {
        let mut incoming: HashMap<&str, usize> =
            workflow.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        for conn in &workflow.connections {
            *incoming.entry(conn.target.as_str()).or_insert(0) += 1;
        }

        for node in &workflow.nodes {
            let count = *incoming.get(node.id.as_str()).unwrap_or(&0);
            if count == 0 && !node.node_type.is_entry_point() {
                warnings.push(ValidationWarning::UnreachableNode { node_id: node.id.clone() });
            }
            if node.node_type == NodeType::Merge && count < 2 {
                warnings.push(ValidationWarning::MergeMissingInputs {
                    node_id: node.id.clone(),
                    incoming: count,
                });
            }
        }
    }

    // 7. Per-type parameter schemas + timeout range.
    for node in &workflow.nodes {
        validate_node_parameters(node, &mut errors);

        if let Some(timeout) = node.timeout_seconds {
            if !(1..=300).contains(&timeout) {
                errors.push(ValidationError::TimeoutOutOfRange {
                    node_id: node.id.clone(),
                    value: timeout as i64,
                });
            }
        }
    }

    // 8. Port compatibility.
    if endpoints_ok {
        for conn in &workflow.connections {
            if let Some(source) = node_by_id.get(conn.source.as_str()) {
                validate_source_port(source.id.as_str(), source.node_type, &conn.source_port, &mut errors);
            }
            if let Some(target) = node_by_id.get(conn.target.as_str()) {
                if target.node_type.is_entry_point() {
                    errors.push(ValidationError::IncompatiblePort {
                        node_id: target.id.clone(),
                        node_type: target.node_type.as_str().to_string(),
                        port: conn.target_port.clone(),
                    });
                }
            }
        }
    }

    (errors, warnings)
}

fn validate_source_port(
    node_id: &str,
    node_type: NodeType,
    port: &str,
    errors: &mut Vec<ValidationError>,
) {
    let allowed: &[&str] = match node_type {
        NodeType::Split => &[PORT_TRUE, PORT_FALSE, PORT_OUTPUT],
        NodeType::Condition => &[PORT_TRUE, PORT_FALSE],
        _ => &[PORT_OUTPUT],
    };
    if !allowed.contains(&port) {
        errors.push(ValidationError::IncompatiblePort {
            node_id: node_id.to_string(),
            node_type: node_type.as_str().to_string(),
            port: port.to_string(),
        });
    }
}

fn validate_node_parameters(node: &crate::models::Node, errors: &mut Vec<ValidationError>) {
    let params = &node.parameters;
    let get_str = |field: &str| params.get(field).and_then(|v| v.as_str());

    match node.node_type {
        NodeType::HttpRequest => {
            if get_str("url").is_none() {
                errors.push(missing(node, "url"));
            }
            match get_str("method") {
                None => errors.push(missing(node, "method")),
                Some(m) if !HTTP_METHODS.contains(&m) => {
                    errors.push(invalid(node, "method", format!("must be one of {HTTP_METHODS:?}")))
                }
                _ => {}
            }
        }
        NodeType::Database => {
            match get_str("operation") {
                None => errors.push(missing(node, "operation")),
                Some(op) if !DB_OPERATIONS.contains(&op) => {
                    errors.push(invalid(node, "operation", format!("must be one of {DB_OPERATIONS:?}")))
                }
                _ => {}
            }
            if get_str("table").is_none() {
                errors.push(missing(node, "table"));
            }
        }
        NodeType::Email => {
            if get_str("to").is_none() {
                errors.push(missing(node, "to"));
            }
            if get_str("subject").is_none() {
                errors.push(missing(node, "subject"));
            }
        }
        NodeType::Code => {
            if get_str("code").is_none() {
                errors.push(missing(node, "code"));
            }
            match get_str("language") {
                None => errors.push(missing(node, "language")),
                Some(lang) if !CODE_LANGUAGES.contains(&lang) => errors.push(invalid(
                    node,
                    "language",
                    format!("unsupported language, must be one of {CODE_LANGUAGES:?}"),
                )),
                _ => {}
            }
        }
        _ => {}
    }
}

fn missing(node: &crate::models::Node, field: &str) -> ValidationError {
    ValidationError::MissingParameter {
        node_id: node.id.clone(),
        node_type: node.node_type.as_str().to_string(),
        field: field.to_string(),
    }
}

fn invalid(node: &crate::models::Node, field: &str, reason: String) -> ValidationError {
    ValidationError::InvalidParameter {
        node_id: node.id.clone(),
        field: field.to_string(),
        reason,
    }
}

/// DFS cycle detection with an explicit recursion stack.
fn has_cycle(workflow: &Workflow) -> bool {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &workflow.nodes {
        adjacency.entry(node.id.as_str()).or_default();
    }
    for conn in &workflow.connections {
        adjacency.entry(conn.source.as_str()).or_default().push(conn.target.as_str());
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InStack,
        Done,
    }

    let mut marks: HashMap<&str, Mark> =
        workflow.nodes.iter().map(|n| (n.id.as_str(), Mark::Unvisited)).collect();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> bool {
        match marks.get(node) {
            Some(Mark::InStack) => return true,
            Some(Mark::Done) => return false,
            _ => {}
        }
        marks.insert(node, Mark::InStack);
        if let Some(neighbours) = adjacency.get(node) {
            for &next in neighbours {
                if visit(next, adjacency, marks) {
                    return true;
                }
            }
        }
        marks.insert(node, Mark::Done);
        false
    }

    for node in &workflow.nodes {
        if matches!(marks.get(node.id.as_str()), Some(Mark::Unvisited)) {
            if visit(node.id.as_str(), &adjacency, &mut marks) {
                return true;
            }
        }
    }
    false
}

/// Kahn's algorithm. Assumes the workflow already passed [`validate`]; a
/// cycle is reported as [`EngineError::CycleDetected`] rather than panicking
/// so callers that skip validation (tests, tooling) still fail safely.
pub fn topological_order(workflow: &Workflow) -> Result<Vec<String>, EngineError> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for node in &workflow.nodes {
        adjacency.entry(node.id.as_str()).or_default();
        in_degree.entry(node.id.as_str()).or_insert(0);
    }

    for conn in &workflow.connections {
        adjacency.entry(conn.source.as_str()).or_default().push(conn.target.as_str());
        *in_degree.entry(conn.target.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    // Deterministic order: process ids lexicographically among ready nodes.
    let mut ready: Vec<&str> = queue.drain(..).collect();
    ready.sort_unstable();
    queue.extend(ready);

    let mut sorted: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            let mut newly_ready: Vec<&str> = Vec::new();
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(neighbour);
                }
            }
            newly_ready.sort_unstable();
            queue.extend(newly_ready);
        }
    }

    if sorted.len() != workflow.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workflow::{Connection, Node, NodeType, Position};
    use crate::models::Workflow;
    use serde_json::json;
    use uuid::Uuid;

    fn make_node(id: &str, node_type: NodeType) -> Node {
        Node {
            id: id.to_string(),
            node_type,
            position: Position::default(),
            parameters: json!({}),
            retry_count: 0,
            timeout_seconds: None,
            disabled: false,
            continue_on_fail: false,
        }
    }

    fn make_workflow(nodes: Vec<Node>, connections: Vec<Connection>) -> Workflow {
        let mut wf = Workflow::new("test", Uuid::new_v4(), nodes, connections);
        wf.id = Uuid::new_v4();
        wf
    }

    fn edge(from: &str, to: &str) -> Connection {
        Connection {
            source: from.into(),
            target: to.into(),
            source_port: "output".into(),
            target_port: "input".into(),
            data: None,
        }
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        let wf = make_workflow(
            vec![
                make_node("a", NodeType::Trigger),
                make_node("b", NodeType::Action),
                make_node("c", NodeType::Action),
            ],
            vec![edge("a", "b"), edge("b", "c")],
        );
        let (errors, _) = validate(&wf);
        assert!(errors.is_empty(), "{errors:?}");
        let sorted = topological_order(&wf).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_dag() {
        let wf = make_workflow(
            vec![
                make_node("a", NodeType::Trigger),
                make_node("b", NodeType::Action),
                make_node("c", NodeType::Action),
                make_node("d", NodeType::Merge),
            ],
            vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        );
        let sorted = topological_order(&wf).expect("should be valid");
        assert_eq!(sorted.first().unwrap(), "a");
        assert_eq!(sorted.last().unwrap(), "d");
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let wf = make_workflow(
            vec![make_node("a", NodeType::Trigger), make_node("a", NodeType::Action)],
            vec![],
        );
        let (errors, _) = validate(&wf);
        assert!(matches!(errors.as_slice(), [ValidationError::DuplicateNodeId(id)] if id == "a"));
    }

    #[test]
    fn missing_trigger_is_rejected() {
        let wf = make_workflow(vec![make_node("a", NodeType::Action)], vec![]);
        let (errors, _) = validate(&wf);
        assert!(errors.contains(&ValidationError::NoTrigger));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let wf = make_workflow(
            vec![make_node("a", NodeType::Trigger)],
            vec![edge("a", "ghost")],
        );
        let (errors, _) = validate(&wf);
        assert!(errors.iter().any(
            |e| matches!(e, ValidationError::UnknownNodeReference { node_id, .. } if node_id == "ghost")
        ));
    }

    #[test]
    fn cycle_is_detected() {
        let wf = make_workflow(
            vec![
                make_node("a", NodeType::Trigger),
                make_node("b", NodeType::Action),
                make_node("c", NodeType::Action),
            ],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );
        let (errors, _) = validate(&wf);
        assert!(errors.contains(&ValidationError::CycleDetected));
        assert!(matches!(topological_order(&wf), Err(EngineError::CycleDetected)));
    }

    #[test]
    fn unreachable_node_is_a_warning_not_an_error() {
        let wf = make_workflow(
            vec![make_node("a", NodeType::Trigger), make_node("b", NodeType::Action)],
            vec![],
        );
        let (errors, warnings) = validate(&wf);
        assert!(errors.is_empty());
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::UnreachableNode { node_id } if node_id == "b")));
    }

    #[test]
    fn merge_with_one_input_warns() {
        let wf = make_workflow(
            vec![make_node("a", NodeType::Trigger), make_node("m", NodeType::Merge)],
            vec![edge("a", "m")],
        );
        let (_, warnings) = validate(&wf);
        assert!(warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::MergeMissingInputs { node_id, incoming } if node_id == "m" && *incoming == 1
        )));
    }

    #[test]
    fn http_request_requires_url_and_method() {
        let mut http_node = make_node("h", NodeType::HttpRequest);
        http_node.parameters = json!({"url": "http://x", "method": "BOGUS"});
        let wf = make_workflow(vec![make_node("a", NodeType::Trigger), http_node], vec![edge("a", "h")]);
        let (errors, _) = validate(&wf);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidParameter { field, .. } if field == "method")));
    }

    #[test]
    fn condition_port_must_be_true_or_false() {
        let cond = make_node("c", NodeType::Condition);
        let wf = make_workflow(
            vec![make_node("a", NodeType::Trigger), cond, make_node("b", NodeType::Action)],
            vec![edge("a", "c"), edge("c", "b")],
        );
        let (errors, _) = validate(&wf);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::IncompatiblePort { node_id, .. } if node_id == "c")));
    }

    #[test]
    fn trigger_node_cannot_be_a_connection_target() {
        let wf = make_workflow(
            vec![make_node("a", NodeType::Trigger), make_node("b", NodeType::Trigger)],
            vec![edge("a", "b")],
        );
        let (errors, _) = validate(&wf);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::IncompatiblePort { node_id, .. } if node_id == "b")));
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let wf = make_workflow(vec![make_node("solo", NodeType::Trigger)], vec![]);
        let sorted = topological_order(&wf).expect("single node should be valid");
        assert_eq!(sorted, vec!["solo"]);
    }
}
