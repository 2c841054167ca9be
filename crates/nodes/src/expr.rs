//! Dotted-path field access (`users[0].email`) and `{{...}}` template
//! substitution.
//!
//! Deliberately not a general-purpose scripting runtime: the grammar here
//! is the minimum needed to read a field out of a JSON tree and splice a
//! handful of them into a string. `condition`, `switch`, `function`, and
//! the `json` kernel all build on [`get_path`]; `function` and the
//! orchestrator's context resolution build on [`render_template`].

use serde_json::Value;

/// One step in a parsed path: a map key, or an index into the array the
/// previous step resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Parse `a.b[0].c` into `[Key(a), Key(b), Index(0), Key(c)]`.
fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }
        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(close) = stripped.find(']') else { break };
                if let Ok(index) = stripped[..close].parse::<usize>() {
                    segments.push(Segment::Index(index));
                }
                rest = &stripped[close + 1..];
            }
        } else {
            segments.push(Segment::Key(rest.to_string()));
        }
    }
    segments
}

/// Resolve a dotted path with optional array indices against a JSON value.
/// Returns `None` if any segment fails to resolve (missing key, index out
/// of bounds, or type mismatch) rather than erroring — callers treat a
/// missing field as `null` for comparison purposes.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in parse_path(path) {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(&key)?,
            Segment::Index(index) => current.as_array()?.get(index)?,
        };
    }
    Some(current)
}

/// Deep-set a dotted path, constructing intermediate objects (and, for a
/// leading numeric segment, arrays) when absent. Used by `json.set`.
pub fn set_path(root: &mut Value, path: &str, new_value: Value) {
    let segments = parse_path(path);
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        let is_last = i == segments.len() - 1;
        match segment {
            Segment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(serde_json::Map::new());
                }
                let obj = current.as_object_mut().unwrap();
                if is_last {
                    obj.insert(key.clone(), new_value);
                    return;
                }
                current = obj.entry(key.clone()).or_insert(Value::Null);
            }
            Segment::Index(index) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                let arr = current.as_array_mut().unwrap();
                while arr.len() <= *index {
                    arr.push(Value::Null);
                }
                if is_last {
                    arr[*index] = new_value;
                    return;
                }
                current = &mut arr[*index];
            }
        }
    }
}

/// A resolver that looks a `{{...}}` reference up; `resolve("x")` for a
/// bare variable name, `resolve("nodeId.field")` for a prior node output.
pub trait Resolver {
    fn resolve(&self, reference: &str) -> Option<Value>;
}

/// Substitute every `{{reference}}` occurrence in `template` via `resolver`.
/// A reference that doesn't resolve is left untouched (rather than
/// panicking or erroring) so partially-configured templates degrade
/// visibly instead of failing the whole node.
pub fn render_template(template: &str, resolver: &impl Resolver) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let reference = after_open[..end].trim();
        match resolver.resolve(reference) {
            Some(Value::String(s)) => out.push_str(&s),
            Some(other) => out.push_str(&other.to_string()),
            None => {
                out.push_str("{{");
                out.push_str(reference);
                out.push_str("}}");
            }
        }
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_key_path() {
        let data = json!({"user": {"name": "ada"}});
        assert_eq!(get_path(&data, "user.name"), Some(&json!("ada")));
    }

    #[test]
    fn resolves_array_index() {
        let data = json!({"users": [{"email": "a@x.com"}, {"email": "b@x.com"}]});
        assert_eq!(get_path(&data, "users[0].email"), Some(&json!("a@x.com")));
        assert_eq!(get_path(&data, "users[1].email"), Some(&json!("b@x.com")));
    }

    #[test]
    fn missing_path_is_none() {
        let data = json!({"a": 1});
        assert_eq!(get_path(&data, "a.b.c"), None);
        assert_eq!(get_path(&data, "users[5].email"), None);
    }

    #[test]
    fn set_path_builds_intermediate_objects() {
        let mut data = json!({});
        set_path(&mut data, "a.b.c", json!(42));
        assert_eq!(data, json!({"a": {"b": {"c": 42}}}));
    }

    #[test]
    fn set_path_builds_arrays() {
        let mut data = json!({});
        set_path(&mut data, "items[1].name", json!("x"));
        assert_eq!(data, json!({"items": [null, {"name": "x"}]}));
    }

    struct MapResolver(std::collections::HashMap<&'static str, Value>);
    impl Resolver for MapResolver {
        fn resolve(&self, reference: &str) -> Option<Value> {
            self.0.get(reference).cloned()
        }
    }

    #[test]
    fn renders_known_and_leaves_unknown_references() {
        let mut map = std::collections::HashMap::new();
        map.insert("name", json!("ada"));
        let resolver = MapResolver(map);
        let out = render_template("hello {{name}}, {{missing}}", &resolver);
        assert_eq!(out, "hello ada, {{missing}}");
    }
}
