//! `code` node — a constrained expression evaluator, not a general-purpose
//! JavaScript/Python sandbox.
//!
//! Embedding `rhai`/`boa`/`rustpython` would pull in a dependency none of
//! the reference repos use for this kind of thing, so `code` here supports
//! a small arithmetic/string expression grammar over `input.*` dotted
//! paths — enough to cover simple transform scripts, not arbitrary user
//! code. `language` is still validated against the configured set so a
//! workflow authored against a richer runtime fails loudly instead of
//! silently mis-evaluating.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::expr::get_path;
use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct CodeParams {
    code: String,
    language: String,
}

pub struct CodeNode;

#[async_trait]
impl ExecutableNode for CodeNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: CodeParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid code parameters: {e}")))?;

        if !matches!(params.language.as_str(), "javascript" | "python") {
            return Err(NodeError::Fatal(format!("unsupported code language '{}'", params.language)));
        }

        let mut parser = ExprParser::new(&params.code);
        let result = parser
            .parse_expression()
            .map_err(NodeError::Fatal)?
            .evaluate(&input)
            .map_err(NodeError::Fatal)?;

        if ctx.is_expired() {
            return Err(NodeError::Timeout);
        }
        Ok(json!({ "result": result }))
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Path(String),
    BinOp(Box<Expr>, char, Box<Expr>),
}

impl Expr {
    fn evaluate(&self, input: &Value) -> Result<Value, String> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(path) => {
                let scoped = path.strip_prefix("input.").unwrap_or(path);
                Ok(get_path(input, scoped).cloned().unwrap_or(Value::Null))
            }
            Expr::BinOp(lhs, op, rhs) => {
                let l = lhs.evaluate(input)?;
                let r = rhs.evaluate(input)?;
                apply_op(&l, *op, &r)
            }
        }
    }
}

fn apply_op(l: &Value, op: char, r: &Value) -> Result<Value, String> {
    if op == '+' {
        if let (Some(a), Some(b)) = (l.as_str(), r.as_str()) {
            return Ok(json!(format!("{a}{b}")));
        }
    }
    let a = l.as_f64().ok_or_else(|| format!("'{l}' is not numeric"))?;
    let b = r.as_f64().ok_or_else(|| format!("'{r}' is not numeric"))?;
    let result = match op {
        '+' => a + b,
        '-' => a - b,
        '*' => a * b,
        '/' => {
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            a / b
        }
        _ => return Err(format!("unsupported operator '{op}'")),
    };
    Ok(json!(result))
}

/// Tiny recursive-descent parser: `term (('+' | '-') term)*`,
/// `term := factor (('*' | '/') factor)*`, `factor := literal | path | '(' expr ')'`.
struct ExprParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> ExprParser<'a> {
    fn new(source: &'a str) -> Self {
        Self { chars: source.trim().chars().peekable() }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, String> {
        let mut node = self.parse_term()?;
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some('+') | Some('-') => {
                    let op = self.chars.next().unwrap();
                    let rhs = self.parse_term()?;
                    node = Expr::BinOp(Box::new(node), op, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut node = self.parse_factor()?;
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some('*') | Some('/') => {
                    let op = self.chars.next().unwrap();
                    let rhs = self.parse_factor()?;
                    node = Expr::BinOp(Box::new(node), op, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_factor(&mut self) -> Result<Expr, String> {
        self.skip_ws();
        match self.chars.peek() {
            Some('(') => {
                self.chars.next();
                let inner = self.parse_expression()?;
                self.skip_ws();
                if self.chars.next() != Some(')') {
                    return Err("expected closing ')'".to_string());
                }
                Ok(inner)
            }
            Some('"') => self.parse_string_literal(),
            Some(c) if c.is_ascii_digit() || *c == '-' => self.parse_number_literal(),
            Some(c) if c.is_alphabetic() || *c == '_' => self.parse_path(),
            Some(other) => Err(format!("unexpected character '{other}'")),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_string_literal(&mut self) -> Result<Expr, String> {
        self.chars.next();
        let mut s = String::new();
        for c in self.chars.by_ref() {
            if c == '"' {
                return Ok(Expr::Literal(json!(s)));
            }
            s.push(c);
        }
        Err("unterminated string literal".to_string())
    }

    fn parse_number_literal(&mut self) -> Result<Expr, String> {
        let mut s = String::new();
        if self.chars.peek() == Some(&'-') {
            s.push(self.chars.next().unwrap());
        }
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
            s.push(self.chars.next().unwrap());
        }
        s.parse::<f64>()
            .map(|n| Expr::Literal(json!(n)))
            .map_err(|_| format!("invalid number literal '{s}'"))
    }

    fn parse_path(&mut self) -> Result<Expr, String> {
        let mut s = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']')) {
            s.push(self.chars.next().unwrap());
        }
        match s.as_str() {
            "true" => Ok(Expr::Literal(json!(true))),
            "false" => Ok(Expr::Literal(json!(false))),
            "null" => Ok(Expr::Literal(Value::Null)),
            _ => Ok(Expr::Path(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CancellationToken;
    use chrono::Utc;
    use std::collections::HashMap;

    fn ctx(code: &str, language: &str) -> ExecutionContext {
        ExecutionContext {
            workflow_id: uuid::Uuid::new_v4(),
            execution_id: uuid::Uuid::new_v4(),
            node_id: "c1".into(),
            parameters: json!({ "code": code, "language": language }),
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn evaluates_arithmetic_over_input_fields() {
        let input = json!({"a": 2, "b": 3});
        let out = CodeNode.execute(input, &ctx("input.a + input.b * 2", "javascript")).await.unwrap();
        assert_eq!(out["result"], json!(8.0));
    }

    #[tokio::test]
    async fn rejects_unsupported_language() {
        let err = CodeNode.execute(Value::Null, &ctx("1", "ruby")).await.unwrap_err();
        assert!(matches!(err, NodeError::Fatal(_)));
    }
}
