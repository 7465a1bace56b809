//! Expression trees for audit rules
//!
//! Rules encode their checks as JSON trees:
//!
//! ```json
//! {
//!   "operator": "equals",
//!   "left": "$.assets.total",
//!   "right": { "operator": "add", "operands": ["$.liabilities.total", "$.equity.total"] },
//!   "tolerance": 0.01
//! }
//! ```
//!
//! Numbers are literals, `$.`-prefixed strings are path references into the
//! extracted data. A path that cannot be resolved evaluates to
//! [`Resolved::Unresolved`], which poisons any `add` it feeds and makes any
//! `equals` it feeds false. A figure of the wrong type (a boolean where a
//! number belongs) or a sum that overflows counts as unresolved too.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(f64),
    /// Dotted key path, stored without the leading `$`.
    Path(Vec<String>),
    Equals {
        left: Box<Expression>,
        right: Box<Expression>,
        tolerance: Option<f64>,
    },
    Add(Vec<Expression>),
    /// Operator not understood by this engine. Evaluates to unresolved.
    Unknown(String),
}

/// Outcome of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved {
    Number(f64),
    Bool(bool),
    Unresolved,
}

impl Resolved {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolved::Unresolved)
    }
}

/// Fault in the rule tree itself, independent of the data it reads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalFault {
    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
}

impl Expression {
    /// Decode a JSON node into an expression tree.
    pub fn from_json(node: &Value) -> Result<Self, String> {
        match node {
            Value::Number(n) => n
                .as_f64()
                .map(Expression::Literal)
                .ok_or_else(|| format!("unsupported numeric literal {}", n)),
            Value::String(s) => parse_path(s),
            Value::Object(obj) => parse_operator(obj),
            other => Err(format!("unsupported expression node: {}", other)),
        }
    }

    /// Human-readable rendering, e.g. `liabilities.total + equity.total`.
    pub fn describe(&self) -> String {
        match self {
            Expression::Literal(v) => format!("{}", v),
            Expression::Path(segments) => segments.join("."),
            Expression::Equals {
                left,
                right,
                tolerance,
            } => {
                let base = format!("{} = {}", left.describe(), right.describe());
                match tolerance {
                    Some(t) => format!("{} (±{})", base, t),
                    None => base,
                }
            }
            Expression::Add(operands) => operands
                .iter()
                .map(|op| match op {
                    Expression::Add(_) | Expression::Equals { .. } => format!("({})", op.describe()),
                    _ => op.describe(),
                })
                .collect::<Vec<_>>()
                .join(" + "),
            Expression::Unknown(op) => format!("{}(…)", op),
        }
    }

    /// Paths referenced by this tree that do not resolve to a number in `data`.
    pub fn missing_paths(&self, data: &Map<String, Value>) -> Vec<String> {
        let mut missing = Vec::new();
        self.collect_missing(data, &mut missing);
        missing
    }

    fn collect_missing(&self, data: &Map<String, Value>, out: &mut Vec<String>) {
        match self {
            Expression::Path(segments) => {
                if !matches!(resolve_path(segments, data), Resolved::Number(_)) {
                    let joined = segments.join(".");
                    if !out.contains(&joined) {
                        out.push(joined);
                    }
                }
            }
            Expression::Equals { left, right, .. } => {
                left.collect_missing(data, out);
                right.collect_missing(data, out);
            }
            Expression::Add(operands) => {
                for op in operands {
                    op.collect_missing(data, out);
                }
            }
            Expression::Literal(_) | Expression::Unknown(_) => {}
        }
    }
}

fn parse_path(raw: &str) -> Result<Expression, String> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("$.")
        .ok_or_else(|| format!("path reference must start with '$.': '{}'", raw))?;

    let segments: Vec<String> = body.split('.').map(|s| s.trim().to_string()).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(format!("path reference has an empty segment: '{}'", raw));
    }

    Ok(Expression::Path(segments))
}

fn parse_operator(obj: &Map<String, Value>) -> Result<Expression, String> {
    let operator = obj
        .get("operator")
        .and_then(Value::as_str)
        .ok_or_else(|| "expression object is missing 'operator'".to_string())?;

    match operator {
        "equals" => {
            let left = obj
                .get("left")
                .ok_or_else(|| "'equals' is missing 'left'".to_string())?;
            let right = obj
                .get("right")
                .ok_or_else(|| "'equals' is missing 'right'".to_string())?;

            let tolerance = match obj.get("tolerance") {
                None | Some(Value::Null) => None,
                Some(t) => match t.as_f64() {
                    Some(t) if t.is_finite() && t >= 0.0 => Some(t),
                    _ => return Err(format!("invalid tolerance: {}", t)),
                },
            };

            Ok(Expression::Equals {
                left: Box::new(Expression::from_json(left)?),
                right: Box::new(Expression::from_json(right)?),
                tolerance,
            })
        }
        "add" => {
            let operands = obj
                .get("operands")
                .and_then(Value::as_array)
                .ok_or_else(|| "'add' requires an 'operands' array".to_string())?;

            operands
                .iter()
                .map(Expression::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Expression::Add)
        }
        other => Ok(Expression::Unknown(other.to_string())),
    }
}

/// Evaluate `expr` against `data`. `default_tolerance` applies to any
/// `equals` node that does not carry its own.
pub fn evaluate(
    expr: &Expression,
    data: &Map<String, Value>,
    default_tolerance: f64,
) -> Result<Resolved, EvalFault> {
    eval_at(expr, data, default_tolerance, 0)
}

fn eval_at(
    expr: &Expression,
    data: &Map<String, Value>,
    default_tolerance: f64,
    depth: usize,
) -> Result<Resolved, EvalFault> {
    if depth > MAX_DEPTH {
        return Err(EvalFault::TooDeep(MAX_DEPTH));
    }

    match expr {
        Expression::Literal(v) => Ok(Resolved::Number(*v)),
        Expression::Path(segments) => Ok(resolve_path(segments, data)),
        Expression::Equals {
            left,
            right,
            tolerance,
        } => {
            let l = eval_at(left, data, default_tolerance, depth + 1)?;
            let r = eval_at(right, data, default_tolerance, depth + 1)?;
            let tolerance = tolerance.unwrap_or(default_tolerance);

            match (l, r) {
                (Resolved::Unresolved, _) | (_, Resolved::Unresolved) => Ok(Resolved::Bool(false)),
                (Resolved::Number(a), Resolved::Number(b)) => {
                    Ok(Resolved::Bool(within_tolerance(a, b, tolerance)))
                }
                (Resolved::Bool(a), Resolved::Bool(b)) => Ok(Resolved::Bool(a == b)),
                (Resolved::Number(_), Resolved::Bool(_)) | (Resolved::Bool(_), Resolved::Number(_)) => {
                    Ok(Resolved::Bool(false))
                }
            }
        }
        Expression::Add(operands) => {
            let mut sum = 0.0;
            let mut unresolved = false;

            for op in operands {
                match eval_at(op, data, default_tolerance, depth + 1)? {
                    Resolved::Number(v) => sum += v,
                    Resolved::Unresolved | Resolved::Bool(_) => unresolved = true,
                }
            }

            if unresolved || !sum.is_finite() {
                Ok(Resolved::Unresolved)
            } else {
                Ok(Resolved::Number(sum))
            }
        }
        Expression::Unknown(op) => {
            warn!(operator = %op, "Unknown rule operator, treating as unresolved");
            Ok(Resolved::Unresolved)
        }
    }
}

/// `|a - b| <= tolerance`, with a few ULPs of slack so that decimal inputs
/// like `1.00` vs `1.01` sit on the inclusive boundary.
fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    let slack = f64::EPSILON * 4.0 * a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= tolerance + slack
}

fn resolve_path(segments: &[String], data: &Map<String, Value>) -> Resolved {
    let Some((first, rest)) = segments.split_first() else {
        return Resolved::Unresolved;
    };

    let mut current = match data.get(first) {
        Some(v) => v,
        None => return Resolved::Unresolved,
    };

    for segment in rest {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Resolved::Unresolved,
        }
    }

    coerce_leaf(current)
}

fn coerce_leaf(value: &Value) -> Resolved {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Resolved::Number)
            .unwrap_or(Resolved::Unresolved),
        Value::Bool(b) => Resolved::Bool(*b),
        Value::String(s) => s
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Resolved::Number)
            .unwrap_or(Resolved::Unresolved),
        _ => Resolved::Unresolved,
    }
}
