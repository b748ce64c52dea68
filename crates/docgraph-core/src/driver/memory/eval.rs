//! Expression evaluation with AQL comparison semantics.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use serde_json::Value as Json;

use super::aql::{CompareOp, Expr};
use crate::driver::{DriverError, DriverResult};
use crate::value::Document;

/// Variables visible to an expression.
pub(super) struct Scope<'a> {
    bind_vars: &'a Document,
    vars: FxHashMap<String, Json>,
}

impl<'a> Scope<'a> {
    pub(super) fn new(bind_vars: &'a Document) -> Self {
        Self {
            bind_vars,
            vars: FxHashMap::default(),
        }
    }

    pub(super) fn set(&mut self, name: &str, value: Json) {
        self.vars.insert(name.to_string(), value);
    }

    pub(super) fn eval(&self, expr: &Expr) -> DriverResult<Json> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Bind(name) => self.bind_vars.get(name).cloned().ok_or_else(|| {
                DriverError::BindParameter(format!("bind parameter '@{name}' is not set"))
            }),
            Expr::Path(segments) => {
                let (head, rest) = segments.split_first().ok_or_else(|| query("empty path"))?;
                let mut current = self
                    .vars
                    .get(head)
                    .ok_or_else(|| query(format!("variable '{head}' is not defined")))?;
                for segment in rest {
                    match current.get(segment) {
                        Some(next) => current = next,
                        None => return Ok(Json::Null),
                    }
                }
                Ok(current.clone())
            }
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<DriverResult<Vec<_>>>()
                .map(Json::Array),
            Expr::Object(entries) => {
                let mut out = serde_json::Map::new();
                for (key, value) in entries {
                    out.insert(key.clone(), self.eval(value)?);
                }
                Ok(Json::Object(out))
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<DriverResult<Vec<_>>>()?;
                call(name, &args)
            }
            Expr::Compare(left, op, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(Json::Bool(compare_op(&l, *op, &r)))
            }
            Expr::And(left, right) => {
                if !truthy(&self.eval(left)?) {
                    return Ok(Json::Bool(false));
                }
                Ok(Json::Bool(truthy(&self.eval(right)?)))
            }
            Expr::Or(left, right) => {
                if truthy(&self.eval(left)?) {
                    return Ok(Json::Bool(true));
                }
                Ok(Json::Bool(truthy(&self.eval(right)?)))
            }
            Expr::Not(inner) => Ok(Json::Bool(!truthy(&self.eval(inner)?))),
        }
    }

    /// Evaluates every filter; true if all pass.
    pub(super) fn passes(&self, filters: &[Expr]) -> DriverResult<bool> {
        for filter in filters {
            if !truthy(&self.eval(filter)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn query(message: impl Into<String>) -> DriverError {
    DriverError::Query {
        message: message.into(),
        position: None,
    }
}

/// AQL truthiness: null, false, 0 and "" are false; arrays and objects
/// are always true.
pub(super) fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(_) | Json::Object(_) => true,
    }
}

fn type_rank(value: &Json) -> u8 {
    match value {
        Json::Null => 0,
        Json::Bool(_) => 1,
        Json::Number(_) => 2,
        Json::String(_) => 3,
        Json::Array(_) => 4,
        Json::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array <
/// object, then by value.
pub(super) fn compare(a: &Json, b: &Json) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Json::Bool(x), Json::Bool(y)) => x.cmp(y),
        (Json::Number(x), Json::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Json::String(x), Json::String(y)) => x.cmp(y),
        (Json::Array(x), Json::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Json::Object(x), Json::Object(y)) => {
            let mut xk: Vec<&String> = x.keys().collect();
            let mut yk: Vec<&String> = y.keys().collect();
            xk.sort_unstable();
            yk.sort_unstable();
            let keys = xk.cmp(&yk);
            if keys != Ordering::Equal {
                return keys;
            }
            for k in xk {
                let ord = compare(&x[k], &y[k]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }
        _ => Ordering::Equal,
    }
}

fn compare_op(left: &Json, op: CompareOp, right: &Json) -> bool {
    match op {
        CompareOp::Eq => compare(left, right) == Ordering::Equal,
        CompareOp::Ne => compare(left, right) != Ordering::Equal,
        CompareOp::Lt => compare(left, right) == Ordering::Less,
        CompareOp::Le => compare(left, right) != Ordering::Greater,
        CompareOp::Gt => compare(left, right) == Ordering::Greater,
        CompareOp::Ge => compare(left, right) != Ordering::Less,
        CompareOp::In => match right {
            Json::Array(items) => items.iter().any(|i| compare(left, i) == Ordering::Equal),
            _ => false,
        },
        CompareOp::NotIn => match right {
            Json::Array(items) => !items.iter().any(|i| compare(left, i) == Ordering::Equal),
            _ => true,
        },
    }
}

fn document_id(value: &Json) -> Option<&str> {
    match value {
        Json::String(id) => Some(id),
        Json::Object(doc) => doc.get("_id").and_then(Json::as_str),
        _ => None,
    }
}

fn call(name: &str, args: &[Json]) -> DriverResult<Json> {
    match name {
        "KEEP" => {
            let Some((doc, rest)) = args.split_first() else {
                return Err(query("KEEP expects a document"));
            };
            let Json::Object(doc) = doc else {
                return Ok(Json::Null);
            };
            let names: Vec<&str> = match rest {
                [Json::Array(list)] => list.iter().filter_map(Json::as_str).collect(),
                other => other.iter().filter_map(Json::as_str).collect(),
            };
            let kept = doc
                .iter()
                .filter(|(k, _)| names.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Ok(Json::Object(kept))
        }
        "IS_SAME_COLLECTION" => {
            let [collection, target] = args else {
                return Err(query("IS_SAME_COLLECTION expects two arguments"));
            };
            let collection = match collection {
                Json::String(c) => c.as_str(),
                _ => return Ok(Json::Bool(false)),
            };
            let same = document_id(target)
                .and_then(|id| id.split_once('/'))
                .is_some_and(|(c, _)| c == collection);
            Ok(Json::Bool(same))
        }
        "HAS" => {
            let [doc, attr] = args else {
                return Err(query("HAS expects two arguments"));
            };
            let has = match (doc, attr) {
                (Json::Object(d), Json::String(a)) => d.contains_key(a),
                _ => false,
            };
            Ok(Json::Bool(has))
        }
        "LENGTH" => {
            let [value] = args else {
                return Err(query("LENGTH expects one argument"));
            };
            let len = match value {
                Json::Null => 0,
                Json::Bool(b) => usize::from(*b),
                Json::Number(n) => n.to_string().len(),
                Json::String(s) => s.chars().count(),
                Json::Array(items) => items.len(),
                Json::Object(map) => map.len(),
            };
            Ok(Json::from(len))
        }
        other => Err(query(format!("unknown function {other}()"))),
    }
}
