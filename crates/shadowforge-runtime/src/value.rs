//! The dynamically-typed value a variable cell holds at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tagged-variant runtime value. Function-block instances are a distinct
/// variant carrying their handler dispatch key (§9 Design Notes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Array(Vec<Value>),
    FbInstance(FbInstance),
}

/// A function-block instance record; persists between scan cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbInstance {
    pub fb_type: String,
    pub q: bool,
    pub et: i64,
    /// Extra handler-private state (e.g. the previous edge value for
    /// `R_TRIG`/`F_TRIG`, or `start_ms` for timers).
    pub state: HashMap<String, Value>,
}

impl FbInstance {
    pub fn new(fb_type: impl Into<String>) -> Self {
        Self {
            fb_type: fb_type.into(),
            q: false,
            et: 0,
            state: HashMap::new(),
        }
    }
}

impl Value {
    /// `defaultForType` from §4.2: the zero value for a declared type name.
    /// Unknown type names are assumed to be function-block instances.
    pub fn default_for_type(type_name: &str) -> Value {
        match type_name.to_ascii_uppercase().as_str() {
            "BOOL" => Value::Bool(false),
            "INT" | "DINT" => Value::Int(0),
            "REAL" | "LREAL" => Value::Real(0.0),
            "STRING" => Value::Str(String::new()),
            "TIME" => Value::Int(0),
            other => Value::FbInstance(FbInstance::new(other)),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::FbInstance(fb) => fb.q,
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Value::Bool(b) => *b as i64,
            Value::Int(i) => *i,
            Value::Real(r) => *r as i64,
            Value::Str(s) => s.parse().unwrap_or(0),
            Value::Array(_) | Value::FbInstance(_) => 0,
        }
    }

    pub fn as_real(&self) -> f64 {
        match self {
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Int(i) => *i as f64,
            Value::Real(r) => *r,
            Value::Str(s) => s.parse().unwrap_or(0.0),
            Value::Array(_) | Value::FbInstance(_) => 0.0,
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Str(s) => s.clone(),
            Value::Array(_) => "<array>".to_string(),
            Value::FbInstance(fb) => format!("<{}>", fb.fb_type),
        }
    }

    /// Coerce `self` into the shape of `target`, per the §4.2 assignment
    /// rules: BOOL via truthiness, INT via truncation, REAL via float
    /// cast, STRING via string conversion; other types pass through.
    pub fn coerce_to(&self, target: &Value) -> Value {
        match target {
            Value::Bool(_) => Value::Bool(self.as_bool()),
            Value::Int(_) => Value::Int(self.as_int()),
            Value::Real(_) => Value::Real(self.as_real()),
            Value::Str(_) => Value::Str(self.as_string()),
            Value::Array(_) | Value::FbInstance(_) => self.clone(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}
