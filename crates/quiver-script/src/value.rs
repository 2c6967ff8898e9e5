//! Runtime values.
//!
//! Containers use shared interior mutability so scripts get reference
//! semantics: pushing to a list held in two variables is visible through
//! both, which is what imperative plugin code expects. Values cross the
//! host boundary as JSON.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{json, Number};

use crate::ast::ClassDef;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<BTreeMap<String, Value>>>),
    /// An imported module binding. Inert: it exists so scripts can declare
    /// imports, which the policy layer inspects.
    Module(String),
    /// An instance of a script class.
    Instance(Rc<Instance>),
}

#[derive(Debug)]
pub struct Instance {
    pub class: Rc<ClassDef>,
    pub fields: RefCell<BTreeMap<String, Value>>,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    /// Script truthiness: null, false, zero, empty string/list/map are
    /// false; everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Map(entries) => !entries.borrow().is_empty(),
            Value::Module(_) | Value::Instance(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Module(_) => "module",
            Value::Instance(_) => "instance",
        }
    }

    /// Structural equality. Containers compare by contents.
    pub fn eq_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_value(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.eq_value(vb))
            }
            _ => false,
        }
    }

    /// Render for display and string concatenation.
    pub fn display(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Str(s) => s.clone(),
            Value::Module(name) => format!("<module {}>", name),
            Value::Instance(instance) => format!("<{} instance>", instance.class.name),
            other => other.to_json().to_string(),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Value::Int(v)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(v) => json!(v),
            Value::Float(v) => Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => json!(s),
            Value::List(items) => {
                serde_json::Value::Array(items.borrow().iter().map(|v| v.to_json()).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Module(name) => json!(format!("<module {}>", name)),
            Value::Instance(instance) => {
                json!(format!("<{} instance>", instance.class.name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_the_language_rules() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(!Value::list(vec![]).truthy());
        assert!(Value::Int(1).truthy());
        assert!(Value::Str("x".to_string()).truthy());
    }

    #[test]
    fn json_roundtrip_preserves_structure() {
        let original = json!({"a": [1, 2.5, "three"], "b": {"nested": true}, "c": null});
        let value = Value::from_json(&original);
        assert_eq!(value.to_json(), original);
    }

    #[test]
    fn mixed_numeric_equality() {
        assert!(Value::Int(2).eq_value(&Value::Float(2.0)));
        assert!(!Value::Int(2).eq_value(&Value::Float(2.5)));
    }
}
