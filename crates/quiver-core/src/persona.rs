//! Persona handling.
//!
//! A persona is a string namespace used to scope listing results for a
//! client. It is deliberately not an access-control boundary: a caller that
//! names both a tool and a persona explicitly can invoke across personas.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The persona carried in every call context. Defaults to `"default"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Persona(String);

impl Persona {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            Self::default()
        } else {
            Self(name)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Persona {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Persona {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_persona_falls_back_to_default() {
        assert_eq!(Persona::new("").as_str(), "default");
        assert_eq!(Persona::default().as_str(), "default");
    }

    #[test]
    fn persona_roundtrips_through_serde() {
        let p = Persona::new("analyst");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"analyst\"");
        let back: Persona = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
