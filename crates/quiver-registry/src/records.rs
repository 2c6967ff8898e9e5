//! Record types for the registry tables.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use quiver_core::Persona;
use quiver_store::Digest;

use crate::error::RegistryError;

/// A registered tool. Keyed by `(name, persona)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecord {
    pub name: String,
    pub persona: Persona,
    pub description: String,
    /// JSON-Schema-shaped object describing the argument bag.
    pub input_schema: Value,
    pub artifact_digest: Digest,
    /// True when a meta-tool wrote this row; false for seeded/spec rows.
    pub is_auto_created: bool,
    /// Namespacing prefix used for listing order ("system", "general", …).
    pub group: String,
    pub manual: Option<ToolManual>,
}

/// Structured operator documentation attached to a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolManual {
    #[serde(default)]
    pub usage_guide: String,
    #[serde(default)]
    pub examples: Vec<ManualExample>,
    #[serde(default)]
    pub pitfalls: Vec<String>,
    #[serde(default)]
    pub error_codes: Vec<String>,
}

/// A worked example inside a tool manual. `verified` is maintained by the
/// verifier meta-tool and reset whenever the example changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualExample {
    pub input: Value,
    /// Substring expected in the rendered result.
    #[serde(default)]
    pub expect: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

/// A registered resource. Keyed by `(uri, persona)`.
///
/// Exactly one of `static_body` and `artifact_digest` is populated: static
/// resources return their body verbatim, dynamic ones execute an artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub uri: String,
    pub persona: Persona,
    pub name: String,
    pub description: String,
    pub mime_type: String,
    pub is_dynamic: bool,
    pub static_body: Option<String>,
    pub artifact_digest: Option<Digest>,
    pub group: String,
}

impl ResourceRecord {
    /// Enforce the static-xor-dynamic shape.
    pub fn check_shape(&self) -> Result<(), RegistryError> {
        let ok = if self.is_dynamic {
            self.artifact_digest.is_some() && self.static_body.is_none()
        } else {
            self.static_body.is_some() && self.artifact_digest.is_none()
        };
        if ok {
            Ok(())
        } else {
            Err(RegistryError::ResourceShape {
                uri: self.uri.clone(),
            })
        }
    }
}

/// A registered prompt template. Keyed by `(name, persona)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRecord {
    pub name: String,
    pub persona: Persona,
    pub description: String,
    /// Template text with `{name}` placeholders.
    pub template: String,
    pub arguments: Vec<PromptArgument>,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// A reusable template macro. The active set is concatenated into the macro
/// prelude prepended to every SQL render.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroRecord {
    pub name: String,
    pub description: String,
    /// A single self-contained `{% macro %}…{% endmacro %}` block.
    pub template: String,
    pub is_active: bool,
}

/// Icon formats accepted by the icon registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconFormat {
    Svg,
    Png,
}

impl IconFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            IconFormat::Svg => "svg",
            IconFormat::Png => "png",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        match s {
            "svg" => Ok(IconFormat::Svg),
            "png" => Ok(IconFormat::Png),
            other => Err(RegistryError::UnknownValue {
                column: "format".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IconRecord {
    pub name: String,
    pub format: IconFormat,
    pub body_base64: String,
}

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyRuleType {
    Allow,
    Deny,
}

impl PolicyRuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyRuleType::Allow => "allow",
            PolicyRuleType::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        match s {
            "allow" => Ok(PolicyRuleType::Allow),
            "deny" => Ok(PolicyRuleType::Deny),
            other => Err(RegistryError::UnknownValue {
                column: "rule_type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// What a policy pattern matches against in a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyCategory {
    Module,
    Function,
    Attribute,
}

impl PolicyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyCategory::Module => "module",
            PolicyCategory::Function => "function",
            PolicyCategory::Attribute => "attribute",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        match s {
            "module" => Ok(PolicyCategory::Module),
            "function" => Ok(PolicyCategory::Function),
            "attribute" => Ok(PolicyCategory::Attribute),
            other => Err(RegistryError::UnknownValue {
                column: "category".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// One stored security policy row. An empty active set means the built-in
/// defaults apply; a non-empty set replaces the defaults entirely, with
/// deny shadowing allow on identical `(category, pattern)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityPolicyRecord {
    pub id: Option<i64>,
    pub rule_type: PolicyRuleType,
    pub category: PolicyCategory,
    pub pattern: String,
    pub is_active: bool,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_shape_static() {
        let record = ResourceRecord {
            uri: "memo://notes".to_string(),
            persona: Persona::default(),
            name: "Notes".to_string(),
            description: "project notes".to_string(),
            mime_type: "text/plain".to_string(),
            is_dynamic: false,
            static_body: Some("hello".to_string()),
            artifact_digest: None,
            group: "general".to_string(),
        };
        record.check_shape().unwrap();
    }

    #[test]
    fn resource_shape_rejects_both_populated() {
        let record = ResourceRecord {
            uri: "memo://broken".to_string(),
            persona: Persona::default(),
            name: "Broken".to_string(),
            description: String::new(),
            mime_type: "text/plain".to_string(),
            is_dynamic: false,
            static_body: Some("hello".to_string()),
            artifact_digest: Some(Digest::of("SELECT 1")),
            group: "general".to_string(),
        };
        assert!(record.check_shape().is_err());
    }

    #[test]
    fn manual_roundtrips_through_json() {
        let manual = ToolManual {
            usage_guide: "call it".to_string(),
            examples: vec![ManualExample {
                input: serde_json::json!({"name": "World"}),
                expect: Some("Hello".to_string()),
                verified: false,
            }],
            pitfalls: vec!["don't".to_string()],
            error_codes: vec![],
        };
        let text = serde_json::to_string(&manual).unwrap();
        let back: ToolManual = serde_json::from_str(&text).unwrap();
        assert_eq!(back, manual);
    }
}
