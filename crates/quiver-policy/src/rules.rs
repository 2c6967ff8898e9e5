//! Policy rules and the active policy set.

use serde::{Deserialize, Serialize};

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

/// What a pattern matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Module,
    Function,
    Attribute,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Module => "module",
            RuleCategory::Function => "function",
            RuleCategory::Attribute => "attribute",
        }
    }
}

/// One active policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub action: RuleAction,
    pub category: RuleCategory,
    pub pattern: String,
}

impl PolicyRule {
    pub fn deny(category: RuleCategory, pattern: &str) -> Self {
        Self {
            action: RuleAction::Deny,
            category,
            pattern: pattern.to_string(),
        }
    }

    pub fn allow(category: RuleCategory, pattern: &str) -> Self {
        Self {
            action: RuleAction::Allow,
            category,
            pattern: pattern.to_string(),
        }
    }
}

/// The verdict of checking a name against the active set.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Permitted,
    /// Denied, with the pattern that matched (or the allow-list marker).
    Denied { pattern: String },
}

/// The active policy set.
///
/// An empty stored set means the built-in defaults apply; a non-empty set
/// replaces the defaults entirely. Deny always shadows allow on the same
/// `(category, pattern)`, and in fact on any match at all: a name matching
/// both an allow and a deny rule is denied.
#[derive(Debug, Clone)]
pub struct PolicySet {
    rules: Vec<PolicyRule>,
}

/// Modules granting OS, subprocess, dynamic-import, serialization, or
/// filesystem access. Denied by default.
const DEFAULT_DENY_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "socket",
    "shutil",
    "pickle",
    "marshal",
    "ctypes",
    "importlib",
    "pathlib",
];

/// Dynamic evaluation, arbitrary file I/O, interactive input, interpreter
/// exit, dynamic import. Denied by default.
const DEFAULT_DENY_FUNCTIONS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "open",
    "input",
    "exit",
    "quit",
    "__import__",
];

/// `module.method` accesses denied by default.
const DEFAULT_DENY_ATTRIBUTES: &[&str] = &[
    "os.system",
    "os.popen",
    "subprocess.run",
    "subprocess.Popen",
    "sys.modules",
];

impl PolicySet {
    /// The built-in default deny lists.
    pub fn defaults() -> Self {
        let mut rules = Vec::new();
        for pattern in DEFAULT_DENY_MODULES {
            rules.push(PolicyRule::deny(RuleCategory::Module, pattern));
        }
        for pattern in DEFAULT_DENY_FUNCTIONS {
            rules.push(PolicyRule::deny(RuleCategory::Function, pattern));
        }
        for pattern in DEFAULT_DENY_ATTRIBUTES {
            rules.push(PolicyRule::deny(RuleCategory::Attribute, pattern));
        }
        Self { rules }
    }

    /// Build the active set: stored rules when any exist, defaults
    /// otherwise.
    pub fn from_rules(rules: Vec<PolicyRule>) -> Self {
        if rules.is_empty() {
            Self::defaults()
        } else {
            Self { rules }
        }
    }

    /// Check a name against a category. Deny wins over allow; when the
    /// category carries any allow rules, names matching none of them are
    /// denied too.
    pub fn check(&self, category: RuleCategory, name: &str) -> Verdict {
        let in_category = || self.rules.iter().filter(|r| r.category == category);

        for rule in in_category() {
            if rule.action == RuleAction::Deny && Self::matches(category, &rule.pattern, name) {
                return Verdict::Denied {
                    pattern: rule.pattern.clone(),
                };
            }
        }

        let mut has_allow = false;
        for rule in in_category() {
            if rule.action == RuleAction::Allow {
                has_allow = true;
                if Self::matches(category, &rule.pattern, name) {
                    return Verdict::Permitted;
                }
            }
        }
        if has_allow {
            return Verdict::Denied {
                pattern: "<not in allow list>".to_string(),
            };
        }
        Verdict::Permitted
    }

    /// Module patterns match the full dotted path or any ancestor of it;
    /// other categories match exactly.
    fn matches(category: RuleCategory, pattern: &str, name: &str) -> bool {
        if pattern == name {
            return true;
        }
        if category == RuleCategory::Module {
            return name.starts_with(pattern)
                && name[pattern.len()..].starts_with('.');
        }
        false
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deny_dangerous_modules() {
        let set = PolicySet::defaults();
        assert!(matches!(
            set.check(RuleCategory::Module, "os"),
            Verdict::Denied { .. }
        ));
        assert!(matches!(
            set.check(RuleCategory::Module, "os.path"),
            Verdict::Denied { .. }
        ));
        assert_eq!(set.check(RuleCategory::Module, "math"), Verdict::Permitted);
    }

    #[test]
    fn empty_rule_set_falls_back_to_defaults() {
        let set = PolicySet::from_rules(vec![]);
        assert!(matches!(
            set.check(RuleCategory::Function, "eval"),
            Verdict::Denied { .. }
        ));
    }

    #[test]
    fn explicit_rules_replace_defaults() {
        let set = PolicySet::from_rules(vec![PolicyRule::deny(RuleCategory::Module, "requests")]);
        // "os" is no longer denied: the explicit set replaced the defaults.
        assert_eq!(set.check(RuleCategory::Module, "os"), Verdict::Permitted);
        assert!(matches!(
            set.check(RuleCategory::Module, "requests"),
            Verdict::Denied { .. }
        ));
    }

    #[test]
    fn deny_shadows_allow_on_the_same_pattern() {
        let set = PolicySet::from_rules(vec![
            PolicyRule::allow(RuleCategory::Module, "util"),
            PolicyRule::deny(RuleCategory::Module, "util"),
        ]);
        assert!(matches!(
            set.check(RuleCategory::Module, "util"),
            Verdict::Denied { .. }
        ));
    }

    #[test]
    fn allow_list_rejects_everything_else() {
        let set = PolicySet::from_rules(vec![PolicyRule::allow(RuleCategory::Module, "util")]);
        assert_eq!(set.check(RuleCategory::Module, "util"), Verdict::Permitted);
        assert!(matches!(
            set.check(RuleCategory::Module, "anything_else"),
            Verdict::Denied { .. }
        ));
    }

    #[test]
    fn prefix_matching_requires_a_dot_boundary() {
        let set = PolicySet::from_rules(vec![PolicyRule::deny(RuleCategory::Module, "os")]);
        assert_eq!(
            set.check(RuleCategory::Module, "oslo_config"),
            Verdict::Permitted
        );
    }
}
