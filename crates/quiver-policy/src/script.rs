//! Script validation: policy rules applied to a parsed plugin script.
//!
//! The parser already guarantees the top level holds only imports and class
//! definitions. This pass walks the whole tree and applies the active
//! policy set: imported modules against `module` rules, call targets
//! against `function` rules, and `binding.attr` accesses against
//! `attribute` rules.

use quiver_script::{Expr, Script, Stmt};

use crate::error::PolicyError;
use crate::rules::{PolicySet, RuleCategory, Verdict};

/// Validate a parsed script against the active policy set.
pub fn validate_script(script: &Script, policies: &PolicySet) -> Result<(), PolicyError> {
    for import in script.imports() {
        check(policies, RuleCategory::Module, &import.module, import.line)?;
    }

    for class in script.classes() {
        for method in &class.methods {
            walk_block(&method.body, policies)?;
        }
    }
    Ok(())
}

fn check(
    policies: &PolicySet,
    category: RuleCategory,
    name: &str,
    line: usize,
) -> Result<(), PolicyError> {
    match policies.check(category, name) {
        Verdict::Permitted => Ok(()),
        Verdict::Denied { pattern } => Err(PolicyError::Violation {
            category: category.as_str(),
            pattern,
            name: name.to_string(),
            line,
        }),
    }
}

fn walk_block(body: &[Stmt], policies: &PolicySet) -> Result<(), PolicyError> {
    for stmt in body {
        walk_stmt(stmt, policies)?;
    }
    Ok(())
}

fn walk_stmt(stmt: &Stmt, policies: &PolicySet) -> Result<(), PolicyError> {
    match stmt {
        Stmt::Let { value, .. } => walk_expr(value, policies),
        Stmt::Assign { target, value, .. } => {
            walk_expr(target, policies)?;
            walk_expr(value, policies)
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
            ..
        } => {
            walk_expr(cond, policies)?;
            walk_block(then_body, policies)?;
            walk_block(else_body, policies)
        }
        Stmt::For { iter, body, .. } => {
            walk_expr(iter, policies)?;
            walk_block(body, policies)
        }
        Stmt::While { cond, body, .. } => {
            walk_expr(cond, policies)?;
            walk_block(body, policies)
        }
        Stmt::Return { value, .. } => match value {
            Some(expr) => walk_expr(expr, policies),
            None => Ok(()),
        },
        Stmt::Break { .. } | Stmt::Continue { .. } => Ok(()),
        Stmt::Expr(expr) => walk_expr(expr, policies),
    }
}

fn walk_expr(expr: &Expr, policies: &PolicySet) -> Result<(), PolicyError> {
    match expr {
        Expr::Null | Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => Ok(()),
        Expr::Ident { .. } => Ok(()),
        Expr::List(items) => {
            for item in items {
                walk_expr(item, policies)?;
            }
            Ok(())
        }
        Expr::Map(entries) => {
            for (_, value) in entries {
                walk_expr(value, policies)?;
            }
            Ok(())
        }
        Expr::Index { obj, index, .. } => {
            walk_expr(obj, policies)?;
            walk_expr(index, policies)
        }
        Expr::Member { obj, name, line } => {
            if let Expr::Ident { name: root, .. } = obj.as_ref() {
                let dotted = format!("{}.{}", root, name);
                check(policies, RuleCategory::Attribute, &dotted, *line)?;
            }
            walk_expr(obj, policies)
        }
        Expr::Call { callee, args, line } => {
            if let Expr::Ident { name, .. } = callee.as_ref() {
                check(policies, RuleCategory::Function, name, *line)?;
            } else {
                walk_expr(callee, policies)?;
            }
            for arg in args {
                walk_expr(arg, policies)?;
            }
            Ok(())
        }
        Expr::Unary { expr, .. } => walk_expr(expr, policies),
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, policies)?;
            walk_expr(rhs, policies)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{PolicyRule, RuleAction};
    use quiver_script::parse;

    fn validate(src: &str, policies: &PolicySet) -> Result<(), PolicyError> {
        let script = parse(src).unwrap();
        validate_script(&script, policies)
    }

    #[test]
    fn clean_scripts_pass_the_defaults() {
        let src = r#"
class Greeter(Tool) {
    fn run(self, arguments) {
        return "Hello, " + str(arguments["name"]) + "!";
    }
}
"#;
        validate(src, &PolicySet::defaults()).unwrap();
    }

    #[test]
    fn denied_imports_are_rejected() {
        let src = r#"
import os.path;

class T(Tool) {
    fn run(self, arguments) { return null; }
}
"#;
        let err = validate(src, &PolicySet::defaults()).unwrap_err();
        match err {
            PolicyError::Violation {
                category, pattern, ..
            } => {
                assert_eq!(category, "module");
                assert_eq!(pattern, "os");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn denied_function_calls_are_rejected() {
        let src = r#"
class T(Tool) {
    fn run(self, arguments) {
        return eval("1 + 1");
    }
}
"#;
        let err = validate(src, &PolicySet::defaults()).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::Violation { category: "function", .. }
        ));
    }

    #[test]
    fn denied_attribute_access_is_rejected() {
        let src = r#"
import util;

class T(Tool) {
    fn run(self, arguments) {
        return util.shell("ls");
    }
}
"#;
        let policies = PolicySet::from_rules(vec![PolicyRule {
            action: RuleAction::Deny,
            category: RuleCategory::Attribute,
            pattern: "util.shell".to_string(),
        }]);
        let err = validate(src, &policies).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::Violation { category: "attribute", .. }
        ));
    }

    #[test]
    fn capability_methods_on_self_are_not_attribute_violations() {
        // self.log / self.call_tool are the capability surface, not
        // module attribute access; the defaults leave them alone.
        let src = r#"
class T(Tool) {
    fn run(self, arguments) {
        self.log("working");
        return self.context["persona"];
    }
}
"#;
        validate(src, &PolicySet::defaults()).unwrap();
    }
}
