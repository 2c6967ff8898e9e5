//! SQL validation: read-only, single-statement, policy-fixed keyword set.
//!
//! Checks operate on significant tokens after comment stripping; string
//! literal contents are never tokens, so `SELECT 'DROP'` passes while
//! `SELECT 1; DROP TABLE t` does not. `:name` placeholders are not
//! interpreted here; binding happens at execution.

use crate::error::PolicyError;

/// Keywords that may not appear as significant tokens in a read statement:
/// data modification, data definition, privilege control, and procedure
/// execution.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE", "DROP", "ALTER", "CREATE", "TRUNCATE",
    "GRANT", "REVOKE", "EXEC", "EXECUTE", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX",
];

const DDL_KEYWORDS: &[&str] = &["CREATE", "ALTER", "DROP", "TRUNCATE"];

/// Remove `--` line comments and `/* */` block comments, preserving string
/// literals.
pub fn strip_comments(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\'' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '-' if i + 1 < chars.len() && chars[i + 1] == '-' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i = std::cmp::min(i + 2, chars.len());
                out.push(' ');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Significant word tokens, uppercased, with string literals skipped.
fn word_tokens(sql: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                i += 1;
            }
            i += 1;
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(word.to_ascii_uppercase());
            continue;
        }
        i += 1;
    }
    tokens
}

/// Reject statements with an interior semicolon. A trailing terminator is
/// tolerated.
pub fn validate_single_statement(sql: &str) -> Result<(), PolicyError> {
    let stripped = strip_comments(sql);
    let trimmed = stripped.trim_end().trim_end_matches(';');

    let chars: Vec<char> = trimmed.chars().collect();
    let mut in_string = false;
    for &c in &chars {
        if c == '\'' {
            in_string = !in_string;
        } else if c == ';' && !in_string {
            return Err(PolicyError::MultipleStatements);
        }
    }
    Ok(())
}

/// Validate a rendered statement as a single read-only SELECT.
pub fn validate_select(sql: &str) -> Result<(), PolicyError> {
    validate_single_statement(sql)?;
    let stripped = strip_comments(sql);
    let tokens = word_tokens(&stripped);

    let first = tokens.first().ok_or(PolicyError::EmptyStatement)?;
    if first != "SELECT" && first != "WITH" {
        return Err(PolicyError::NotReadOnly {
            keyword: first.clone(),
        });
    }

    for token in &tokens {
        if FORBIDDEN_KEYWORDS.contains(&token.as_str()) {
            return Err(PolicyError::NotReadOnly {
                keyword: token.clone(),
            });
        }
    }
    Ok(())
}

/// DDL mode, used only by the DDL meta-tool: single statement whose first
/// token is a DDL verb.
pub fn validate_ddl(sql: &str) -> Result<(), PolicyError> {
    validate_single_statement(sql)?;
    let stripped = strip_comments(sql);
    let tokens = word_tokens(&stripped);
    let first = tokens.first().ok_or(PolicyError::EmptyStatement)?;
    if !DDL_KEYWORDS.contains(&first.as_str()) {
        return Err(PolicyError::NotDdl);
    }
    Ok(())
}

/// Relaxed pre-check for template bodies at creation time. Template tags
/// are blanked before checking, since the body is not yet rendered; the
/// full [`validate_select`] runs on every rendered dispatch.
pub fn validate_select_template(body: &str) -> Result<(), PolicyError> {
    let without_tags = blank_template_tags(body);
    validate_select(&without_tags)
}

/// Replace `{% … %}` and `{{ … }}` spans with spaces.
fn blank_template_tags(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' && i + 1 < chars.len() && (chars[i + 1] == '%' || chars[i + 1] == '{')
        {
            let closer = if chars[i + 1] == '%' { '%' } else { '}' };
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == closer && chars[i + 1] == '}') {
                i += 1;
            }
            i = std::cmp::min(i + 2, chars.len());
            out.push(' ');
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}
