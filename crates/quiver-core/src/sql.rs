//! Named-parameter rewriting.
//!
//! Quiver SQL uses `:name` placeholders throughout: in stored templates,
//! in registry queries, and in the audit writer. Drivers want positional
//! placeholders (`?` for SQLite, `$N` for Postgres), so every statement is
//! rewritten just before it is prepared, and the caller binds one value per
//! returned name, in order. Values never travel through string
//! interpolation.

use crate::config::database::Dialect;

/// Rewrite `:name` placeholders to the dialect's positional form.
///
/// Returns the rewritten SQL and the placeholder names in bind order (one
/// entry per occurrence; a name used twice appears twice). Placeholders
/// inside single-quoted string literals are left untouched, as is the
/// Postgres `::type` cast syntax.
pub fn rewrite_placeholders(sql: &str, dialect: Dialect) -> (String, Vec<String>) {
    let mut out = String::with_capacity(sql.len());
    let mut names = Vec::new();
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            in_string = !in_string;
            out.push(c);
            i += 1;
            continue;
        }
        if !in_string && c == ':' {
            // `::` is a cast, not a placeholder.
            if i + 1 < chars.len() && chars[i + 1] == ':' {
                out.push_str("::");
                i += 2;
                continue;
            }
            let prev_is_ident = i > 0 && (chars[i - 1].is_ascii_alphanumeric() || chars[i - 1] == '_');
            let next_starts_name = i + 1 < chars.len()
                && (chars[i + 1].is_ascii_alphabetic() || chars[i + 1] == '_');
            if !prev_is_ident && next_starts_name {
                let start = i + 1;
                let mut end = start;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                names.push(name);
                if dialect.uses_numbered_placeholders() {
                    out.push_str(&format!("${}", names.len()));
                } else {
                    out.push('?');
                }
                i = end;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }

    (out, names)
}

/// The distinct placeholder names appearing in a statement, in first-seen
/// order. Used to check an argument bag covers every placeholder.
pub fn placeholder_names(sql: &str) -> Vec<String> {
    let (_, occurrences) = rewrite_placeholders(sql, Dialect::Sqlite);
    let mut seen = Vec::new();
    for name in occurrences {
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_for_sqlite() {
        let (sql, names) = rewrite_placeholders(
            "SELECT * FROM t WHERE a = :a AND b = :b",
            Dialect::Sqlite,
        );
        assert_eq!(sql, "SELECT * FROM t WHERE a = ? AND b = ?");
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn rewrites_for_postgres_with_repeats() {
        let (sql, names) = rewrite_placeholders(
            "SELECT :x AS one, :x AS two",
            Dialect::Postgres,
        );
        assert_eq!(sql, "SELECT $1 AS one, $2 AS two");
        assert_eq!(names, vec!["x", "x"]);
    }

    #[test]
    fn leaves_strings_and_casts_alone() {
        let (sql, names) = rewrite_placeholders(
            "SELECT ':not_a_param', total::text FROM t WHERE x = :x",
            Dialect::Postgres,
        );
        assert_eq!(sql, "SELECT ':not_a_param', total::text FROM t WHERE x = $1");
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn distinct_names_in_first_seen_order() {
        let names = placeholder_names("WHERE a = :a AND b = :b AND a2 = :a");
        assert_eq!(names, vec!["a", "b"]);
    }
}
