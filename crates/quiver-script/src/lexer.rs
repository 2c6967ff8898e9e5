//! Tokenizer for the script language.

use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals and identifiers
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    // Keywords
    Import,
    As,
    Class,
    Fn,
    Let,
    If,
    Else,
    For,
    In,
    While,
    Return,
    Break,
    Continue,
    True,
    False,
    Null,

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semi,
    Colon,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,

    Eof,
}

/// A token plus the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Tokenize a script source. `#` starts a comment running to end of line.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, ScriptError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            ' ' | '\t' | '\r' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start_line = line;
                let mut text = String::new();
                i += 1;
                loop {
                    if i >= chars.len() {
                        return Err(ScriptError::InvalidStructure {
                            line: start_line,
                            message: "unterminated string literal".to_string(),
                        });
                    }
                    let ch = chars[i];
                    if ch == quote {
                        i += 1;
                        break;
                    }
                    if ch == '\\' && i + 1 < chars.len() {
                        let escaped = chars[i + 1];
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '\\' => '\\',
                            '\'' => '\'',
                            '"' => '"',
                            other => other,
                        });
                        i += 2;
                        continue;
                    }
                    if ch == '\n' {
                        line += 1;
                    }
                    text.push(ch);
                    i += 1;
                }
                tokens.push(Spanned {
                    token: Token::Str(text),
                    line: start_line,
                });
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut is_float = false;
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let token = if is_float {
                    Token::Float(text.parse().map_err(|_| ScriptError::InvalidStructure {
                        line,
                        message: format!("invalid number literal '{}'", text),
                    })?)
                } else {
                    Token::Int(text.parse().map_err(|_| ScriptError::InvalidStructure {
                        line,
                        message: format!("invalid number literal '{}'", text),
                    })?)
                };
                tokens.push(Spanned { token, line });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "import" => Token::Import,
                    "as" => Token::As,
                    "class" => Token::Class,
                    "fn" => Token::Fn,
                    "let" => Token::Let,
                    "if" => Token::If,
                    "else" => Token::Else,
                    "for" => Token::For,
                    "in" => Token::In,
                    "while" => Token::While,
                    "return" => Token::Return,
                    "break" => Token::Break,
                    "continue" => Token::Continue,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                };
                tokens.push(Spanned { token, line });
            }
            _ => {
                let two: String = chars[i..std::cmp::min(i + 2, chars.len())].iter().collect();
                let (token, width) = match two.as_str() {
                    "==" => (Token::EqEq, 2),
                    "!=" => (Token::NotEq, 2),
                    "<=" => (Token::Le, 2),
                    ">=" => (Token::Ge, 2),
                    "&&" => (Token::AndAnd, 2),
                    "||" => (Token::OrOr, 2),
                    _ => {
                        let single = match c {
                            '{' => Token::LBrace,
                            '}' => Token::RBrace,
                            '(' => Token::LParen,
                            ')' => Token::RParen,
                            '[' => Token::LBracket,
                            ']' => Token::RBracket,
                            ',' => Token::Comma,
                            '.' => Token::Dot,
                            ';' => Token::Semi,
                            ':' => Token::Colon,
                            '=' => Token::Assign,
                            '+' => Token::Plus,
                            '-' => Token::Minus,
                            '*' => Token::Star,
                            '/' => Token::Slash,
                            '%' => Token::Percent,
                            '<' => Token::Lt,
                            '>' => Token::Gt,
                            '!' => Token::Bang,
                            other => {
                                return Err(ScriptError::InvalidStructure {
                                    line,
                                    message: format!("unexpected character '{}'", other),
                                })
                            }
                        };
                        (single, 1)
                    }
                };
                tokens.push(Spanned { token, line });
                i += width;
            }
        }
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_a_minimal_class() {
        let tokens = kinds("class T(Tool) { }");
        assert_eq!(
            tokens,
            vec![
                Token::Class,
                Token::Ident("T".to_string()),
                Token::LParen,
                Token::Ident("Tool".to_string()),
                Token::RParen,
                Token::LBrace,
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_strings_with_escapes() {
        let tokens = kinds(r#"let s = "a\nb";"#);
        assert!(tokens.contains(&Token::Str("a\nb".to_string())));
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let tokens = kinds("# nothing here\nlet x = 1;");
        assert_eq!(tokens[0], Token::Let);
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = tokenize("let a = 1;\nlet b = 2;").unwrap();
        let b_line = tokens
            .iter()
            .find(|s| s.token == Token::Ident("b".to_string()))
            .unwrap()
            .line;
        assert_eq!(b_line, 2);
    }

    #[test]
    fn rejects_unterminated_strings() {
        assert!(tokenize("let s = \"oops").is_err());
    }
}
