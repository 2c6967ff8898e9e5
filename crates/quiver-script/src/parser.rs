//! Recursive-descent parser for the script language.
//!
//! Top level: `import` statements and class definitions only. Any other
//! construct at the top level is a structural error, which is exactly the
//! discipline the validator relies on: evaluating a parsed script can bind
//! imports and classes but execute nothing else.

use crate::ast::*;
use crate::error::ScriptError;
use crate::lexer::{tokenize, Spanned, Token};

/// Parse script source into a [`Script`].
pub fn parse(src: &str) -> Result<Script, ScriptError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.script()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ScriptError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {:?}", what, self.peek())))
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::InvalidStructure {
            line: self.line(),
            message: message.into(),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ScriptError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected {}, found {:?}", what, other))),
        }
    }

    // ===== Top level =====

    fn script(&mut self) -> Result<Script, ScriptError> {
        let mut items = Vec::new();
        while *self.peek() != Token::Eof {
            match self.peek() {
                Token::Import => items.push(Item::Import(self.import()?)),
                Token::Class => items.push(Item::Class(self.class()?)),
                other => {
                    return Err(self.error(format!(
                        "only imports and class definitions are allowed at the top level, found {:?}",
                        other
                    )))
                }
            }
        }
        Ok(Script { items })
    }

    fn import(&mut self) -> Result<Import, ScriptError> {
        let line = self.line();
        self.expect(Token::Import, "'import'")?;
        let mut path = vec![self.ident("module name")?];
        while *self.peek() == Token::Dot {
            self.advance();
            path.push(self.ident("module path segment")?);
        }
        let binding = if *self.peek() == Token::As {
            self.advance();
            self.ident("import alias")?
        } else {
            path[0].clone()
        };
        self.expect(Token::Semi, "';' after import")?;
        Ok(Import {
            module: path.join("."),
            binding,
            line,
        })
    }

    fn class(&mut self) -> Result<ClassDef, ScriptError> {
        let line = self.line();
        self.expect(Token::Class, "'class'")?;
        let name = self.ident("class name")?;
        let base = if *self.peek() == Token::LParen {
            self.advance();
            let base = self.ident("base class name")?;
            self.expect(Token::RParen, "')'")?;
            Some(base)
        } else {
            None
        };
        self.expect(Token::LBrace, "'{' to open class body")?;
        let mut methods = Vec::new();
        while *self.peek() != Token::RBrace {
            if *self.peek() != Token::Fn {
                return Err(self.error("class bodies may contain only fn definitions"));
            }
            methods.push(self.function()?);
        }
        self.expect(Token::RBrace, "'}'")?;
        Ok(ClassDef {
            name,
            base,
            methods,
            line,
        })
    }

    fn function(&mut self) -> Result<FnDef, ScriptError> {
        let line = self.line();
        self.expect(Token::Fn, "'fn'")?;
        let name = self.ident("method name")?;
        self.expect(Token::LParen, "'('")?;
        let mut params = Vec::new();
        while *self.peek() != Token::RParen {
            params.push(self.ident("parameter name")?);
            if *self.peek() == Token::Comma {
                self.advance();
            }
        }
        self.expect(Token::RParen, "')'")?;
        let body = self.block()?;
        Ok(FnDef {
            name,
            params,
            body,
            line,
        })
    }

    // ===== Statements =====

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(Token::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while *self.peek() != Token::RBrace {
            statements.push(self.statement()?);
        }
        self.expect(Token::RBrace, "'}'")?;
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();
        match self.peek().clone() {
            Token::Let => {
                self.advance();
                let name = self.ident("variable name")?;
                self.expect(Token::Assign, "'='")?;
                let value = self.expression()?;
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Let { name, value, line })
            }
            Token::If => self.if_statement(),
            Token::For => {
                self.advance();
                let var = self.ident("loop variable")?;
                self.expect(Token::In, "'in'")?;
                let iter = self.expression()?;
                let body = self.block()?;
                Ok(Stmt::For {
                    var,
                    iter,
                    body,
                    line,
                })
            }
            Token::While => {
                self.advance();
                let cond = self.expression()?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body, line })
            }
            Token::Return => {
                self.advance();
                let value = if *self.peek() == Token::Semi {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Return { value, line })
            }
            Token::Break => {
                self.advance();
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Break { line })
            }
            Token::Continue => {
                self.advance();
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Continue { line })
            }
            _ => {
                let expr = self.expression()?;
                if *self.peek() == Token::Assign {
                    match expr {
                        Expr::Ident { .. } | Expr::Index { .. } | Expr::Member { .. } => {}
                        _ => return Err(self.error("invalid assignment target")),
                    }
                    self.advance();
                    let value = self.expression()?;
                    self.expect(Token::Semi, "';'")?;
                    return Ok(Stmt::Assign {
                        target: expr,
                        value,
                        line,
                    });
                }
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();
        self.expect(Token::If, "'if'")?;
        let cond = self.expression()?;
        let then_body = self.block()?;
        let else_body = if *self.peek() == Token::Else {
            self.advance();
            if *self.peek() == Token::If {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            line,
        })
    }

    // ===== Expressions (precedence climbing) =====

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.and_expr()?;
        while *self.peek() == Token::OrOr {
            let line = self.line();
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.equality()?;
        while *self.peek() == Token::AndAnd {
            let line = self.line();
            self.advance();
            let rhs = self.equality()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let line = self.line();
        match self.peek() {
            Token::Minus => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(self.unary()?),
                    line,
                })
            }
            Token::Bang => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(self.unary()?),
                    line,
                })
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    let line = self.line();
                    self.advance();
                    let name = self.ident("member name")?;
                    expr = Expr::Member {
                        obj: Box::new(expr),
                        name,
                        line,
                    };
                }
                Token::LBracket => {
                    let line = self.line();
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        index: Box::new(index),
                        line,
                    };
                }
                Token::LParen => {
                    let line = self.line();
                    self.advance();
                    let mut args = Vec::new();
                    while *self.peek() != Token::RParen {
                        args.push(self.expression()?);
                        if *self.peek() == Token::Comma {
                            self.advance();
                        }
                    }
                    self.expect(Token::RParen, "')'")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        line,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let line = self.line();
        match self.peek().clone() {
            Token::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::Int(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            Token::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Ident { name, line })
            }
            Token::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while *self.peek() != Token::RBracket {
                    items.push(self.expression()?);
                    if *self.peek() == Token::Comma {
                        self.advance();
                    }
                }
                self.expect(Token::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while *self.peek() != Token::RBrace {
                    let key = match self.peek().clone() {
                        Token::Str(s) => {
                            self.advance();
                            s
                        }
                        Token::Ident(name) => {
                            self.advance();
                            name
                        }
                        other => {
                            return Err(self.error(format!(
                                "map keys must be strings or identifiers, found {:?}",
                                other
                            )))
                        }
                    };
                    self.expect(Token::Colon, "':'")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if *self.peek() == Token::Comma {
                        self.advance();
                    }
                }
                self.expect(Token::RBrace, "'}'")?;
                Ok(Expr::Map(entries))
            }
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREETER: &str = r#"
import util;

class Greeter(Tool) {
    fn run(self, arguments) {
        let name = arguments["name"];
        if name == null { return "Hello, stranger!"; }
        return "Hello, " + str(name) + "!";
    }
}
"#;

    #[test]
    fn parses_the_greeter() {
        let script = parse(GREETER).unwrap();
        assert_eq!(script.imports().count(), 1);
        let class = script.classes().next().unwrap();
        assert_eq!(class.name, "Greeter");
        assert_eq!(class.base.as_deref(), Some("Tool"));
        assert!(class.method("run").is_some());
    }

    #[test]
    fn rejects_top_level_statements() {
        let err = parse("let x = 1;").unwrap_err();
        assert!(matches!(err, ScriptError::InvalidStructure { .. }));
        assert!(parse("greet();").is_err());
        assert!(parse("if true { }").is_err());
    }

    #[test]
    fn rejects_non_fn_class_members() {
        assert!(parse("class T(Tool) { let x = 1; }").is_err());
    }

    #[test]
    fn parses_imports_with_aliases() {
        let script = parse("import a.b.c as abc;").unwrap();
        let import = script.imports().next().unwrap();
        assert_eq!(import.module, "a.b.c");
        assert_eq!(import.binding, "abc");
        assert_eq!(import.root(), "a");
    }

    #[test]
    fn parses_else_if_chains() {
        let src = r#"
class T(Tool) {
    fn run(self, arguments) {
        if arguments["a"] { return 1; }
        else if arguments["b"] { return 2; }
        else { return 3; }
    }
}
"#;
        parse(src).unwrap();
    }

    #[test]
    fn parses_container_literals_and_loops() {
        let src = r#"
class T(Tool) {
    fn run(self, arguments) {
        let items = [1, 2, 3];
        let total = 0;
        for item in items { total = total + item; }
        let summary = {count: len(items), "total": total};
        return summary;
    }
}
"#;
        parse(src).unwrap();
    }

    #[test]
    fn assignment_targets_are_checked() {
        let src = r#"
class T(Tool) {
    fn run(self, arguments) {
        1 + 2 = 3;
    }
}
"#;
        assert!(parse(src).is_err());
    }
}
