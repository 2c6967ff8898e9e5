//! Template parsing and rendering.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::TemplateError;

/// Render a body with the macro prelude prepended.
pub fn render_with_prelude(
    prelude: &str,
    body: &str,
    arguments: &Value,
) -> Result<String, TemplateError> {
    if prelude.is_empty() {
        render(body, arguments)
    } else {
        render(&format!("{}\n\n{}", prelude, body), arguments)
    }
}

/// Render a template body against an argument bag.
pub fn render(body: &str, arguments: &Value) -> Result<String, TemplateError> {
    let segments = segment(body)?;
    let mut parser = BlockParser {
        segments,
        pos: 0,
        macros: HashMap::new(),
    };
    let nodes = parser.parse_nodes(&[])?;
    let macros = parser.macros;

    let mut scope = Scope::new(arguments);
    let mut out = String::new();
    render_nodes(&nodes, &macros, &mut scope, &mut out)?;
    Ok(out)
}

/// Whether a template is a single self-contained macro definition, the
/// shape required of macro registry rows.
pub fn is_macro_block(template: &str) -> bool {
    let trimmed = template.trim();
    trimmed.starts_with("{% macro") && trimmed.ends_with("{% endmacro %}")
}

// ===== Segmentation =====

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    /// `{% … %}` contents, trimmed.
    Tag(String),
    /// `{{ … }}` contents, trimmed.
    Output(String),
}

fn segment(body: &str) -> Result<Vec<Segment>, TemplateError> {
    let chars: Vec<char> = body.chars().collect();
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '{' && i + 1 < chars.len() && (chars[i + 1] == '%' || chars[i + 1] == '{') {
            let closer = if chars[i + 1] == '%' { '%' } else { '}' };
            let is_tag = closer == '%';
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            let start = i + 2;
            let mut j = start;
            while j + 1 < chars.len() && !(chars[j] == closer && chars[j + 1] == '}') {
                j += 1;
            }
            if j + 1 >= chars.len() {
                return Err(TemplateError::Syntax(
                    "unterminated template tag".to_string(),
                ));
            }
            let inner: String = chars[start..j].iter().collect();
            let inner = inner.trim().to_string();
            segments.push(if is_tag {
                Segment::Tag(inner)
            } else {
                Segment::Output(inner)
            });
            i = j + 2;
            continue;
        }
        text.push(chars[i]);
        i += 1;
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

// ===== Template AST =====

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Output(ExprT),
    If {
        branches: Vec<(ExprT, Vec<Node>)>,
        else_body: Vec<Node>,
    },
    For {
        var: String,
        list: ExprT,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone)]
struct MacroDef {
    params: Vec<(String, Option<String>)>,
    body: Vec<Node>,
}

#[derive(Debug, Clone)]
enum ExprT {
    /// Dotted lookup: `arguments.store`.
    Path(Vec<String>),
    StrLit(String),
    NumLit(String),
    /// Macro invocation: `quarter(arguments.date)`.
    Call { name: String, args: Vec<ExprT> },
}

struct BlockParser {
    segments: Vec<Segment>,
    pos: usize,
    macros: HashMap<String, MacroDef>,
}

impl BlockParser {
    /// Parse nodes until one of `stops` tags (by first word) is reached.
    /// The stopping tag is left unconsumed. An empty `stops` parses to the
    /// end of input.
    fn parse_nodes(&mut self, stops: &[&str]) -> Result<Vec<Node>, TemplateError> {
        let mut nodes = Vec::new();
        while self.pos < self.segments.len() {
            match self.segments[self.pos].clone() {
                Segment::Text(text) => {
                    self.pos += 1;
                    nodes.push(Node::Text(text));
                }
                Segment::Output(expr) => {
                    self.pos += 1;
                    nodes.push(Node::Output(parse_expr(&expr)?));
                }
                Segment::Tag(tag) => {
                    let word = tag.split_whitespace().next().unwrap_or("");
                    if stops.contains(&word) {
                        return Ok(nodes);
                    }
                    self.pos += 1;
                    match word {
                        "if" => nodes.push(self.parse_if(&tag)?),
                        "for" => nodes.push(self.parse_for(&tag)?),
                        "macro" => self.parse_macro(&tag)?,
                        other => return Err(TemplateError::UnexpectedTag(other.to_string())),
                    }
                }
            }
        }
        if stops.is_empty() {
            Ok(nodes)
        } else {
            Err(TemplateError::UnclosedBlock(match stops.first() {
                Some(&"endif") | Some(&"elif") | Some(&"else") => "if",
                Some(&"endfor") => "for",
                _ => "block",
            }))
        }
    }

    /// Consume the stopping tag, returning its text.
    fn take_stop_tag(&mut self) -> String {
        let tag = match &self.segments[self.pos] {
            Segment::Tag(tag) => tag.clone(),
            _ => String::new(),
        };
        self.pos += 1;
        tag
    }

    fn parse_if(&mut self, tag: &str) -> Result<Node, TemplateError> {
        let cond_src = tag.trim_start_matches("if").trim();
        let mut branches = vec![(parse_expr(cond_src)?, Vec::new())];
        let mut else_body = Vec::new();

        loop {
            let body = self.parse_nodes(&["elif", "else", "endif"])?;
            if self.pos >= self.segments.len() {
                return Err(TemplateError::UnclosedBlock("if"));
            }
            let stop = self.take_stop_tag();
            let word = stop.split_whitespace().next().unwrap_or("");
            match word {
                "elif" => {
                    if let Some(last) = branches.last_mut() {
                        last.1 = body;
                    }
                    let cond_src = stop.trim_start_matches("elif").trim();
                    branches.push((parse_expr(cond_src)?, Vec::new()));
                }
                "else" => {
                    if let Some(last) = branches.last_mut() {
                        last.1 = body;
                    }
                    else_body = self.parse_nodes(&["endif"])?;
                    if self.pos >= self.segments.len() {
                        return Err(TemplateError::UnclosedBlock("if"));
                    }
                    self.take_stop_tag();
                    break;
                }
                "endif" => {
                    if let Some(last) = branches.last_mut() {
                        last.1 = body;
                    }
                    break;
                }
                _ => return Err(TemplateError::UnexpectedTag(word.to_string())),
            }
        }

        Ok(Node::If {
            branches,
            else_body,
        })
    }

    fn parse_for(&mut self, tag: &str) -> Result<Node, TemplateError> {
        let spec = tag.trim_start_matches("for").trim();
        let mut parts = spec.splitn(2, " in ");
        let var = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TemplateError::Syntax(format!("bad for tag: '{}'", tag)))?;
        let list_src = parts
            .next()
            .map(str::trim)
            .ok_or_else(|| TemplateError::Syntax(format!("bad for tag: '{}'", tag)))?;
        let body = self.parse_nodes(&["endfor"])?;
        if self.pos >= self.segments.len() {
            return Err(TemplateError::UnclosedBlock("for"));
        }
        self.take_stop_tag();
        Ok(Node::For {
            var: var.to_string(),
            list: parse_expr(list_src)?,
            body,
        })
    }

    fn parse_macro(&mut self, tag: &str) -> Result<(), TemplateError> {
        let spec = tag.trim_start_matches("macro").trim();
        let open = spec
            .find('(')
            .ok_or_else(|| TemplateError::Syntax(format!("bad macro tag: '{}'", tag)))?;
        let close = spec
            .rfind(')')
            .ok_or_else(|| TemplateError::Syntax(format!("bad macro tag: '{}'", tag)))?;
        let name = spec[..open].trim().to_string();
        let mut params = Vec::new();
        let param_src = &spec[open + 1..close];
        for part in param_src.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((param, default)) => params.push((
                    param.trim().to_string(),
                    Some(unquote(default.trim()).to_string()),
                )),
                None => params.push((part.to_string(), None)),
            }
        }
        let body = self.parse_nodes(&["endmacro"])?;
        if self.pos >= self.segments.len() {
            return Err(TemplateError::UnclosedBlock("block"));
        }
        self.take_stop_tag();
        self.macros.insert(name, MacroDef { params, body });
        Ok(())
    }
}

// ===== Expressions =====

fn parse_expr(src: &str) -> Result<ExprT, TemplateError> {
    let src = src.trim();
    if src.is_empty() {
        return Err(TemplateError::Syntax("empty expression".to_string()));
    }

    if (src.starts_with('\'') && src.ends_with('\'') && src.len() >= 2)
        || (src.starts_with('"') && src.ends_with('"') && src.len() >= 2)
    {
        return Ok(ExprT::StrLit(src[1..src.len() - 1].to_string()));
    }

    if src.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
        return Ok(ExprT::NumLit(src.to_string()));
    }

    // Macro call: name(arg, arg)
    if let Some(open) = src.find('(') {
        if src.ends_with(')') {
            let name = src[..open].trim();
            if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !name.is_empty() {
                let inner = &src[open + 1..src.len() - 1];
                let mut args = Vec::new();
                for part in split_args(inner) {
                    let part = part.trim();
                    if !part.is_empty() {
                        args.push(parse_expr(part)?);
                    }
                }
                return Ok(ExprT::Call {
                    name: name.to_string(),
                    args,
                });
            }
        }
    }

    // Dotted path.
    let path: Vec<String> = src.split('.').map(|s| s.trim().to_string()).collect();
    if path.iter().any(|segment| {
        segment.is_empty()
            || !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    }) {
        return Err(TemplateError::Syntax(format!("bad expression: '{}'", src)));
    }
    Ok(ExprT::Path(path))
}

/// Split a macro argument list on top-level commas.
fn split_args(src: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in src.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn unquote(src: &str) -> &str {
    let src = src.trim();
    if (src.starts_with('\'') && src.ends_with('\'') && src.len() >= 2)
        || (src.starts_with('"') && src.ends_with('"') && src.len() >= 2)
    {
        &src[1..src.len() - 1]
    } else {
        src
    }
}

// ===== Rendering =====

struct Scope<'a> {
    arguments: &'a Value,
    locals: Vec<HashMap<String, Value>>,
}

impl<'a> Scope<'a> {
    fn new(arguments: &'a Value) -> Self {
        Self {
            arguments,
            locals: Vec::new(),
        }
    }

    fn lookup(&self, path: &[String]) -> Value {
        let root = match path.first() {
            Some(root) => root.as_str(),
            None => return Value::Null,
        };
        let mut current = if root == "arguments" {
            self.arguments.clone()
        } else {
            let mut found = Value::Null;
            for frame in self.locals.iter().rev() {
                if let Some(value) = frame.get(root) {
                    found = value.clone();
                    break;
                }
            }
            found
        };
        for segment in &path[1..] {
            current = current.get(segment).cloned().unwrap_or(Value::Null);
        }
        current
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_nodes(
    nodes: &[Node],
    macros: &HashMap<String, MacroDef>,
    scope: &mut Scope,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => {
                let rendered = eval_to_text(expr, macros, scope)?;
                out.push_str(&rendered);
            }
            Node::If {
                branches,
                else_body,
            } => {
                let mut taken = false;
                for (cond, body) in branches {
                    let value = eval_value(cond, macros, scope)?;
                    if truthy(&value) {
                        render_nodes(body, macros, scope, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    render_nodes(else_body, macros, scope, out)?;
                }
            }
            Node::For { var, list, body } => {
                let value = eval_value(list, macros, scope)?;
                let items = match value {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                for item in items {
                    let mut frame = HashMap::new();
                    frame.insert(var.clone(), item);
                    scope.locals.push(frame);
                    let result = render_nodes(body, macros, scope, out);
                    scope.locals.pop();
                    result?;
                }
            }
        }
    }
    Ok(())
}

fn eval_value(
    expr: &ExprT,
    macros: &HashMap<String, MacroDef>,
    scope: &mut Scope,
) -> Result<Value, TemplateError> {
    match expr {
        ExprT::Path(path) => Ok(scope.lookup(path)),
        ExprT::StrLit(s) => Ok(Value::String(s.clone())),
        ExprT::NumLit(n) => Ok(serde_json::from_str(n)
            .unwrap_or_else(|_| Value::String(n.clone()))),
        ExprT::Call { .. } => {
            let text = eval_to_text(expr, macros, scope)?;
            Ok(Value::String(text))
        }
    }
}

fn eval_to_text(
    expr: &ExprT,
    macros: &HashMap<String, MacroDef>,
    scope: &mut Scope,
) -> Result<String, TemplateError> {
    match expr {
        ExprT::Call { name, args } => {
            let def = macros
                .get(name)
                .ok_or_else(|| TemplateError::UnknownMacro(name.clone()))?;
            let required = def.params.iter().filter(|(_, d)| d.is_none()).count();
            if args.len() < required || args.len() > def.params.len() {
                return Err(TemplateError::MacroArity {
                    name: name.clone(),
                    expected: def.params.len(),
                    got: args.len(),
                });
            }
            let mut frame = HashMap::new();
            for (index, (param, default)) in def.params.iter().enumerate() {
                let value = match args.get(index) {
                    Some(arg) => eval_value(arg, macros, scope)?,
                    None => Value::String(default.clone().unwrap_or_default()),
                };
                frame.insert(param.clone(), value);
            }
            scope.locals.push(frame);
            let mut out = String::new();
            let result = render_nodes(&def.body, macros, scope, &mut out);
            scope.locals.pop();
            result?;
            Ok(out.trim().to_string())
        }
        other => {
            let value = eval_value(other, macros, scope)?;
            Ok(display(&value))
        }
    }
}
