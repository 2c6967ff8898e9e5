//! Tree-walking interpreter with a capability-scoped host boundary.
//!
//! The interpreter is synchronous and confined to the calling thread; the
//! host bridges its own async machinery behind the [`HostEnv`] trait. A
//! step budget bounds runaway scripts; the registry is trusted, but a
//! tool that loops forever should fail its call, not wedge a worker.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::ast::*;
use crate::error::ScriptError;
use crate::value::{Instance, Value};

/// Default evaluation budget, in interpreter steps.
const DEFAULT_BUDGET: u64 = 1_000_000;

/// The capability surface a script sees through `self`.
///
/// The sub-executor (`call_tool`) is the sole mechanism by which one tool
/// may invoke another; `query` and `meta_query` run validated read-only SQL
/// against the data and metadata sessions.
pub trait HostEnv: Send + Sync {
    fn log(&self, message: &str);
    fn call_tool(&self, name: &str, arguments: &Json) -> Result<Json, ScriptError>;
    fn query(&self, sql: &str, params: &Json) -> Result<Json, ScriptError>;
    fn meta_query(&self, sql: &str, params: &Json) -> Result<Json, ScriptError>;
}

/// Host with no sessions and no sub-executor. Used in tests and for
/// validating scripts outside a dispatch.
pub struct NullHost;

impl HostEnv for NullHost {
    fn log(&self, message: &str) {
        tracing::info!(target: "quiver_script", "{}", message);
    }

    fn call_tool(&self, name: &str, _arguments: &Json) -> Result<Json, ScriptError> {
        Err(ScriptError::Host(format!(
            "no sub-executor available to call tool '{}'",
            name
        )))
    }

    fn query(&self, _sql: &str, _params: &Json) -> Result<Json, ScriptError> {
        Err(ScriptError::Host("no data session available".to_string()))
    }

    fn meta_query(&self, _sql: &str, _params: &Json) -> Result<Json, ScriptError> {
        Err(ScriptError::Host("no metadata session available".to_string()))
    }
}

/// Locate the single class that is a strict descendant of `Tool`.
pub fn find_tool_class(script: &Script) -> Result<Rc<ClassDef>, ScriptError> {
    let by_name: BTreeMap<&str, &ClassDef> =
        script.classes().map(|c| (c.name.as_str(), c)).collect();

    let descends_from_tool = |class: &ClassDef| -> bool {
        let mut base = class.base.as_deref();
        let mut hops = 0;
        while let Some(name) = base {
            if name == "Tool" {
                return true;
            }
            base = by_name.get(name).and_then(|c| c.base.as_deref());
            hops += 1;
            if hops > 32 {
                return false;
            }
        }
        false
    };

    let matches: Vec<&ClassDef> = script
        .classes()
        .filter(|c| descends_from_tool(c))
        .collect();
    match matches.len() {
        0 => Err(ScriptError::NoToolClass),
        1 => Ok(Rc::new(matches[0].clone())),
        n => Err(ScriptError::AmbiguousToolClass { count: n }),
    }
}

/// Control flow result of executing a statement.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// One evaluation of a script method.
pub struct Interpreter {
    env: Arc<dyn HostEnv>,
    context: Json,
    budget: Cell<u64>,
    limit: u64,
}

impl Interpreter {
    pub fn new(env: Arc<dyn HostEnv>, context: Json) -> Self {
        Self {
            env,
            context,
            budget: Cell::new(DEFAULT_BUDGET),
            limit: DEFAULT_BUDGET,
        }
    }

    pub fn with_budget(mut self, steps: u64) -> Self {
        self.budget.set(steps);
        self.limit = steps;
        self
    }

    /// Evaluate the script and invoke `run(arguments)` on its tool class.
    pub fn run(&self, script: &Script, arguments: &Json) -> Result<Json, ScriptError> {
        let class = find_tool_class(script)?;
        let result = self.invoke(script, &class, "run", vec![Value::from_json(arguments)])?;
        Ok(result.to_json())
    }

    /// Invoke the optional `complete(argument, value)` method. Scripts
    /// without one return no suggestions.
    pub fn complete(
        &self,
        script: &Script,
        argument: &str,
        value: &str,
    ) -> Result<Vec<String>, ScriptError> {
        let class = find_tool_class(script)?;
        if class.method("complete").is_none() {
            return Ok(Vec::new());
        }
        let result = self.invoke(
            script,
            &class,
            "complete",
            vec![
                Value::Str(argument.to_string()),
                Value::Str(value.to_string()),
            ],
        )?;
        let json = result.to_json();
        Ok(match json {
            Json::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        })
    }

    fn invoke(
        &self,
        script: &Script,
        class: &Rc<ClassDef>,
        method_name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let method = class.method(method_name).ok_or_else(|| {
            if method_name == "run" {
                ScriptError::MissingRunMethod {
                    class: class.name.clone(),
                }
            } else {
                ScriptError::runtime(class.line, format!("no method '{}'", method_name))
            }
        })?;

        let mut fields = BTreeMap::new();
        fields.insert("context".to_string(), Value::from_json(&self.context));
        let instance = Value::Instance(Rc::new(Instance {
            class: Rc::clone(class),
            fields: std::cell::RefCell::new(fields),
        }));

        // Globals: one inert module binding per import.
        let mut globals = BTreeMap::new();
        for import in script.imports() {
            globals.insert(import.binding.clone(), Value::Module(import.module.clone()));
        }

        self.call_function(method, instance, args, &globals)
    }

    fn call_function(
        &self,
        function: &FnDef,
        self_value: Value,
        args: Vec<Value>,
        globals: &BTreeMap<String, Value>,
    ) -> Result<Value, ScriptError> {
        let mut scope = BTreeMap::new();
        let mut params = function.params.iter();
        if let Some(first) = params.next() {
            scope.insert(first.clone(), self_value);
        }
        for (param, arg) in params.zip(args.into_iter()) {
            scope.insert(param.clone(), arg);
        }

        let mut frame = Frame {
            globals,
            scopes: vec![scope],
        };
        match self.exec_block(&function.body, &mut frame)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Null),
        }
    }

    fn spend(&self, _line: usize) -> Result<(), ScriptError> {
        let remaining = self.budget.get();
        if remaining == 0 {
            return Err(ScriptError::BudgetExhausted { steps: self.limit });
        }
        self.budget.set(remaining - 1);
        Ok(())
    }

    fn exec_block(&self, stmts: &[Stmt], frame: &mut Frame) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, frame)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow, ScriptError> {
        match stmt {
            Stmt::Let { name, value, line } => {
                self.spend(*line)?;
                let value = self.eval(value, frame)?;
                frame.declare(name, value);
                Ok(Flow::Normal)
            }
            Stmt::Assign {
                target,
                value,
                line,
            } => {
                self.spend(*line)?;
                let value = self.eval(value, frame)?;
                self.assign(target, value, frame, *line)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                line,
            } => {
                self.spend(*line)?;
                let branch = if self.eval(cond, frame)?.truthy() {
                    then_body
                } else {
                    else_body
                };
                frame.push_scope();
                let flow = self.exec_block(branch, frame);
                frame.pop_scope();
                flow
            }
            Stmt::For {
                var,
                iter,
                body,
                line,
            } => {
                self.spend(*line)?;
                let iterable = self.eval(iter, frame)?;
                let items: Vec<Value> = match &iterable {
                    Value::List(items) => items.borrow().clone(),
                    Value::Map(entries) => entries
                        .borrow()
                        .keys()
                        .map(|k| Value::Str(k.clone()))
                        .collect(),
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => {
                        return Err(ScriptError::runtime(
                            *line,
                            format!("cannot iterate over {}", other.type_name()),
                        ))
                    }
                };
                for item in items {
                    self.spend(*line)?;
                    frame.push_scope();
                    frame.declare(var, item);
                    let flow = self.exec_block(body, frame);
                    frame.pop_scope();
                    match flow? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::While { cond, body, line } => {
                loop {
                    self.spend(*line)?;
                    if !self.eval(cond, frame)?.truthy() {
                        break;
                    }
                    frame.push_scope();
                    let flow = self.exec_block(body, frame);
                    frame.pop_scope();
                    match flow? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return { value, line } => {
                self.spend(*line)?;
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::Expr(expr) => {
                self.spend(expr.line())?;
                self.eval(expr, frame)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn assign(
        &self,
        target: &Expr,
        value: Value,
        frame: &mut Frame,
        line: usize,
    ) -> Result<(), ScriptError> {
        match target {
            Expr::Ident { name, .. } => {
                if !frame.set(name, value) {
                    return Err(ScriptError::runtime(
                        line,
                        format!("assignment to undeclared variable '{}'", name),
                    ));
                }
                Ok(())
            }
            Expr::Index { obj, index, .. } => {
                let container = self.eval(obj, frame)?;
                let index = self.eval(index, frame)?;
                match (&container, &index) {
                    (Value::List(items), Value::Int(i)) => {
                        let mut items = items.borrow_mut();
                        let i = *i;
                        if i < 0 || i as usize >= items.len() {
                            return Err(ScriptError::runtime(
                                line,
                                format!("list index {} out of range", i),
                            ));
                        }
                        items[i as usize] = value;
                        Ok(())
                    }
                    (Value::Map(entries), Value::Str(key)) => {
                        entries.borrow_mut().insert(key.clone(), value);
                        Ok(())
                    }
                    _ => Err(ScriptError::runtime(
                        line,
                        format!(
                            "cannot index-assign {}[{}]",
                            container.type_name(),
                            index.type_name()
                        ),
                    )),
                }
            }
            Expr::Member { obj, name, .. } => {
                let container = self.eval(obj, frame)?;
                match &container {
                    Value::Instance(instance) => {
                        instance.fields.borrow_mut().insert(name.clone(), value);
                        Ok(())
                    }
                    Value::Map(entries) => {
                        entries.borrow_mut().insert(name.clone(), value);
                        Ok(())
                    }
                    other => Err(ScriptError::runtime(
                        line,
                        format!("cannot set member on {}", other.type_name()),
                    )),
                }
            }
            _ => Err(ScriptError::runtime(line, "invalid assignment target")),
        }
    }

    fn eval(&self, expr: &Expr, frame: &mut Frame) -> Result<Value, ScriptError> {
        self.spend(expr.line())?;
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, frame)?);
                }
                Ok(Value::list(values))
            }
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value, frame)?);
                }
                Ok(Value::map(map))
            }
            Expr::Ident { name, line } => frame.get(name).ok_or_else(|| {
                ScriptError::runtime(*line, format!("undefined variable '{}'", name))
            }),
            Expr::Index { obj, index, line } => {
                let container = self.eval(obj, frame)?;
                let index = self.eval(index, frame)?;
                self.index_value(&container, &index, *line)
            }
            Expr::Member { obj, name, line } => {
                let container = self.eval(obj, frame)?;
                match &container {
                    Value::Instance(instance) => Ok(instance
                        .fields
                        .borrow()
                        .get(name)
                        .cloned()
                        .unwrap_or(Value::Null)),
                    Value::Map(entries) => Ok(entries
                        .borrow()
                        .get(name)
                        .cloned()
                        .unwrap_or(Value::Null)),
                    Value::Module(module) => Err(ScriptError::runtime(
                        *line,
                        format!("module '{}' has no usable attributes", module),
                    )),
                    other => Err(ScriptError::runtime(
                        *line,
                        format!("{} has no member '{}'", other.type_name(), name),
                    )),
                }
            }
            Expr::Call { callee, args, line } => self.eval_call(callee, args, frame, *line),
            Expr::Unary { op, expr, line } => {
                let value = self.eval(expr, frame)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(v) => Ok(Value::Int(-v)),
                        Value::Float(v) => Ok(Value::Float(-v)),
                        other => Err(ScriptError::runtime(
                            *line,
                            format!("cannot negate {}", other.type_name()),
                        )),
                    },
                }
            }
            Expr::Binary { op, lhs, rhs, line } => self.eval_binary(*op, lhs, rhs, frame, *line),
        }
    }

    fn index_value(
        &self,
        container: &Value,
        index: &Value,
        line: usize,
    ) -> Result<Value, ScriptError> {
        match (container, index) {
            (Value::List(items), Value::Int(i)) => {
                let items = items.borrow();
                let i = *i;
                if i < 0 || i as usize >= items.len() {
                    return Err(ScriptError::runtime(
                        line,
                        format!("list index {} out of range (len {})", i, items.len()),
                    ));
                }
                Ok(items[i as usize].clone())
            }
            // Missing map keys read as null so scripts can probe arguments.
            (Value::Map(entries), Value::Str(key)) => Ok(entries
                .borrow()
                .get(key)
                .cloned()
                .unwrap_or(Value::Null)),
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let i = *i;
                if i < 0 || i as usize >= chars.len() {
                    return Err(ScriptError::runtime(
                        line,
                        format!("string index {} out of range", i),
                    ));
                }
                Ok(Value::Str(chars[i as usize].to_string()))
            }
            _ => Err(ScriptError::runtime(
                line,
                format!(
                    "cannot index {} with {}",
                    container.type_name(),
                    index.type_name()
                ),
            )),
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        frame: &mut Frame,
        line: usize,
    ) -> Result<Value, ScriptError> {
        // Short-circuit forms first.
        match op {
            BinaryOp::And => {
                let left = self.eval(lhs, frame)?;
                if !left.truthy() {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.eval(rhs, frame)?.truthy()));
            }
            BinaryOp::Or => {
                let left = self.eval(lhs, frame)?;
                if left.truthy() {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.eval(rhs, frame)?.truthy()));
            }
            _ => {}
        }

        let left = self.eval(lhs, frame)?;
        let right = self.eval(rhs, frame)?;
        match op {
            BinaryOp::Eq => Ok(Value::Bool(left.eq_value(&right))),
            BinaryOp::NotEq => Ok(Value::Bool(!left.eq_value(&right))),
            BinaryOp::Add => match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
                (Value::List(a), Value::List(b)) => {
                    let mut items = a.borrow().clone();
                    items.extend(b.borrow().iter().cloned());
                    Ok(Value::list(items))
                }
                _ => self.numeric(op, &left, &right, line),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                self.numeric(op, &left, &right, line)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                self.compare(op, &left, &right, line)
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn numeric(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        line: usize,
    ) -> Result<Value, ScriptError> {
        let type_error = || {
            ScriptError::runtime(
                line,
                format!(
                    "unsupported operand types {} and {}",
                    left.type_name(),
                    right.type_name()
                ),
            )
        };
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => {
                let (a, b) = (*a, *b);
                match op {
                    BinaryOp::Add => Ok(Value::Int(a.wrapping_add(b))),
                    BinaryOp::Sub => Ok(Value::Int(a.wrapping_sub(b))),
                    BinaryOp::Mul => Ok(Value::Int(a.wrapping_mul(b))),
                    BinaryOp::Div => {
                        if b == 0 {
                            Err(ScriptError::runtime(line, "division by zero"))
                        } else {
                            Ok(Value::Int(a / b))
                        }
                    }
                    BinaryOp::Rem => {
                        if b == 0 {
                            Err(ScriptError::runtime(line, "modulo by zero"))
                        } else {
                            Ok(Value::Int(a % b))
                        }
                    }
                    _ => Err(type_error()),
                }
            }
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let a = as_f64(left);
                let b = as_f64(right);
                match op {
                    BinaryOp::Add => Ok(Value::Float(a + b)),
                    BinaryOp::Sub => Ok(Value::Float(a - b)),
                    BinaryOp::Mul => Ok(Value::Float(a * b)),
                    BinaryOp::Div => {
                        if b == 0.0 {
                            Err(ScriptError::runtime(line, "division by zero"))
                        } else {
                            Ok(Value::Float(a / b))
                        }
                    }
                    BinaryOp::Rem => {
                        if b == 0.0 {
                            Err(ScriptError::runtime(line, "modulo by zero"))
                        } else {
                            Ok(Value::Float(a % b))
                        }
                    }
                    _ => Err(type_error()),
                }
            }
            _ => Err(type_error()),
        }
    }

    fn compare(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        line: usize,
    ) -> Result<Value, ScriptError> {
        let ordering = match (left, right) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                as_f64(left).partial_cmp(&as_f64(right))
            }
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        };
        let Some(ordering) = ordering else {
            return Err(ScriptError::runtime(
                line,
                format!(
                    "cannot compare {} with {}",
                    left.type_name(),
                    right.type_name()
                ),
            ));
        };
        let result = match op {
            BinaryOp::Lt => ordering.is_lt(),
            BinaryOp::Le => ordering.is_le(),
            BinaryOp::Gt => ordering.is_gt(),
            BinaryOp::Ge => ordering.is_ge(),
            _ => false,
        };
        Ok(Value::Bool(result))
    }

    fn eval_call(
        &self,
        callee: &Expr,
        args: &[Expr],
        frame: &mut Frame,
        line: usize,
    ) -> Result<Value, ScriptError> {
        // Method call: receiver.method(args)
        if let Expr::Member { obj, name, .. } = callee {
            let receiver = self.eval(obj, frame)?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(self.eval(arg, frame)?);
            }
            return self.call_method(&receiver, name, values, frame, line);
        }

        // Free function: builtin
        if let Expr::Ident { name, .. } = callee {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(self.eval(arg, frame)?);
            }
            return self.call_builtin(name, values, line);
        }

        Err(ScriptError::runtime(line, "expression is not callable"))
    }

    fn call_method(
        &self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        frame: &Frame,
        line: usize,
    ) -> Result<Value, ScriptError> {
        let Value::Instance(instance) = receiver else {
            return Err(ScriptError::runtime(
                line,
                format!("{} has no method '{}'", receiver.type_name(), name),
            ));
        };

        match name {
            "log" => {
                let message = args
                    .first()
                    .map(|v| v.display())
                    .unwrap_or_default();
                self.env.log(&message);
                Ok(Value::Null)
            }
            "call_tool" => {
                let tool_name = match args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    _ => {
                        return Err(ScriptError::runtime(
                            line,
                            "call_tool expects (name, arguments)",
                        ))
                    }
                };
                let arguments = args
                    .get(1)
                    .map(|v| v.to_json())
                    .unwrap_or_else(|| serde_json::json!({}));
                let result = self.env.call_tool(&tool_name, &arguments)?;
                Ok(Value::from_json(&result))
            }
            "query" | "meta_query" => {
                let sql = match args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    _ => {
                        return Err(ScriptError::runtime(
                            line,
                            format!("{} expects (sql, params)", name),
                        ))
                    }
                };
                let params = args
                    .get(1)
                    .map(|v| v.to_json())
                    .unwrap_or_else(|| serde_json::json!({}));
                let result = if name == "query" {
                    self.env.query(&sql, &params)?
                } else {
                    self.env.meta_query(&sql, &params)?
                };
                Ok(Value::from_json(&result))
            }
            _ => {
                let method = instance.class.method(name).ok_or_else(|| {
                    ScriptError::runtime(
                        line,
                        format!("class '{}' has no method '{}'", instance.class.name, name),
                    )
                })?;
                self.call_function(method, receiver.clone(), args, frame.globals_ref())
            }
        }
    }

    fn call_builtin(
        &self,
        name: &str,
        args: Vec<Value>,
        line: usize,
    ) -> Result<Value, ScriptError> {
        let arity_error = |expected: &str| {
            ScriptError::runtime(line, format!("{} expects {}", name, expected))
        };
        match name {
            "len" => match args.first() {
                Some(Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
                Some(Value::List(items)) => Ok(Value::Int(items.borrow().len() as i64)),
                Some(Value::Map(entries)) => Ok(Value::Int(entries.borrow().len() as i64)),
                _ => Err(arity_error("a string, list, or map")),
            },
            "str" => Ok(Value::Str(
                args.first().map(|v| v.display()).unwrap_or_default(),
            )),
            "int" => match args.first() {
                Some(Value::Int(v)) => Ok(Value::Int(*v)),
                Some(Value::Float(v)) => Ok(Value::Int(*v as i64)),
                Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
                Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    ScriptError::runtime(line, format!("cannot parse '{}' as int", s))
                }),
                _ => Err(arity_error("a number or numeric string")),
            },
            "float" => match args.first() {
                Some(Value::Int(v)) => Ok(Value::Float(*v as f64)),
                Some(Value::Float(v)) => Ok(Value::Float(*v)),
                Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    ScriptError::runtime(line, format!("cannot parse '{}' as float", s))
                }),
                _ => Err(arity_error("a number or numeric string")),
            },
            "keys" => match args.first() {
                Some(Value::Map(entries)) => Ok(Value::list(
                    entries
                        .borrow()
                        .keys()
                        .map(|k| Value::Str(k.clone()))
                        .collect(),
                )),
                _ => Err(arity_error("a map")),
            },
            "values" => match args.first() {
                Some(Value::Map(entries)) => {
                    Ok(Value::list(entries.borrow().values().cloned().collect()))
                }
                _ => Err(arity_error("a map")),
            },
            "push" => match (args.first(), args.get(1)) {
                (Some(Value::List(items)), Some(value)) => {
                    items.borrow_mut().push(value.clone());
                    Ok(Value::List(Rc::clone(items)))
                }
                _ => Err(arity_error("(list, value)")),
            },
            "contains" => match (args.first(), args.get(1)) {
                (Some(Value::Str(s)), Some(Value::Str(needle))) => {
                    Ok(Value::Bool(s.contains(needle.as_str())))
                }
                (Some(Value::List(items)), Some(value)) => Ok(Value::Bool(
                    items.borrow().iter().any(|v| v.eq_value(value)),
                )),
                (Some(Value::Map(entries)), Some(Value::Str(key))) => {
                    Ok(Value::Bool(entries.borrow().contains_key(key)))
                }
                _ => Err(arity_error("(container, value)")),
            },
            "join" => match (args.first(), args.get(1)) {
                (Some(Value::List(items)), Some(Value::Str(sep))) => {
                    let joined = items
                        .borrow()
                        .iter()
                        .map(|v| v.display())
                        .collect::<Vec<_>>()
                        .join(sep);
                    Ok(Value::Str(joined))
                }
                _ => Err(arity_error("(list, separator)")),
            },
            "split" => match (args.first(), args.get(1)) {
                (Some(Value::Str(s)), Some(Value::Str(sep))) => Ok(Value::list(
                    s.split(sep.as_str())
                        .map(|part| Value::Str(part.to_string()))
                        .collect(),
                )),
                _ => Err(arity_error("(string, separator)")),
            },
            "upper" => match args.first() {
                Some(Value::Str(s)) => Ok(Value::Str(s.to_uppercase())),
                _ => Err(arity_error("a string")),
            },
            "lower" => match args.first() {
                Some(Value::Str(s)) => Ok(Value::Str(s.to_lowercase())),
                _ => Err(arity_error("a string")),
            },
            "trim" => match args.first() {
                Some(Value::Str(s)) => Ok(Value::Str(s.trim().to_string())),
                _ => Err(arity_error("a string")),
            },
            "format" => match args.split_first() {
                Some((Value::Str(template), rest)) => {
                    let mut out = String::new();
                    let mut values = rest.iter();
                    let mut remainder = template.as_str();
                    while let Some(pos) = remainder.find("{}") {
                        out.push_str(&remainder[..pos]);
                        match values.next() {
                            Some(value) => out.push_str(&value.display()),
                            None => out.push_str("{}"),
                        }
                        remainder = &remainder[pos + 2..];
                    }
                    out.push_str(remainder);
                    Ok(Value::Str(out))
                }
                _ => Err(arity_error("(template, values...)")),
            },
            "type_of" => Ok(Value::Str(
                args.first()
                    .map(|v| v.type_name().to_string())
                    .unwrap_or_else(|| "null".to_string()),
            )),
            "range" => {
                let (start, end) = match (args.first(), args.get(1)) {
                    (Some(Value::Int(end)), None) => (0, *end),
                    (Some(Value::Int(start)), Some(Value::Int(end))) => (*start, *end),
                    _ => return Err(arity_error("(end) or (start, end)")),
                };
                Ok(Value::list((start..end).map(Value::Int).collect()))
            }
            other => Err(ScriptError::runtime(
                line,
                format!("unknown function '{}'", other),
            )),
        }
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(v) => *v as f64,
        Value::Float(v) => *v,
        _ => 0.0,
    }
}

/// Lexical scope stack for one function invocation.
struct Frame<'a> {
    globals: &'a BTreeMap<String, Value>,
    scopes: Vec<BTreeMap<String, Value>>,
}

impl<'a> Frame<'a> {
    fn globals_ref(&self) -> &'a BTreeMap<String, Value> {
        self.globals
    }

    fn push_scope(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn set(&mut self, name: &str, value: Value) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return true;
            }
        }
        false
    }

    fn get(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(value.clone());
            }
        }
        self.globals.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn run(src: &str, arguments: serde_json::Value) -> Result<Json, ScriptError> {
        let script = parse(src).unwrap();
        let interp = Interpreter::new(
            Arc::new(NullHost),
            json!({"persona": "default", "tool_name": "test"}),
        );
        interp.run(&script, &arguments)
    }

    const GREETER: &str = r#"
class Greeter(Tool) {
    fn run(self, arguments) {
        let name = arguments["name"];
        if name == null { return "Hello, stranger!"; }
        return "Hello, " + str(name) + "!";
    }
}
"#;

    #[test]
    fn greeter_greets() {
        let result = run(GREETER, json!({"name": "World"})).unwrap();
        assert_eq!(result, json!("Hello, World!"));
        let fallback = run(GREETER, json!({})).unwrap();
        assert_eq!(fallback, json!("Hello, stranger!"));
    }

    #[test]
    fn loops_and_arithmetic() {
        let src = r#"
class Summer(Tool) {
    fn run(self, arguments) {
        let total = 0;
        for n in arguments["numbers"] { total = total + n; }
        return total;
    }
}
"#;
        let result = run(src, json!({"numbers": [1, 2, 3, 4]})).unwrap();
        assert_eq!(result, json!(10));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let src = r#"
class Divider(Tool) {
    fn run(self, arguments) {
        return arguments["a"] / arguments["b"];
    }
}
"#;
        let err = run(src, json!({"a": 1, "b": 0})).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn no_tool_class_is_rejected() {
        let err = run("class Helper { fn run(self, a) { return 1; } }", json!({}))
            .unwrap_err();
        assert!(matches!(err, ScriptError::NoToolClass));
    }

    #[test]
    fn two_tool_classes_are_ambiguous() {
        let src = "class A(Tool) { } class B(Tool) { }";
        let err = run(src, json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::AmbiguousToolClass { count: 2 }));
    }

    #[test]
    fn transitive_descendants_count() {
        let src = r#"
class Base(Tool) { }
class Child(Base) { fn run(self, a) { return "child"; } }
"#;
        // Both Base and Child descend from Tool, so this is ambiguous.
        let err = run(src, json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::AmbiguousToolClass { .. }));
    }

    #[test]
    fn missing_run_method_is_reported() {
        let err = run("class T(Tool) { }", json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::MissingRunMethod { .. }));
    }

    #[test]
    fn self_fields_and_helper_methods() {
        let src = r#"
class Counter(Tool) {
    fn bump(self, amount) {
        self.count = self.count + amount;
        return self.count;
    }
    fn run(self, arguments) {
        self.count = 0;
        self.bump(2);
        self.bump(3);
        return self.count;
    }
}
"#;
        assert_eq!(run(src, json!({})).unwrap(), json!(5));
    }

    #[test]
    fn context_is_visible_on_self() {
        let src = r#"
class WhoAmI(Tool) {
    fn run(self, arguments) {
        return self.context["tool_name"];
    }
}
"#;
        assert_eq!(run(src, json!({})).unwrap(), json!("test"));
    }

    #[test]
    fn builtins_work() {
        let src = r#"
class Builtins(Tool) {
    fn run(self, arguments) {
        let parts = split("a,b,c", ",");
        push(parts, upper("d"));
        return {
            joined: join(parts, "-"),
            count: len(parts),
            formatted: format("{} of {}", 2, 4)
        };
    }
}
"#;
        let result = run(src, json!({})).unwrap();
        assert_eq!(result["joined"], json!("a-b-c-D"));
        assert_eq!(result["count"], json!(4));
        assert_eq!(result["formatted"], json!("2 of 4"));
    }

    #[test]
    fn infinite_loops_hit_the_budget() {
        let src = r#"
class Spinner(Tool) {
    fn run(self, arguments) {
        while true { let x = 1; }
    }
}
"#;
        let script = parse(src).unwrap();
        let interp =
            Interpreter::new(Arc::new(NullHost), json!({})).with_budget(10_000);
        let err = interp.run(&script, &json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::BudgetExhausted { .. }));
    }

    #[test]
    fn call_tool_without_executor_fails_cleanly() {
        let src = r#"
class Chainer(Tool) {
    fn run(self, arguments) {
        return self.call_tool("other", {});
    }
}
"#;
        let err = run(src, json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::Host(_)));
    }

    #[test]
    fn complete_method_is_optional() {
        let script = parse(GREETER).unwrap();
        let interp = Interpreter::new(Arc::new(NullHost), json!({}));
        assert!(interp.complete(&script, "name", "Wo").unwrap().is_empty());

        let with_complete = parse(
            r#"
class C(Tool) {
    fn run(self, arguments) { return null; }
    fn complete(self, argument, value) { return [value + "rld"]; }
}
"#,
        )
        .unwrap();
        let suggestions = with_complete;
        let got = interp.complete(&suggestions, "name", "Wo").unwrap();
        assert_eq!(got, vec!["World".to_string()]);
    }
}
