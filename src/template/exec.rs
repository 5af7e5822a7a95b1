//! Evaluates a parsed template against a data value.

use std::cmp::Ordering;

use serde_json::Value;

use super::format::{display, is_truthy, kind, sorted_entries, sprintf};
use super::parse::{Branch, Command, Node, Operand, Pipeline, RangeNode};
use crate::config::MissingKeyPolicy;
use crate::error::ExecError;
use crate::funcs::FunctionRegistry;

static NULL: Value = Value::Null;

/// Largest integer `range` will count up to.
pub(crate) const MAX_RANGE_COUNT: u64 = 1_000_000;

pub(crate) fn execute(
    nodes: &[Node],
    data: &Value,
    functions: &FunctionRegistry,
    missing_key: MissingKeyPolicy,
) -> Result<String, ExecError> {
    let mut state = State {
        root: data,
        functions,
        missing_key,
        vars: Vec::new(),
        out: String::new(),
    };
    state.walk(nodes, data)?;
    Ok(state.out)
}

struct State<'a> {
    root: &'a Value,
    functions: &'a FunctionRegistry,
    missing_key: MissingKeyPolicy,
    vars: Vec<(String, Value)>,
    out: String,
}

impl State<'_> {
    fn walk(&mut self, nodes: &[Node], dot: &Value) -> Result<(), ExecError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    if pipe.binding.is_none() {
                        self.out.push_str(&display(&value));
                    }
                }
                Node::If(branch) => self.walk_if(branch, dot)?,
                Node::With(branch) => self.walk_with(branch, dot)?,
                Node::Range(range) => self.walk_range(range, dot)?,
            }
        }
        Ok(())
    }

    /// Walks `nodes`, dropping variables they declare once done.
    fn walk_scoped(&mut self, nodes: &[Node], dot: &Value) -> Result<(), ExecError> {
        let mark = self.vars.len();
        let result = self.walk(nodes, dot);
        self.vars.truncate(mark);
        result
    }

    fn walk_if(&mut self, branch: &Branch, dot: &Value) -> Result<(), ExecError> {
        let mark = self.vars.len();
        let condition = self.eval_pipeline(&branch.pipe, dot)?;
        let result = if is_truthy(&condition) {
            self.walk_scoped(&branch.then, dot)
        } else {
            self.walk_scoped(&branch.otherwise, dot)
        };
        self.vars.truncate(mark);
        result
    }

    fn walk_with(&mut self, branch: &Branch, dot: &Value) -> Result<(), ExecError> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(&branch.pipe, dot)?;
        let result = if is_truthy(&value) {
            self.walk_scoped(&branch.then, &value)
        } else {
            self.walk_scoped(&branch.otherwise, dot)
        };
        self.vars.truncate(mark);
        result
    }

    fn walk_range(&mut self, range: &RangeNode, dot: &Value) -> Result<(), ExecError> {
        let value = self.eval_pipeline(&range.pipe, dot)?;
        let line = range.pipe.line;
        match &value {
            Value::Array(elements) if !elements.is_empty() => {
                for (i, element) in elements.iter().enumerate() {
                    self.walk_iteration(range, Value::from(i), element)?;
                }
                Ok(())
            }
            Value::Object(map) if !map.is_empty() => {
                for (key, element) in sorted_entries(map) {
                    self.walk_iteration(range, Value::String(key.clone()), element)?;
                }
                Ok(())
            }
            Value::Array(_) | Value::Object(_) | Value::Null => self.walk_scoped(&range.otherwise, dot),
            Value::Number(n) if n.is_f64() => Err(ExecError::NotIterable { kind: "float", line }),
            Value::Number(n) => match n.as_i64() {
                Some(count) if count <= 0 => self.walk_scoped(&range.otherwise, dot),
                _ => {
                    let count = n.as_u64().unwrap_or(u64::MAX);
                    if count > MAX_RANGE_COUNT {
                        return Err(ExecError::RangeTooLarge {
                            count,
                            limit: MAX_RANGE_COUNT,
                            line,
                        });
                    }
                    for i in 0..count {
                        let i = Value::from(i);
                        self.walk_iteration(range, i.clone(), &i)?;
                    }
                    Ok(())
                }
            },
            other => Err(ExecError::NotIterable {
                kind: kind(other),
                line,
            }),
        }
    }

    /// Runs one pass of a range body with its loop variables bound.
    fn walk_iteration(&mut self, range: &RangeNode, index: Value, element: &Value) -> Result<(), ExecError> {
        let mark = self.vars.len();
        match range.vars.as_slice() {
            [only] => self.vars.push((only.clone(), element.clone())),
            [index_var, element_var] => {
                self.vars.push((index_var.clone(), index));
                self.vars.push((element_var.clone(), element.clone()));
            }
            _ => {}
        }
        let result = self.walk(&range.body, element);
        self.vars.truncate(mark);
        result
    }

    fn eval_pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, ExecError> {
        let mut value = None;
        for command in &pipe.commands {
            value = Some(self.eval_command(command, dot, value.take(), pipe.line)?);
        }
        let value = value.unwrap_or(Value::Null);

        if let Some(binding) = &pipe.binding {
            if binding.reassign {
                let existing = self.vars.iter_mut().rev().find(|(name, _)| *name == binding.name);
                if let Some((_, slot)) = existing {
                    *slot = value.clone();
                    return Ok(value);
                }
            }
            self.vars.push((binding.name.clone(), value.clone()));
        }
        Ok(value)
    }

    fn eval_command(
        &mut self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
        line: usize,
    ) -> Result<Value, ExecError> {
        match command {
            Command::Operand(operand) => self.eval_operand(operand, dot, line),
            Command::Call { name, args } => self.call(name, args, piped, dot, line),
        }
    }

    fn eval_operand(&mut self, operand: &Operand, dot: &Value, line: usize) -> Result<Value, ExecError> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(fields) => self.lookup_fields(dot, fields, line),
            Operand::Variable { name, fields } => {
                let base = self.variable(name).clone();
                self.lookup_fields(&base, fields, line)
            }
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Nested { pipe, fields } => {
                let value = self.eval_pipeline(pipe, dot)?;
                self.lookup_fields(&value, fields, line)
            }
        }
    }

    fn variable(&self, name: &str) -> &Value {
        if name.is_empty() {
            return self.root;
        }
        self.vars
            .iter()
            .rev()
            .find(|(var, _)| var == name)
            .map_or(&NULL, |(_, value)| value)
    }

    fn lookup_fields(&self, base: &Value, fields: &[String], line: usize) -> Result<Value, ExecError> {
        let mut current = base;
        for field in fields {
            current = match current {
                Value::Object(map) => match map.get(field) {
                    Some(value) => value,
                    None if self.missing_key == MissingKeyPolicy::Zero => return Ok(Value::Null),
                    None => {
                        return Err(ExecError::MissingField {
                            field: field.clone(),
                            line,
                        });
                    }
                },
                Value::Null if self.missing_key == MissingKeyPolicy::Zero => return Ok(Value::Null),
                other => {
                    return Err(ExecError::NotAnObject {
                        field: field.clone(),
                        kind: kind(other),
                        line,
                    });
                }
            };
        }
        Ok(current.clone())
    }

    fn call(
        &mut self,
        name: &str,
        operands: &[Operand],
        piped: Option<Value>,
        dot: &Value,
        line: usize,
    ) -> Result<Value, ExecError> {
        // Host functions shadow built-ins of the same name.
        let functions = self.functions;
        let host = functions.get(name);
        if host.is_none() && (name == "and" || name == "or") {
            return self.short_circuit(name == "and", operands, piped, dot, line);
        }

        let mut args = Vec::with_capacity(operands.len() + 1);
        for operand in operands {
            args.push(self.eval_operand(operand, dot, line)?);
        }
        args.extend(piped);

        if let Some(function) = host {
            return function.call(&args).map_err(|source| ExecError::Function {
                name: name.to_owned(),
                source,
                line,
            });
        }
        match builtin(name, &args) {
            Some(result) => result.map_err(|(name, reason)| ExecError::Builtin { name, reason, line }),
            None => Err(ExecError::Builtin {
                name: "call",
                reason: format!("function {name:?} not defined"),
                line,
            }),
        }
    }

    /// `and` returns the first false argument, `or` the first true one;
    /// later arguments are not evaluated.
    fn short_circuit(
        &mut self,
        is_and: bool,
        operands: &[Operand],
        piped: Option<Value>,
        dot: &Value,
        line: usize,
    ) -> Result<Value, ExecError> {
        let name = if is_and { "and" } else { "or" };
        if operands.is_empty() && piped.is_none() {
            return Err(ExecError::Builtin {
                name,
                reason: "wrong number of args: want at least 1, got 0".into(),
                line,
            });
        }
        let mut last = Value::Null;
        for operand in operands {
            last = self.eval_operand(operand, dot, line)?;
            if is_truthy(&last) != is_and {
                return Ok(last);
            }
        }
        Ok(piped.unwrap_or(last))
    }
}

type BuiltinResult = Result<Value, (&'static str, String)>;

fn builtin(name: &str, args: &[Value]) -> Option<BuiltinResult> {
    let result = match name {
        "not" => arity("not", args, 1).map(|()| Value::Bool(!is_truthy(&args[0]))),
        "len" => arity("len", args, 1).and_then(|()| length(&args[0])),
        "index" => index(args),
        "eq" => equal_any(args),
        "ne" => arity("ne", args, 2)
            .and_then(|()| values_equal(&args[0], &args[1]).map_err(|reason| ("ne", reason)))
            .map(|equal| Value::Bool(!equal)),
        "lt" => compare("lt", args, Ordering::is_lt),
        "le" => compare("le", args, Ordering::is_le),
        "gt" => compare("gt", args, Ordering::is_gt),
        "ge" => compare("ge", args, Ordering::is_ge),
        "print" => Ok(Value::String(sprint(args))),
        "println" => {
            let mut line = args.iter().map(display).collect::<Vec<_>>().join(" ");
            line.push('\n');
            Ok(Value::String(line))
        }
        "printf" => match args.split_first() {
            Some((Value::String(format), rest)) => sprintf(format, rest)
                .map(Value::String)
                .map_err(|reason| ("printf", reason)),
            Some((other, _)) => Err(("printf", format!("format must be a string, got {}", kind(other)))),
            None => Err(("printf", "wrong number of args: want at least 1, got 0".into())),
        },
        _ => return None,
    };
    Some(result)
}

fn arity(name: &'static str, args: &[Value], expected: usize) -> Result<(), (&'static str, String)> {
    if args.len() == expected {
        Ok(())
    } else {
        Err((name, format!("wrong number of args: want {expected}, got {}", args.len())))
    }
}

fn length(value: &Value) -> BuiltinResult {
    match value {
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(map) => Ok(Value::from(map.len())),
        other => Err(("len", format!("len of type {}", kind(other)))),
    }
}

fn index(args: &[Value]) -> BuiltinResult {
    let Some((item, keys)) = args.split_first() else {
        return Err(("index", "wrong number of args: want at least 1, got 0".into()));
    };
    let mut current = item;
    for key in keys {
        current = match (current, key) {
            (Value::Array(items), Value::Number(n)) => {
                let position = n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| ("index", format!("cannot index slice with {n}")))?;
                items
                    .get(position)
                    .ok_or_else(|| ("index", format!("index out of range: {position}")))?
            }
            (Value::Object(map), Value::String(k)) => match map.get(k) {
                Some(value) => value,
                None => return Ok(Value::Null),
            },
            (container, key) => {
                return Err((
                    "index",
                    format!("cannot index {} with {}", kind(container), kind(key)),
                ));
            }
        };
    }
    Ok(current.clone())
}

fn equal_any(args: &[Value]) -> BuiltinResult {
    let Some((first, rest)) = args.split_first() else {
        return Err(("eq", "missing argument for comparison".into()));
    };
    if rest.is_empty() {
        return Err(("eq", "missing argument for comparison".into()));
    }
    for other in rest {
        if values_equal(first, other).map_err(|reason| ("eq", reason))? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn values_equal(a: &Value, b: &Value) -> Result<bool, String> {
    match (a, b) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Number(_), Value::Number(_)) => Ok(numeric_order(a, b) == Some(Ordering::Equal)),
        (Value::String(x), Value::String(y)) => Ok(x == y),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            Err(format!("non-comparable types {} and {}", kind(a), kind(b)))
        }
        _ => Err(format!("incompatible types for comparison: {} and {}", kind(a), kind(b))),
    }
}

fn numeric_order(a: &Value, b: &Value) -> Option<Ordering> {
    let integer = |v: &Value| match v {
        Value::Number(n) => n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from)),
        _ => None,
    };
    match (integer(a), integer(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn compare(name: &'static str, args: &[Value], accept: fn(Ordering) -> bool) -> BuiltinResult {
    arity(name, args, 2)?;
    let ordering = match (&args[0], &args[1]) {
        (Value::Number(_), Value::Number(_)) => numeric_order(&args[0], &args[1]),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (a, b) => {
            return Err((
                name,
                format!("incompatible types for comparison: {} and {}", kind(a), kind(b)),
            ));
        }
    };
    let ordering = ordering.ok_or_else(|| (name, "values are not ordered".to_string()))?;
    Ok(Value::Bool(accept(ordering)))
}

/// Joins operands, adding spaces only between two non-string operands.
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !args[i - 1].is_string() && !arg.is_string() {
            out.push(' ');
        }
        out.push_str(&display(arg));
    }
    out
}
