//! Builds the template tree from lexed items.
//!
//! Function names and variables are resolved here so that a template
//! referring to an unknown function or an undeclared variable never
//! compiles.

use serde_json::{Number, Value};

use super::lexer::{Item, Lexeme, Token};
use crate::error::ParseError;
use crate::funcs::FunctionRegistry;

const KEYWORDS: &[&str] = &[
    "if", "else", "end", "range", "with", "define", "template", "block", "break", "continue",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If(Branch),
    With(Branch),
    Range(RangeNode),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub pipe: Pipeline,
    pub then: Vec<Node>,
    pub otherwise: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RangeNode {
    /// `$index, $element` or `$element` alone.
    pub vars: Vec<String>,
    pub pipe: Pipeline,
    pub body: Vec<Node>,
    pub otherwise: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub line: usize,
    pub binding: Option<Binding>,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Binding {
    pub name: String,
    /// `=` rather than `:=`.
    pub reassign: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    /// A single operand, evaluated as-is.
    Operand(Operand),
    Call { name: String, args: Vec<Operand> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Dot,
    Field(Vec<String>),
    Variable { name: String, fields: Vec<String> },
    Literal(Value),
    Nested { pipe: Box<Pipeline>, fields: Vec<String> },
}

#[derive(Debug)]
enum Terminator {
    End,
    Else(Vec<Lexeme>),
    Eof,
}

pub(crate) fn parse(items: Vec<Item>, functions: &FunctionRegistry) -> Result<Vec<Node>, ParseError> {
    let mut parser = Parser {
        items: items.into_iter(),
        functions,
        scopes: vec![vec![String::new()]],
        last_line: 1,
    };
    let (nodes, terminator) = parser.parse_list()?;
    match terminator {
        Terminator::Eof => Ok(nodes),
        Terminator::End => Err(ParseError::new(parser.last_line, "unexpected {{end}}")),
        Terminator::Else(_) => Err(ParseError::new(parser.last_line, "unexpected {{else}}")),
    }
}

struct Parser<'a> {
    items: std::vec::IntoIter<Item>,
    functions: &'a FunctionRegistry,
    /// Variables visible at each nesting level; `$` is always declared.
    scopes: Vec<Vec<String>>,
    last_line: usize,
}

impl Parser<'_> {
    fn parse_list(&mut self) -> Result<(Vec<Node>, Terminator), ParseError> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            let (tokens, line) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { tokens, line } => (tokens, line),
            };
            self.last_line = line;

            let keyword = match &tokens[0].token {
                Token::Ident(name) if KEYWORDS.contains(&name.as_str()) => Some(name.clone()),
                _ => None,
            };
            let rest = tokens[1..].to_vec();
            match keyword.as_deref() {
                Some("end") => {
                    expect_empty(&rest, line, "end")?;
                    return Ok((nodes, Terminator::End));
                }
                Some("else") => return Ok((nodes, Terminator::Else(rest))),
                Some("if") => nodes.push(Node::If(self.parse_branch(rest, line, "if")?)),
                Some("with") => nodes.push(Node::With(self.parse_branch(rest, line, "with")?)),
                Some("range") => nodes.push(Node::Range(self.parse_range(rest, line)?)),
                Some(other) => {
                    return Err(ParseError::new(line, format!("{{{{{other}}}}} is not supported")));
                }
                None => {
                    let pipe = self.parse_pipeline(&tokens, line, false)?;
                    if let Some(binding) = &pipe.binding {
                        if !binding.reassign {
                            self.declare(&binding.name);
                        }
                    }
                    nodes.push(Node::Action(pipe));
                }
            }
        }
        Ok((nodes, Terminator::Eof))
    }

    /// Parses a nested list in its own variable scope.
    fn parse_scoped(&mut self) -> Result<(Vec<Node>, Terminator), ParseError> {
        self.scopes.push(Vec::new());
        let result = self.parse_list();
        self.scopes.pop();
        result
    }

    fn parse_branch(&mut self, tokens: Vec<Lexeme>, line: usize, keyword: &str) -> Result<Branch, ParseError> {
        if tokens.is_empty() {
            return Err(ParseError::new(line, format!("missing value for {keyword}")));
        }
        self.scopes.push(Vec::new());
        let result = self.parse_branch_body(&tokens, line, keyword);
        self.scopes.pop();
        result
    }

    fn parse_branch_body(&mut self, tokens: &[Lexeme], line: usize, keyword: &str) -> Result<Branch, ParseError> {
        let pipe = self.parse_pipeline(tokens, line, false)?;
        if let Some(binding) = &pipe.binding {
            self.declare(&binding.name);
        }
        let (then, terminator) = self.parse_scoped()?;
        let otherwise = match terminator {
            Terminator::End => Vec::new(),
            Terminator::Eof => return Err(unexpected_eof(self.last_line, keyword)),
            Terminator::Else(rest) if rest.is_empty() => self.parse_else_body(keyword)?,
            Terminator::Else(rest) => {
                // `{{else if ...}}` / `{{else with ...}}` chain into a nested branch
                // that shares this branch's `{{end}}`.
                match rest.first().map(|lexeme| &lexeme.token) {
                    Some(Token::Ident(name)) if name == keyword && keyword != "range" => {
                        let nested = self.parse_branch(rest[1..].to_vec(), self.last_line, keyword)?;
                        vec![if keyword == "if" {
                            Node::If(nested)
                        } else {
                            Node::With(nested)
                        }]
                    }
                    _ => {
                        return Err(ParseError::new(
                            self.last_line,
                            format!("unexpected tokens after {{{{else}}}} in {keyword}"),
                        ));
                    }
                }
            }
        };
        Ok(Branch { pipe, then, otherwise })
    }

    fn parse_else_body(&mut self, keyword: &str) -> Result<Vec<Node>, ParseError> {
        let (nodes, terminator) = self.parse_scoped()?;
        match terminator {
            Terminator::End => Ok(nodes),
            Terminator::Eof => Err(unexpected_eof(self.last_line, keyword)),
            Terminator::Else(_) => Err(ParseError::new(
                self.last_line,
                format!("expected {{{{end}}}}; found {{{{else}}}} in {keyword}"),
            )),
        }
    }

    fn parse_range(&mut self, tokens: Vec<Lexeme>, line: usize) -> Result<RangeNode, ParseError> {
        if tokens.is_empty() {
            return Err(ParseError::new(line, "missing value for range"));
        }
        let (vars, rest) = split_range_vars(&tokens, line)?;
        let pipe = self.parse_pipeline(rest, line, true)?;

        self.scopes.push(vars.clone());
        let body = self.parse_list();
        self.scopes.pop();
        let (body, terminator) = body?;

        let otherwise = match terminator {
            Terminator::End => Vec::new(),
            Terminator::Eof => return Err(unexpected_eof(self.last_line, "range")),
            Terminator::Else(rest) if rest.is_empty() => self.parse_else_body("range")?,
            Terminator::Else(_) => {
                return Err(ParseError::new(
                    self.last_line,
                    "unexpected tokens after {{else}} in range",
                ));
            }
        };
        Ok(RangeNode {
            vars,
            pipe,
            body,
            otherwise,
        })
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_owned());
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.iter().any(|var| var == name))
    }

    fn parse_pipeline(&self, tokens: &[Lexeme], line: usize, in_range: bool) -> Result<Pipeline, ParseError> {
        let (binding, tokens) = match tokens {
            [
                Lexeme { token: Token::Variable(name, fields), .. },
                Lexeme { token: op @ (Token::Declare | Token::Assign), .. },
                rest @ ..,
            ] if fields.is_empty() => {
                let reassign = *op == Token::Assign;
                if reassign && !self.is_declared(name) {
                    return Err(ParseError::new(line, format!("undefined variable: ${name}")));
                }
                let binding = Binding {
                    name: name.clone(),
                    reassign,
                };
                (Some(binding), rest)
            }
            _ => (None, tokens),
        };
        if in_range && binding.is_some() {
            return Err(ParseError::new(line, "range can only initialize variables"));
        }
        if tokens.is_empty() {
            return Err(ParseError::new(line, "missing value for command"));
        }

        let mut commands = Vec::new();
        for (position, stage) in split_stages(tokens).into_iter().enumerate() {
            if stage.is_empty() {
                return Err(ParseError::new(line, "missing command in pipeline"));
            }
            let command = self.parse_command(stage, line)?;
            if position > 0 && matches!(command, Command::Operand(_)) {
                return Err(ParseError::new(line, "non-function in pipeline stage"));
            }
            commands.push(command);
        }

        Ok(Pipeline {
            line,
            binding,
            commands,
        })
    }

    fn parse_command(&self, tokens: &[Lexeme], line: usize) -> Result<Command, ParseError> {
        let mut operands = Vec::new();
        let mut i = 0;
        let mut call = None;
        while i < tokens.len() {
            match &tokens[i].token {
                Token::Ident(name) if i == 0 && !is_literal_ident(name) => {
                    if KEYWORDS.contains(&name.as_str()) {
                        return Err(ParseError::new(line, format!("unexpected keyword {name}")));
                    }
                    if !self.functions.contains(name) {
                        return Err(ParseError::new(line, format!("function \"{name}\" not defined")));
                    }
                    call = Some(name.clone());
                    i += 1;
                }
                _ => {
                    let (operand, next) = self.parse_operand(tokens, i, line)?;
                    operands.push(operand);
                    i = next;
                }
            }
        }

        match call {
            Some(name) => Ok(Command::Call { name, args: operands }),
            None if operands.len() == 1 => Ok(Command::Operand(operands.remove(0))),
            None => Err(ParseError::new(line, "can't give argument to non-function")),
        }
    }

    fn parse_operand(&self, tokens: &[Lexeme], i: usize, line: usize) -> Result<(Operand, usize), ParseError> {
        let operand = match &tokens[i].token {
            Token::Dot => Operand::Dot,
            Token::Field(fields) => Operand::Field(fields.clone()),
            Token::Variable(name, fields) => {
                if !self.is_declared(name) {
                    return Err(ParseError::new(line, format!("undefined variable: ${name}")));
                }
                Operand::Variable {
                    name: name.clone(),
                    fields: fields.clone(),
                }
            }
            Token::Str(text) => Operand::Literal(Value::String(text.clone())),
            Token::Number(text) => Operand::Literal(parse_number(text, line)?),
            Token::Ident(name) => match name.as_str() {
                "true" => Operand::Literal(Value::Bool(true)),
                "false" => Operand::Literal(Value::Bool(false)),
                "nil" => Operand::Literal(Value::Null),
                other if KEYWORDS.contains(&other) => {
                    return Err(ParseError::new(line, format!("unexpected keyword {other}")));
                }
                other => {
                    return Err(ParseError::new(
                        line,
                        format!("function \"{other}\" must be the first word of a command"),
                    ));
                }
            },
            Token::LeftParen => return self.parse_nested(tokens, i, line),
            Token::RightParen => return Err(ParseError::new(line, "unexpected right paren")),
            Token::Pipe | Token::Declare | Token::Assign | Token::Comma => {
                return Err(ParseError::new(line, "unexpected token in operand"));
            }
        };
        Ok((operand, i + 1))
    }

    fn parse_nested(&self, tokens: &[Lexeme], open: usize, line: usize) -> Result<(Operand, usize), ParseError> {
        let mut depth = 0usize;
        let mut close = None;
        for (offset, lexeme) in tokens[open..].iter().enumerate() {
            match lexeme.token {
                Token::LeftParen => depth += 1,
                Token::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(open + offset);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| ParseError::new(line, "unclosed left paren"))?;
        let inner = &tokens[open + 1..close];
        if matches!(inner.get(1).map(|lexeme| &lexeme.token), Some(Token::Declare | Token::Assign)) {
            return Err(ParseError::new(line, "variable declarations are not allowed in parentheses"));
        }
        let pipe = self.parse_pipeline(inner, line, false)?;

        let mut next = close + 1;
        let mut fields = Vec::new();
        if let Some(Lexeme {
            token: Token::Field(chain),
            glued: true,
        }) = tokens.get(next)
        {
            fields = chain.clone();
            next += 1;
        }
        Ok((
            Operand::Nested {
                pipe: Box::new(pipe),
                fields,
            },
            next,
        ))
    }
}

/// Splits a pipeline on `|`, ignoring pipes inside parentheses.
fn split_stages(tokens: &[Lexeme]) -> Vec<&[Lexeme]> {
    let mut stages = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, lexeme) in tokens.iter().enumerate() {
        match lexeme.token {
            Token::LeftParen => depth += 1,
            Token::RightParen => depth = depth.saturating_sub(1),
            Token::Pipe if depth == 0 => {
                stages.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    stages.push(&tokens[start..]);
    stages
}

/// Splits `$i, $e :=` or `$e :=` off the front of a range action.
fn split_range_vars(tokens: &[Lexeme], line: usize) -> Result<(Vec<String>, &[Lexeme]), ParseError> {
    let plain_var = |lexeme: &Lexeme| match &lexeme.token {
        Token::Variable(name, fields) if fields.is_empty() && !name.is_empty() => Some(name.clone()),
        _ => None,
    };
    let token = |i: usize| tokens.get(i).map(|lexeme| &lexeme.token);

    if let (Some(first), Some(Token::Comma)) = (tokens.first().and_then(plain_var), token(1)) {
        let second = tokens
            .get(2)
            .and_then(plain_var)
            .ok_or_else(|| ParseError::new(line, "range can only initialize variables"))?;
        if token(3) != Some(&Token::Declare) {
            return Err(ParseError::new(line, "range variables must be declared with :="));
        }
        return Ok((vec![first, second], &tokens[4..]));
    }
    if let (Some(only), Some(Token::Declare)) = (tokens.first().and_then(plain_var), token(1)) {
        return Ok((vec![only], &tokens[2..]));
    }
    Ok((Vec::new(), tokens))
}

fn is_literal_ident(name: &str) -> bool {
    matches!(name, "true" | "false" | "nil")
}

fn expect_empty(rest: &[Lexeme], line: usize, keyword: &str) -> Result<(), ParseError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ParseError::new(line, format!("unexpected tokens in {{{{{keyword}}}}}")))
    }
}

fn unexpected_eof(line: usize, keyword: &str) -> ParseError {
    ParseError::new(line, format!("unexpected EOF: {{{{{keyword}}}}} is missing its {{{{end}}}}"))
}

fn parse_number(text: &str, line: usize) -> Result<Value, ParseError> {
    let clean = text.replace('_', "");
    let (negative, digits) = match clean.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, clean.strip_prefix('+').unwrap_or(&clean)),
    };
    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"));
    if let Some(hex) = hex {
        let magnitude = i64::from_str_radix(hex, 16)
            .map_err(|_| ParseError::new(line, format!("bad number syntax: {text:?}")))?;
        return Ok(Value::from(if negative { -magnitude } else { magnitude }));
    }
    if let Ok(int) = clean.parse::<i64>() {
        return Ok(Value::from(int));
    }
    clean
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| ParseError::new(line, format!("bad number syntax: {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::lexer::lex;
    use rstest::rstest;

    fn parse_source(source: &str) -> Result<Vec<Node>, ParseError> {
        let mut functions = FunctionRegistry::new();
        functions.register("lower", |args: &[Value]| Ok(args[0].clone()));
        parse(lex(source)?, &functions)
    }

    #[test]
    fn else_if_nests_inside_the_else_branch() {
        let nodes = parse_source("{{if .A}}a{{else if .B}}b{{else}}c{{end}}").unwrap();
        let [Node::If(branch)] = nodes.as_slice() else {
            panic!("expected a single if, got {nodes:?}");
        };
        assert_eq!(branch.then, vec![Node::Text("a".into())]);
        let [Node::If(nested)] = branch.otherwise.as_slice() else {
            panic!("expected nested if");
        };
        assert_eq!(nested.otherwise, vec![Node::Text("c".into())]);
    }

    #[test]
    fn pipelines_split_into_commands() {
        let nodes = parse_source("{{.Name | lower | printf \"%s!\"}}").unwrap();
        let [Node::Action(pipe)] = nodes.as_slice() else {
            panic!("expected action");
        };
        assert_eq!(pipe.commands.len(), 3);
        assert_eq!(pipe.commands[0], Command::Operand(Operand::Field(vec!["Name".into()])));
    }

    #[test]
    fn range_declares_its_variables() {
        let nodes = parse_source("{{range $i, $e := .L}}{{$i}}={{$e}}{{end}}").unwrap();
        let [Node::Range(range)] = nodes.as_slice() else {
            panic!("expected range");
        };
        assert_eq!(range.vars, vec!["i".to_string(), "e".to_string()]);
    }

    #[test]
    fn nested_pipelines_accept_trailing_fields() {
        let nodes = parse_source("{{(index .L 0).Name}}").unwrap();
        let [Node::Action(pipe)] = nodes.as_slice() else {
            panic!("expected action");
        };
        let Command::Operand(Operand::Nested { fields, .. }) = &pipe.commands[0] else {
            panic!("expected nested operand");
        };
        assert_eq!(fields, &vec!["Name".to_string()]);
    }

    #[test]
    fn pipes_inside_parentheses_stay_nested() {
        let nodes = parse_source("{{printf \"%s\" (.Name | lower)}}").unwrap();
        let [Node::Action(pipe)] = nodes.as_slice() else {
            panic!("expected action");
        };
        assert_eq!(pipe.commands.len(), 1);
    }

    #[test]
    fn numbers_parse_to_json_values() {
        assert_eq!(parse_number("42", 1).unwrap(), Value::from(42));
        assert_eq!(parse_number("-0x10", 1).unwrap(), Value::from(-16));
        assert_eq!(parse_number("1.5", 1).unwrap(), Value::from(1.5));
        assert_eq!(parse_number("1e3", 1).unwrap(), Value::from(1000.0));
    }

    #[rstest]
    #[case("{{frobnicate .X}}", "function \"frobnicate\" not defined")]
    #[case("{{if .X}}never closed", "unexpected EOF: {{if}} is missing its {{end}}")]
    #[case("stray {{end}}", "unexpected {{end}}")]
    #[case("{{else}}", "unexpected {{else}}")]
    #[case("{{$x}}", "undefined variable: $x")]
    #[case("{{$x = 1}}", "undefined variable: $x")]
    #[case("{{.A .B}}", "can't give argument to non-function")]
    #[case("{{.A | .B}}", "non-function in pipeline stage")]
    #[case("{{template \"x\"}}", "{{template}} is not supported")]
    #[case("{{range .L}}{{else}}a{{else}}b{{end}}", "expected {{end}}; found {{else}} in range")]
    #[case("{{(len .L}}", "unclosed left paren")]
    fn rejects_malformed_templates(#[case] source: &str, #[case] reason: &str) {
        let err = parse_source(source).unwrap_err();
        assert_eq!(err.reason, reason);
    }

    #[test]
    fn variables_go_out_of_scope_at_end() {
        let err = parse_source("{{with .A}}{{$x := 1}}{{end}}{{$x}}").unwrap_err();
        assert_eq!(err.reason, "undefined variable: $x");
    }

    #[test]
    fn root_variable_is_always_declared() {
        assert!(parse_source("{{range .L}}{{$.Title}}{{end}}").is_ok());
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse_source("line one\nline two {{nope}}").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
