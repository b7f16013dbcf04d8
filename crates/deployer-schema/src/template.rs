//! Text templating for build scripts and package recipes.
//!
//! Templates use `{{ ... }}` actions holding a pipeline: an operand (a field
//! path such as `.Vars.port`, a string/number/bool literal, or a function
//! call) optionally followed by `| fn args...` stages, where the piped value
//! is passed as the last argument. `{{-` and `-}}` trim adjacent whitespace,
//! `{{/* ... */}}` is a comment.
//!
//! The data root exposes `Env` (a snapshot of the process environment),
//! `Vars` (the effective profile variables) and `Profile` (the profile name).
//! Missing keys never fail: a missing `Env` entry renders as an empty string
//! and any other unresolved reference renders as [`UNRESOLVED`], which callers
//! scan for with [`unresolved_lines`].

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Rendered in place of a reference that resolved to nothing.
pub const UNRESOLVED: &str = "<no value>";

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "else", "end", "range", "with", "define", "template", "block", "break", "continue",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("line {line}: unclosed action")]
    Unclosed { line: usize },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: function \"{name}\" not defined")]
    UndefinedFunction { line: usize, name: String },
    #[error("line {line}: error calling {name}: {message}")]
    Call {
        line: usize,
        name: String,
        message: String,
    },
    #[error("line {line}: can't evaluate field {field} in type {kind}")]
    Field {
        line: usize,
        field: String,
        kind: &'static str,
    },
}

/// Read-only data a template is rendered against.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub env: &'a BTreeMap<String, String>,
    pub vars: &'a BTreeMap<String, Value>,
    pub profile: &'a str,
}

/// Capture the current process environment. Entries that are not valid
/// UTF-8 are skipped.
pub fn env_snapshot() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

pub fn render(src: &str, ctx: &RenderContext<'_>) -> Result<String, TemplateError> {
    let nodes = parse(src)?;
    let mut out = String::with_capacity(src.len());
    for node in &nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Action { line, pipeline } => {
                let value = eval_pipeline(pipeline, ctx, *line)?;
                write_value(&mut out, &value);
            }
        }
    }
    Ok(out)
}

/// 1-based line numbers and contents of rendered lines that still hold the
/// [`UNRESOLVED`] sentinel.
pub fn unresolved_lines(rendered: &str) -> Vec<(usize, &str)> {
    rendered
        .lines()
        .enumerate()
        .filter(|(_, line)| line.contains(UNRESOLVED))
        .map(|(i, line)| (i + 1, line))
        .collect()
}

#[derive(Debug)]
enum Node {
    Text(String),
    Action {
        line: usize,
        pipeline: Vec<Vec<Token>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    Field(Vec<String>),
    Str(String),
    Number(Number),
    Bool(bool),
    Ident(String),
    Pipe,
}

fn parse(src: &str) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    let mut rest = src;
    let mut line = 1;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let body = &rest[start + 2..];
        let trim_left =
            body.starts_with('-') && body[1..].starts_with(|c: char| c.is_ascii_whitespace());

        let mut text = &rest[..start];
        if trim_next {
            text = text.trim_start();
        }
        if trim_left {
            text = text.trim_end();
        }
        if !text.is_empty() {
            nodes.push(Node::Text(text.to_owned()));
        }
        line += rest[..start].matches('\n').count();
        let action_line = line;

        let end = find_action_end(body).ok_or(TemplateError::Unclosed { line: action_line })?;
        let mut content = &body[..end];
        if trim_left {
            content = &content[1..];
        }
        trim_next = content.ends_with('-')
            && content[..content.len() - 1].ends_with(|c: char| c.is_ascii_whitespace());
        if trim_next {
            content = &content[..content.len() - 1];
        }
        line += body[..end].matches('\n').count();
        rest = &body[end + 2..];

        let content = content.trim();
        if content.len() >= 4 && content.starts_with("/*") && content.ends_with("*/") {
            continue;
        }
        let pipeline = split_pipeline(lex(content, action_line)?, action_line)?;
        nodes.push(Node::Action {
            line: action_line,
            pipeline,
        });
    }

    let text = if trim_next { rest.trim_start() } else { rest };
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_owned()));
    }
    Ok(nodes)
}

/// Byte offset of the closing `}}`, skipping over quoted strings.
fn find_action_end(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '`' => quote = Some(c),
            None if body[i..].starts_with("}}") => return Some(i),
            None => {}
        }
    }
    None
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.src[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.src[start..self.pos]
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn lex(src: &str, line: usize) -> Result<Vec<Token>, TemplateError> {
    let syntax = |message: String| TemplateError::Syntax { line, message };
    let mut cur = Cursor { src, pos: 0 };
    let mut tokens = Vec::new();

    while let Some(c) = cur.peek() {
        match c {
            c if c.is_whitespace() => {
                cur.bump();
            }
            '|' => {
                cur.bump();
                tokens.push(Token::Pipe);
            }
            '"' => {
                cur.bump();
                tokens.push(Token::Str(lex_quoted(&mut cur, line)?));
            }
            '`' => {
                cur.bump();
                let raw = cur.take_while(|c| c != '`').to_owned();
                if cur.bump().is_none() {
                    return Err(syntax("unterminated raw string".to_owned()));
                }
                tokens.push(Token::Str(raw));
            }
            '.' => {
                let mut path = Vec::new();
                while cur.peek() == Some('.') && cur.peek_second().is_some_and(is_ident_char) {
                    cur.bump();
                    path.push(cur.take_while(is_ident_char).to_owned());
                }
                if path.is_empty() {
                    cur.bump();
                    tokens.push(Token::Dot);
                } else {
                    tokens.push(Token::Field(path));
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let literal = cur.take_while(|c| c.is_ascii_digit() || c == '-' || c == '.');
                let number = literal
                    .parse::<i64>()
                    .ok()
                    .map(Number::from)
                    .or_else(|| literal.parse::<f64>().ok().and_then(Number::from_f64))
                    .ok_or_else(|| syntax(format!("bad number syntax: {literal:?}")))?;
                tokens.push(Token::Number(number));
            }
            c if is_ident_char(c) => {
                let ident = cur.take_while(is_ident_char);
                match ident {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    kw if CONTROL_KEYWORDS.contains(&kw) => {
                        return Err(syntax(format!("unsupported action {kw:?}")));
                    }
                    name => tokens.push(Token::Ident(name.to_owned())),
                }
            }
            other => return Err(syntax(format!("unexpected {other:?} in action"))),
        }
    }
    Ok(tokens)
}

fn lex_quoted(cur: &mut Cursor<'_>, line: usize) -> Result<String, TemplateError> {
    let mut out = String::new();
    loop {
        match cur.bump() {
            None => {
                return Err(TemplateError::Syntax {
                    line,
                    message: "unterminated quoted string".to_owned(),
                })
            }
            Some('"') => return Ok(out),
            Some('\\') => match cur.bump() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(c @ ('\\' | '"')) => out.push(c),
                other => {
                    return Err(TemplateError::Syntax {
                        line,
                        message: format!("invalid escape {other:?} in quoted string"),
                    })
                }
            },
            Some(c) => out.push(c),
        }
    }
}

fn split_pipeline(tokens: Vec<Token>, line: usize) -> Result<Vec<Vec<Token>>, TemplateError> {
    if tokens.is_empty() {
        return Err(TemplateError::Syntax {
            line,
            message: "missing value for command".to_owned(),
        });
    }
    let mut commands = vec![Vec::new()];
    for token in tokens {
        if token == Token::Pipe {
            commands.push(Vec::new());
        } else if let Some(last) = commands.last_mut() {
            last.push(token);
        }
    }
    if commands.iter().any(Vec::is_empty) {
        return Err(TemplateError::Syntax {
            line,
            message: "missing command in pipeline".to_owned(),
        });
    }
    Ok(commands)
}

fn eval_pipeline(
    pipeline: &[Vec<Token>],
    ctx: &RenderContext<'_>,
    line: usize,
) -> Result<Value, TemplateError> {
    let mut piped: Option<Value> = None;
    for (stage, command) in pipeline.iter().enumerate() {
        let value = if let Token::Ident(name) = &command[0] {
            let mut args = command[1..]
                .iter()
                .map(|t| eval_operand(t, ctx, line))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(prev) = piped.take() {
                args.push(prev);
            }
            call(name, &args, line)?
        } else {
            if stage > 0 {
                return Err(TemplateError::Syntax {
                    line,
                    message: format!("non executable command in pipeline stage {}", stage + 1),
                });
            }
            if command.len() > 1 {
                return Err(TemplateError::Syntax {
                    line,
                    message: "can't give argument to non-function".to_owned(),
                });
            }
            eval_operand(&command[0], ctx, line)?
        };
        piped = Some(value);
    }
    Ok(piped.unwrap_or(Value::Null))
}

fn eval_operand(token: &Token, ctx: &RenderContext<'_>, line: usize) -> Result<Value, TemplateError> {
    match token {
        Token::Dot => {
            let mut root = Map::new();
            root.insert("Env".to_owned(), env_object(ctx.env));
            root.insert("Vars".to_owned(), vars_object(ctx.vars));
            root.insert("Profile".to_owned(), Value::String(ctx.profile.to_owned()));
            Ok(Value::Object(root))
        }
        Token::Field(path) => lookup(path, ctx, line),
        Token::Str(s) => Ok(Value::String(s.clone())),
        Token::Number(n) => Ok(Value::Number(n.clone())),
        Token::Bool(b) => Ok(Value::Bool(*b)),
        Token::Ident(name) => call(name, &[], line),
        Token::Pipe => Err(TemplateError::Syntax {
            line,
            message: "unexpected '|'".to_owned(),
        }),
    }
}

fn env_object(env: &BTreeMap<String, String>) -> Value {
    Value::Object(
        env.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn vars_object(vars: &BTreeMap<String, Value>) -> Value {
    Value::Object(vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn lookup(path: &[String], ctx: &RenderContext<'_>, line: usize) -> Result<Value, TemplateError> {
    let Some((head, tail)) = path.split_first() else {
        return Ok(Value::Null);
    };
    match head.as_str() {
        "Env" => match tail {
            [] => Ok(env_object(ctx.env)),
            [key] => Ok(Value::String(ctx.env.get(key).cloned().unwrap_or_default())),
            [_, field, ..] => Err(TemplateError::Field {
                line,
                field: field.clone(),
                kind: "string",
            }),
        },
        "Vars" => match tail.split_first() {
            None => Ok(vars_object(ctx.vars)),
            Some((key, rest)) => match ctx.vars.get(key) {
                Some(value) => descend(value, rest, line),
                None => Ok(Value::Null),
            },
        },
        "Profile" => match tail.first() {
            None => Ok(Value::String(ctx.profile.to_owned())),
            Some(field) => Err(TemplateError::Field {
                line,
                field: field.clone(),
                kind: "string",
            }),
        },
        _ => Ok(Value::Null),
    }
}

fn descend(value: &Value, fields: &[String], line: usize) -> Result<Value, TemplateError> {
    let mut current = Some(value);
    for field in fields {
        current = match current {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => map.get(field),
            Some(other) => {
                return Err(TemplateError::Field {
                    line,
                    field: field.clone(),
                    kind: kind_name(other),
                })
            }
        };
    }
    Ok(current.cloned().unwrap_or(Value::Null))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str(UNRESOLVED),
        other => out.push_str(&text(other)),
    }
}

/// String form of a value as seen by helper functions; nothing renders empty.
fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() < f64::EPSILON),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn call(name: &str, args: &[Value], line: usize) -> Result<Value, TemplateError> {
    let arity = |want: usize| {
        if args.len() == want {
            Ok(())
        } else {
            Err(TemplateError::Call {
                line,
                name: name.to_owned(),
                message: format!("wrong number of args: want {want} got {}", args.len()),
            })
        }
    };

    let out = match name {
        "upper" => {
            arity(1)?;
            Value::String(text(&args[0]).to_uppercase())
        }
        "lower" => {
            arity(1)?;
            Value::String(text(&args[0]).to_lowercase())
        }
        "trim" => {
            arity(1)?;
            Value::String(text(&args[0]).trim().to_owned())
        }
        "trimPrefix" => {
            arity(2)?;
            let (prefix, s) = (text(&args[0]), text(&args[1]));
            Value::String(s.strip_prefix(prefix.as_str()).unwrap_or(s.as_str()).to_owned())
        }
        "trimSuffix" => {
            arity(2)?;
            let (suffix, s) = (text(&args[0]), text(&args[1]));
            Value::String(s.strip_suffix(suffix.as_str()).unwrap_or(s.as_str()).to_owned())
        }
        "replace" => {
            arity(3)?;
            Value::String(text(&args[2]).replace(&text(&args[0]), &text(&args[1])))
        }
        "quote" => {
            arity(1)?;
            let s = text(&args[0]).replace('\\', "\\\\").replace('"', "\\\"");
            Value::String(format!("\"{s}\""))
        }
        "default" => {
            arity(2)?;
            if is_empty(&args[1]) {
                args[0].clone()
            } else {
                args[1].clone()
            }
        }
        "join" => {
            arity(2)?;
            let sep = text(&args[0]);
            match &args[1] {
                Value::Array(items) => {
                    Value::String(items.iter().map(text).collect::<Vec<_>>().join(&sep))
                }
                other => Value::String(text(other)),
            }
        }
        "toJson" => {
            arity(1)?;
            Value::String(args[0].to_string())
        }
        "index" => {
            let Some((collection, keys)) = args.split_first() else {
                return Err(TemplateError::Call {
                    line,
                    name: name.to_owned(),
                    message: "wrong number of args: want at least 1 got 0".to_owned(),
                });
            };
            index(collection, keys).map_err(|message| TemplateError::Call {
                line,
                name: name.to_owned(),
                message,
            })?
        }
        _ => {
            return Err(TemplateError::UndefinedFunction {
                line,
                name: name.to_owned(),
            })
        }
    };
    Ok(out)
}

fn index(collection: &Value, keys: &[Value]) -> Result<Value, String> {
    let mut current = collection;
    for key in keys {
        current = match (current, key) {
            (Value::Null, _) => return Ok(Value::Null),
            (Value::Object(map), Value::String(k)) => match map.get(k) {
                Some(v) => v,
                None => return Ok(Value::Null),
            },
            (Value::Array(items), Value::Number(n)) => {
                let idx = n
                    .as_u64()
                    .ok_or_else(|| format!("cannot index list with {n}"))?;
                items
                    .get(idx as usize)
                    .ok_or_else(|| format!("index out of range: {idx}"))?
            }
            (container, key) => {
                return Err(format!(
                    "cannot index {} with {}",
                    kind_name(container),
                    kind_name(key)
                ))
            }
        };
    }
    Ok(current.clone())
}
