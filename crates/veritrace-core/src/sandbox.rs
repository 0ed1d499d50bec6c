//! Allow-list code runner.
//!
//! Snippets are not evaluated by a general interpreter. A snippet is a
//! sequence of statements separated by newlines or `;`, each a call of the
//! form `op(arg)` where `arg` is a JSON literal or another call:
//!
//! ```text
//! # comments are ignored
//! sha256("All verdicts reviewed.")
//! print(json_format({"status": "ok"}))
//! ```
//!
//! Only operations registered in the runner exist. Each top-level statement
//! writes its value to the captured output, one line per statement.

use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use thiserror::Error;

/// Output when a snippet runs but writes nothing.
pub const NO_OUTPUT_MESSAGE: &str = "Code executed successfully but produced no output.";

const MAX_SNIPPET_BYTES: usize = 64 * 1024;
const MAX_DEPTH: usize = 16;

/// Errors raised while running a snippet.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("operation '{0}' is not allowed")]
    UnknownOperation(String),

    #[error("syntax error at byte {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("{op} expects {expected}")]
    Type { op: &'static str, expected: &'static str },

    #[error("snippet exceeds {0} bytes")]
    TooLarge(usize),

    #[error("calls nested deeper than {0}")]
    TooDeep(usize),
}

type Operation = fn(Value) -> Result<Value, SandboxError>;

/// Runs snippets against a fixed registry of pure operations.
#[derive(Debug, Clone)]
pub struct SandboxedCodeRunner {
    operations: BTreeMap<&'static str, Operation>,
}

impl SandboxedCodeRunner {
    /// Runner with the standard operations.
    pub fn new() -> Self {
        let mut operations: BTreeMap<&'static str, Operation> = BTreeMap::new();
        operations.insert("sha256", op_sha256);
        operations.insert("sha512", op_sha512);
        operations.insert("json_format", op_json_format);
        operations.insert("json_compact", op_json_compact);
        operations.insert("len", op_len);
        operations.insert("upper", op_upper);
        operations.insert("lower", op_lower);
        operations.insert("print", Ok);
        Self { operations }
    }

    /// Names of the allowed operations.
    pub fn operations(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.operations.keys().copied()
    }

    /// Run a snippet and return captured output. Never fails.
    pub fn run(&self, snippet: &str) -> String {
        match self.execute(snippet) {
            Ok(output) if output.is_empty() => NO_OUTPUT_MESSAGE.to_string(),
            Ok(output) => output,
            Err(e) => {
                tracing::debug!(error = %e, "Snippet failed");
                format!("Error executing code: {}", e)
            }
        }
    }

    /// Run a snippet, surfacing the first error.
    pub fn execute(&self, snippet: &str) -> Result<String, SandboxError> {
        if snippet.len() > MAX_SNIPPET_BYTES {
            return Err(SandboxError::TooLarge(MAX_SNIPPET_BYTES));
        }

        let mut parser = Parser::new(snippet);
        let mut output = String::new();

        loop {
            parser.skip_separators();
            if parser.at_end() {
                break;
            }
            let expr = parser.parse_expr(0)?;
            let value = self.eval(expr)?;
            output.push_str(&render(&value));
            output.push('\n');
        }

        Ok(output)
    }

    fn eval(&self, expr: Expr) -> Result<Value, SandboxError> {
        match expr {
            Expr::Literal(value) => Ok(value),
            Expr::Call { op, arg } => {
                let operation = self
                    .operations
                    .get(op.as_str())
                    .ok_or(SandboxError::UnknownOperation(op))?;
                let arg = self.eval(*arg)?;
                operation(arg)
            }
        }
    }
}

impl Default for SandboxedCodeRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn hash_input(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Lowercase hex SHA-256 of a string's UTF-8 bytes.
pub fn sha256_hex(text: &str) -> String {
    to_hex(&Sha256::digest(text.as_bytes()))
}

fn op_sha256(arg: Value) -> Result<Value, SandboxError> {
    Ok(Value::String(to_hex(&Sha256::digest(hash_input(&arg)))))
}

fn op_sha512(arg: Value) -> Result<Value, SandboxError> {
    Ok(Value::String(to_hex(&Sha512::digest(hash_input(&arg)))))
}

fn structured(op: &'static str, arg: Value) -> Result<Value, SandboxError> {
    match arg {
        Value::String(s) => serde_json::from_str(&s).map_err(|_| SandboxError::Type {
            op,
            expected: "a JSON value or a string containing JSON",
        }),
        other => Ok(other),
    }
}

fn op_json_format(arg: Value) -> Result<Value, SandboxError> {
    let value = structured("json_format", arg)?;
    serde_json::to_string_pretty(&value)
        .map(Value::String)
        .map_err(|_| SandboxError::Type {
            op: "json_format",
            expected: "a serializable value",
        })
}

fn op_json_compact(arg: Value) -> Result<Value, SandboxError> {
    let value = structured("json_compact", arg)?;
    Ok(Value::String(value.to_string()))
}

fn op_len(arg: Value) -> Result<Value, SandboxError> {
    let len = match &arg {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => {
            return Err(SandboxError::Type {
                op: "len",
                expected: "a string, list or object",
            })
        }
    };
    Ok(Value::from(len))
}

fn op_upper(arg: Value) -> Result<Value, SandboxError> {
    match arg {
        Value::String(s) => Ok(Value::String(s.to_uppercase())),
        _ => Err(SandboxError::Type {
            op: "upper",
            expected: "a string",
        }),
    }
}

fn op_lower(arg: Value) -> Result<Value, SandboxError> {
    match arg {
        Value::String(s) => Ok(Value::String(s.to_lowercase())),
        _ => Err(SandboxError::Type {
            op: "lower",
            expected: "a string",
        }),
    }
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Call { op: String, arg: Box<Expr> },
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn syntax(&self, message: impl Into<String>) -> SandboxError {
        SandboxError::Syntax {
            pos: self.pos,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Skip whitespace, statement separators and comment lines.
    fn skip_separators(&mut self) {
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(';') => self.pos += 1,
                Some('#') => {
                    let rest = self.rest();
                    self.pos += rest.find('\n').unwrap_or(rest.len());
                }
                _ => break,
            }
        }
    }

    fn parse_expr(&mut self, depth: usize) -> Result<Expr, SandboxError> {
        if depth > MAX_DEPTH {
            return Err(SandboxError::TooDeep(MAX_DEPTH));
        }
        self.skip_whitespace();

        let start = self.pos;
        let ident_len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(self.rest().len());

        if ident_len > 0 && self.rest().starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            let ident = &self.rest()[..ident_len];
            self.pos += ident_len;
            self.skip_whitespace();
            if self.peek() == Some('(') {
                self.pos += 1;
                let arg = self.parse_expr(depth + 1)?;
                self.skip_whitespace();
                if self.peek() != Some(')') {
                    return Err(self.syntax(format!("expected ')' to close {}(", ident)));
                }
                self.pos += 1;
                return Ok(Expr::Call {
                    op: ident.to_string(),
                    arg: Box::new(arg),
                });
            }
            self.pos = start;
        }

        self.parse_literal()
    }

    fn parse_literal(&mut self) -> Result<Expr, SandboxError> {
        let rest = self.rest();
        match self.peek() {
            None | Some(')') => Err(self.syntax("expected a value")),
            Some('"') | Some('[') | Some('{') => {
                let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
                match stream.next() {
                    Some(Ok(value)) => {
                        self.pos += stream.byte_offset();
                        Ok(Expr::Literal(value))
                    }
                    Some(Err(e)) => Err(self.syntax(e.to_string())),
                    None => Err(self.syntax("expected a value")),
                }
            }
            Some(_) => {
                let len = rest
                    .find(|c: char| c == ')' || c == ';' || c.is_whitespace())
                    .unwrap_or(rest.len());
                let token = &rest[..len];
                let value: Value = serde_json::from_str(token)
                    .map_err(|_| self.syntax(format!("unrecognized token '{}'", token)))?;
                self.pos += len;
                Ok(Expr::Literal(value))
            }
        }
    }
}
