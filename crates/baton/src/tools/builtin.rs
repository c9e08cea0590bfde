use async_trait::async_trait;
use chrono::{Local, SecondsFormat};
use serde_json::{json, Value};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::error::{ToolError, ToolResult};
use super::ToolHandler;
use crate::models::tool::Tool;

const CALCULATOR_CHARS: &str = "0123456789+-*/.() ";

/// Tools that ship with baton
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinTool {
    GetCurrentDatetime,
    Calculator,
}

impl BuiltinTool {
    pub fn name(&self) -> &str {
        self.as_ref()
    }
}

#[async_trait]
impl ToolHandler for BuiltinTool {
    fn declaration(&self) -> Tool {
        match self {
            BuiltinTool::GetCurrentDatetime => Tool::new(
                self.name(),
                "Returns the current local date and time in ISO 8601 format.",
                json!({"type": "OBJECT", "properties": {}}),
            ),
            BuiltinTool::Calculator => Tool::new(
                self.name(),
                "Evaluates a simple arithmetic expression using + - * / and parentheses.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "expression": {
                            "type": "STRING",
                            "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                        }
                    },
                    "required": ["expression"]
                }),
            ),
        }
    }

    async fn call(&self, args: &Value) -> ToolResult<String> {
        match self {
            BuiltinTool::GetCurrentDatetime => {
                Ok(Local::now().to_rfc3339_opts(SecondsFormat::Secs, false))
            }
            BuiltinTool::Calculator => {
                let expression = args
                    .get("expression")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        ToolError::InvalidParameters(
                            "The expression string is required".to_string(),
                        )
                    })?;
                let value = evaluate(expression)?;
                Ok(format_number(value))
            }
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Evaluate an arithmetic expression with the usual precedence rules
pub(crate) fn evaluate(expression: &str) -> ToolResult<f64> {
    if expression.chars().any(|c| !CALCULATOR_CHARS.contains(c)) {
        return Err(ToolError::InvalidParameters(
            "invalid characters in expression".to_string(),
        ));
    }

    let tokens: Vec<char> = expression.chars().filter(|c| *c != ' ').collect();
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.unexpected());
    }
    if !value.is_finite() {
        return Err(ToolError::ExecutionError(
            "result is not a finite number".to_string(),
        ));
    }
    Ok(value)
}

struct Parser {
    tokens: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn unexpected(&self) -> ToolError {
        match self.peek() {
            Some(c) => ToolError::InvalidParameters(format!(
                "unexpected '{}' at position {}",
                c, self.pos
            )),
            None => ToolError::InvalidParameters("unexpected end of expression".to_string()),
        }
    }

    fn expr(&mut self) -> ToolResult<f64> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> ToolResult<f64> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else if rhs == 0.0 {
                return Err(ToolError::ExecutionError("division by zero".to_string()));
            } else {
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> ToolResult<f64> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('+') => {
                self.pos += 1;
                self.factor()
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(')') {
                    return Err(self.unexpected());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            _ => Err(self.unexpected()),
        }
    }

    fn number(&mut self) -> ToolResult<f64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let literal: String = self.tokens[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| ToolError::InvalidParameters(format!("invalid number '{}'", literal)))
    }
}
