//! Parser for the literal text form produced by the relational engine.
//!
//! Accepts the subset of Python literal syntax an engine renders result sets
//! in: single or double quoted strings, integers and floats, `True`, `False`,
//! `None`, lists, tuples and mappings. Tuples become JSON arrays. Non-finite
//! floats (`inf`, `-inf`, `nan`, or an overflowing exponent) become strings.

use serde_json::{Map, Number, Value};
use thiserror::Error;

const MAX_DEPTH: usize = 128;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// Parse one literal value spanning the whole of `text`
#[inline]
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut parser = LiteralParser::new(text);
    parser.skip_whitespace();
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();
    match parser.peek() {
        None => Ok(value),
        Some(c) => Err(parser.error(format!("unexpected trailing '{}'", c))),
    }
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }

        match self.peek() {
            Some('[') => self.parse_sequence(']', depth),
            Some('(') => self.parse_sequence(')', depth),
            Some('{') => self.parse_mapping(depth),
            Some(quote @ ('\'' | '"')) => self.parse_string(quote).map(Value::String),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                self.parse_number()
            }
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_name(),
            Some(c) => Err(self.error(format!("unexpected '{}'", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_sequence(&mut self, close: char, depth: usize) -> Result<Value, LiteralError> {
        self.bump();
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.bump();
                break;
            }

            items.push(self.parse_value(depth + 1)?);
            self.skip_whitespace();

            match self.bump() {
                Some(',') => {}
                Some(c) if c == close => break,
                Some(c) => {
                    return Err(self.error(format!("expected ',' or '{}', found '{}'", close, c)));
                }
                None => return Err(self.error("unterminated sequence")),
            }
        }

        Ok(Value::Array(items))
    }

    fn parse_mapping(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.bump();
        let mut map = Map::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.bump();
                break;
            }

            let key = match self.parse_value(depth + 1)? {
                Value::String(key) => key,
                Value::Array(_) | Value::Object(_) => {
                    return Err(self.error("mapping keys must be scalars"));
                }
                other => other.to_string(),
            };

            self.skip_whitespace();
            if self.bump() != Some(':') {
                return Err(self.error("expected ':' after mapping key"));
            }
            self.skip_whitespace();

            let value = self.parse_value(depth + 1)?;
            map.insert(key, value);
            self.skip_whitespace();

            match self.bump() {
                Some(',') => {}
                Some('}') => break,
                Some(c) => return Err(self.error(format!("expected ',' or '}}', found '{}'", c))),
                None => return Err(self.error("unterminated mapping")),
            }
        }

        Ok(Value::Object(map))
    }

    fn parse_string(&mut self, quote: char) -> Result<String, LiteralError> {
        self.bump();
        let mut out = String::new();

        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.parse_escape(&mut out)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape"));
        };

        match c {
            '\n' => {}
            '\\' | '\'' | '"' => out.push(c),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            'x' => out.push(self.parse_code_point(2)?),
            'u' => out.push(self.parse_code_point(4)?),
            'U' => out.push(self.parse_code_point(8)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn parse_code_point(&mut self, digits: usize) -> Result<char, LiteralError> {
        let mut code = 0_u32;
        for _ in 0..digits {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid hex escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    fn parse_number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let mut text = String::new();
        let mut is_float = false;

        if let Some(sign @ ('-' | '+')) = self.peek() {
            text.push(sign);
            self.bump();
        }

        if self.peek().is_some_and(char::is_alphabetic) {
            return match self.parse_name()? {
                Value::String(name) => Ok(Value::String(format!("{}{}", text, name))),
                _ => Err(LiteralError {
                    offset: start,
                    message: format!("invalid number '{}'", text),
                }),
            };
        }

        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => text.push(c),
                '.' => {
                    is_float = true;
                    text.push(c);
                }
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.bump();
                    if let Some(sign @ ('-' | '+')) = self.peek() {
                        text.push(sign);
                    } else {
                        continue;
                    }
                }
                _ => break,
            }
            self.bump();
        }

        let value = if is_float {
            text.parse::<f64>().ok().map(float_value)
        } else {
            text.parse::<i64>()
                .map(Number::from)
                .or_else(|_| text.parse::<u64>().map(Number::from))
                .ok()
                .map(Value::Number)
                .or_else(|| text.parse::<f64>().ok().map(float_value))
        };

        value.ok_or_else(|| LiteralError {
            offset: start,
            message: format!("invalid number '{}'", text),
        })
    }

    fn parse_name(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let mut name = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            name.push(c);
            self.bump();
        }

        match name.as_str() {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            // Non-finite floats have no JSON number form
            "inf" | "nan" => Ok(Value::String(name)),
            _ => Err(LiteralError {
                offset: start,
                message: format!("unknown name '{}'", name),
            }),
        }
    }
}

/// JSON has no non-finite numbers, so those are kept as their textual form
fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or_else(|| Value::String(value.to_string()), Value::Number)
}
