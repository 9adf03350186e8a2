//! Structured call expressions.
//!
//! Validated code reaches a tool only as a single call of the form
//! `pack.function(arg, key=literal, ...)`. Arguments must be literals
//! (strings, numbers, booleans, `None`, lists, tuples, dicts), which are
//! converted to JSON. Nothing in the code is ever evaluated.

use crate::tools::error::ToolError;
use crate::tools::security::lexer::{self, Token, TokenKind};
use serde_json::{Map, Number, Value};

/// A parsed tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    /// Dotted tool name, e.g. `brave.search`
    pub target: String,
    /// Positional arguments in order
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: Map<String, Value>,
    /// Line the call starts on
    pub line: usize,
}

impl CallExpression {
    /// Parses source code into a call expression.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the code does not parse or is not a
    /// single literal-argument call.
    pub fn parse_source(code: &str) -> Result<Self, ToolError> {
        let tokens =
            lexer::parse(code).map_err(|e| ToolError::validation(vec![e.to_string()]))?;
        Self::parse(&tokens)
    }

    /// Parses an already tokenized program into a call expression.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the program is not exactly one call
    /// with literal arguments.
    pub fn parse(tokens: &[Token]) -> Result<Self, ToolError> {
        let statements = lexer::statements(tokens);
        let statement = match statements.as_slice() {
            [single] => single,
            [] => return Err(invalid(1, "no tool call found")),
            [_, second, ..] => {
                let line = second.first().map_or(1, |t| t.line);
                return Err(invalid(
                    line,
                    "expected a single tool call, found multiple statements",
                ));
            }
        };
        Parser::new(statement).call()
    }

    /// Binds positional arguments to parameter names.
    ///
    /// # Errors
    ///
    /// Returns a validation error when there are more positional arguments
    /// than parameters or an argument is given twice.
    pub fn bind(self, signature: &[String]) -> Result<Map<String, Value>, ToolError> {
        let mut kwargs = self.kwargs;
        let given = self.args.len();
        for (index, value) in self.args.into_iter().enumerate() {
            let Some(param) = signature.get(index) else {
                return Err(invalid(
                    self.line,
                    format!(
                        "'{}' takes {} positional arguments but {} were given",
                        self.target,
                        signature.len(),
                        given
                    ),
                ));
            };
            if kwargs.contains_key(param) {
                return Err(invalid(
                    self.line,
                    format!(
                        "'{}' got multiple values for argument '{}'",
                        self.target, param
                    ),
                ));
            }
            kwargs.insert(param.clone(), value);
        }
        Ok(kwargs)
    }
}

/// Deepest literal nesting accepted in call arguments.
const MAX_ARGUMENT_DEPTH: usize = 64;

fn invalid(line: usize, message: impl Into<String>) -> ToolError {
    ToolError::validation(vec![format!("Line {}: {}", line, message.into())])
}

struct Parser<'a> {
    tokens: &'a [&'a Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [&'a Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).copied()
    }

    fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last().copied())
            .map_or(1, |t| t.line)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ToolError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(invalid(self.line(), format!("expected '{op}'")))
        }
    }

    fn call(mut self) -> Result<CallExpression, ToolError> {
        let line = self.line();
        let target = self.target()?;
        self.expect_op("(")?;

        let mut args = Vec::new();
        let mut kwargs = Map::new();
        loop {
            if self.eat_op(")") {
                break;
            }
            let is_keyword = self.peek().is_some_and(Token::is_identifier)
                && self.tokens.get(self.pos + 1).is_some_and(|t| t.is_op("="));
            if is_keyword {
                let key = self.next().map(|t| t.text.clone()).unwrap_or_default();
                self.pos += 1;
                let value = self.literal()?;
                if kwargs.insert(key.clone(), value).is_some() {
                    return Err(invalid(line, format!("keyword argument repeated: '{key}'")));
                }
            } else {
                if !kwargs.is_empty() {
                    return Err(invalid(
                        self.line(),
                        "positional argument follows keyword argument",
                    ));
                }
                args.push(self.literal()?);
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }

        if let Some(extra) = self.peek() {
            return Err(invalid(
                extra.line,
                format!("unexpected '{}' after tool call", extra.text),
            ));
        }

        Ok(CallExpression {
            target,
            args,
            kwargs,
            line,
        })
    }

    fn target(&mut self) -> Result<String, ToolError> {
        let mut parts = Vec::new();
        loop {
            match self.next() {
                Some(token) if token.is_identifier() => parts.push(token.text.as_str()),
                _ => return Err(invalid(self.line(), "expected a tool name")),
            }
            if !self.eat_op(".") {
                break;
            }
        }
        Ok(parts.join("."))
    }

    fn literal(&mut self) -> Result<Value, ToolError> {
        if self.depth >= MAX_ARGUMENT_DEPTH {
            return Err(invalid(self.line(), "arguments nested too deeply"));
        }
        self.depth += 1;
        let value = self.value();
        self.depth -= 1;
        value
    }

    fn value(&mut self) -> Result<Value, ToolError> {
        let line = self.line();
        let Some(token) = self.next() else {
            return Err(invalid(line, "expected an argument"));
        };

        match token.kind {
            TokenKind::Str => {
                let mut text = decode_string(token)?;
                while let Some(next) = self.peek().filter(|t| t.kind == TokenKind::Str) {
                    text.push_str(&decode_string(next)?);
                    self.pos += 1;
                }
                Ok(Value::String(text))
            }
            TokenKind::Number => parse_number(&token.text, false, token.line),
            TokenKind::Op if token.text == "-" || token.text == "+" => {
                let negative = token.text == "-";
                match self.next() {
                    Some(n) if n.kind == TokenKind::Number => parse_number(&n.text, negative, n.line),
                    _ => Err(invalid(line, "expected a number after sign")),
                }
            }
            TokenKind::Name => match token.text.as_str() {
                "True" => Ok(Value::Bool(true)),
                "False" => Ok(Value::Bool(false)),
                "None" => Ok(Value::Null),
                other => Err(not_literal(line, other)),
            },
            TokenKind::Op if token.text == "[" => self.sequence("]").map(Value::Array),
            TokenKind::Op if token.text == "(" => {
                if self.eat_op(")") {
                    return Ok(Value::Array(Vec::new()));
                }
                let first = self.literal()?;
                if self.eat_op(")") {
                    return Ok(first);
                }
                self.expect_op(",")?;
                let mut items = vec![first];
                items.extend(self.sequence(")")?);
                Ok(Value::Array(items))
            }
            TokenKind::Op if token.text == "{" => self.mapping(),
            _ => Err(not_literal(line, &token.text)),
        }
    }

    fn sequence(&mut self, close: &str) -> Result<Vec<Value>, ToolError> {
        let mut items = Vec::new();
        loop {
            if self.eat_op(close) {
                return Ok(items);
            }
            items.push(self.literal()?);
            if !self.eat_op(",") {
                self.expect_op(close)?;
                return Ok(items);
            }
        }
    }

    fn mapping(&mut self) -> Result<Value, ToolError> {
        let mut map = Map::new();
        loop {
            if self.eat_op("}") {
                return Ok(Value::Object(map));
            }
            let line = self.line();
            let key = match self.literal()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(invalid(line, "dictionary keys must be strings or numbers")),
            };
            self.expect_op(":")?;
            let value = self.literal()?;
            map.insert(key, value);
            if !self.eat_op(",") {
                self.expect_op("}")?;
                return Ok(Value::Object(map));
            }
        }
    }
}

fn not_literal(line: usize, text: &str) -> ToolError {
    invalid(
        line,
        format!("unsupported argument '{text}'; only literal values are allowed"),
    )
}

fn parse_number(text: &str, negative: bool, line: usize) -> Result<Value, ToolError> {
    let cleaned = text.replace('_', "");
    let signed = if negative {
        format!("-{cleaned}")
    } else {
        cleaned
    };
    if let Ok(int) = signed.parse::<i64>() {
        return Ok(Value::Number(int.into()));
    }
    signed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| invalid(line, format!("unsupported number literal '{text}'")))
}

fn decode_string(token: &Token) -> Result<String, ToolError> {
    let text = token.text.as_str();
    let Some(quote_at) = text.find(['"', '\'']) else {
        return Err(invalid(token.line, "malformed string literal"));
    };
    let prefix = text[..quote_at].to_ascii_lowercase();
    if prefix.contains('f') {
        return Err(invalid(token.line, "f-strings are not allowed in tool arguments"));
    }
    let body = &text[quote_at..];
    let quote_len = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        3
    } else {
        1
    };
    if body.len() < quote_len * 2 {
        return Err(invalid(token.line, "malformed string literal"));
    }
    let inner = &body[quote_len..body.len() - quote_len];
    if prefix.contains('r') {
        return Ok(inner.to_string());
    }
    Ok(unescape(inner))
}

fn unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(kind @ ('x' | 'u')) => {
                let width = if kind == 'x' { 2 } else { 4 };
                let digits: String = chars.clone().take(width).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if digits.len() == width => {
                        out.push(decoded);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    _ => {
                        out.push('\\');
                        out.push(kind);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(code: &str) -> CallExpression {
        CallExpression::parse_source(code).unwrap()
    }

    #[test]
    fn parses_dotted_target_with_mixed_arguments() {
        let call = parse("calc.add(2, b=3)");
        assert_eq!(call.target, "calc.add");
        assert_eq!(call.args, vec![json!(2)]);
        assert_eq!(call.kwargs.get("b"), Some(&json!(3)));
        assert_eq!(call.line, 1);
    }

    #[test]
    fn parses_nested_literals() {
        let call = parse(
            "search.web(query='rust \\'async\\'', tags=['a', 'b'], opts={'limit': -5, 'safe': True}, extra=None)",
        );
        assert_eq!(call.kwargs["query"], json!("rust 'async'"));
        assert_eq!(call.kwargs["tags"], json!(["a", "b"]));
        assert_eq!(call.kwargs["opts"], json!({"limit": -5, "safe": true}));
        assert_eq!(call.kwargs["extra"], Value::Null);
    }

    #[test]
    fn tuples_become_arrays() {
        let call = parse("geo.point((1.5, 2), (3,), ())");
        assert_eq!(call.args, vec![json!([1.5, 2]), json!([3]), json!([])]);
    }

    #[test]
    fn deep_nesting_is_rejected_without_recursing() {
        let nested = |depth: usize| format!("f({}{})", "[".repeat(depth), "]".repeat(depth));

        let call = parse(&nested(MAX_ARGUMENT_DEPTH));
        assert_eq!(call.args.len(), 1);

        let err = CallExpression::parse_source(&nested(100)).unwrap_err();
        assert!(err.is_validation());
        assert!(err.message().contains("arguments nested too deeply"));

        let err = CallExpression::parse_source(&nested(20_000)).unwrap_err();
        assert!(err.message().contains("too many nested brackets"));
    }

    #[test]
    fn adjacent_strings_concatenate() {
        let call = parse("greet('Ada' \" Lovelace\")");
        assert_eq!(call.args, vec![json!("Ada Lovelace")]);
    }

    #[test]
    fn raw_strings_keep_backslashes() {
        let call = parse(r"grep.find(pattern=r'\d+')");
        assert_eq!(call.kwargs["pattern"], json!(r"\d+"));
    }

    #[test]
    fn unicode_escapes_decode() {
        let call = parse(r"echo('caf\u00e9 \x41')");
        assert_eq!(call.args, vec![json!("café A")]);
    }

    #[test]
    fn rejects_non_literal_arguments() {
        let err = CallExpression::parse_source("calc.add(x, 1)").unwrap_err();
        assert!(err.is_validation());
        assert!(err.message().contains("only literal values"));
    }

    #[test]
    fn rejects_nested_calls() {
        let err = CallExpression::parse_source("calc.add(len('ab'), 1)").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn rejects_multiple_statements() {
        let err = CallExpression::parse_source("calc.add(1, 2)\ncalc.add(3, 4)\n").unwrap_err();
        assert!(err.message().contains("single tool call"));
    }

    #[test]
    fn rejects_positional_after_keyword() {
        let err = CallExpression::parse_source("calc.add(a=1, 2)").unwrap_err();
        assert!(err.message().contains("positional argument follows keyword"));
    }

    #[test]
    fn rejects_f_strings() {
        let err = CallExpression::parse_source("greet(f'{name}')").unwrap_err();
        assert!(err.message().contains("f-strings"));
    }

    #[test]
    fn rejects_trailing_attribute_access() {
        let err = CallExpression::parse_source("calc.add(1, 2).real").unwrap_err();
        assert!(err.message().contains("after tool call"));
    }

    #[test]
    fn bind_maps_positionals_through_signature() {
        let signature = vec!["a".to_string(), "b".to_string()];
        let kwargs = parse("calc.add(2, b=3)").bind(&signature).unwrap();
        assert_eq!(Value::Object(kwargs), json!({"a": 2, "b": 3}));
    }

    #[test]
    fn bind_rejects_too_many_positionals() {
        let signature = vec!["a".to_string()];
        let err = parse("calc.add(1, 2)").bind(&signature).unwrap_err();
        assert!(err.message().contains("takes 1 positional arguments but 2 were given"));
    }

    #[test]
    fn bind_rejects_duplicate_values() {
        let signature = vec!["a".to_string()];
        let err = parse("calc.add(1, a=2)").bind(&signature).unwrap_err();
        assert!(err.message().contains("multiple values for argument 'a'"));
    }
}
