//! Python source tokenizer.
//!
//! A small, line-aware lexer that is strict enough to reject the syntax
//! errors generated code usually contains (unterminated strings, unbalanced
//! brackets, broken indentation, block headers without a colon) while
//! producing the token stream the validator and call parser walk.

use std::fmt;

/// Kind of lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword
    Name,
    /// Numeric literal
    Number,
    /// String literal, including prefix and quotes
    Str,
    /// Operator or delimiter
    Op,
    /// End of a logical line
    Newline,
    /// Indentation increased
    Indent,
    /// Indentation decreased
    Dedent,
}

/// A lexical token with the line it starts on (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Source text of the token
    pub text: String,
    /// Line number where the token starts
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }

    /// Returns true if this is the operator `op`.
    #[must_use]
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    /// Returns true if this is the name (or keyword) `name`.
    #[must_use]
    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text == name
    }

    /// Returns true if this is an identifier that is not a keyword.
    #[must_use]
    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Name && !is_keyword(&self.text)
    }

    fn is_layout(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
        )
    }
}

/// A syntax error with an optional line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Line the error was detected on
    pub line: Option<usize>,
    /// Description of the problem
    pub message: String,
}

impl SyntaxError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Syntax error at line {}: {}", line, self.message),
            None => write!(f, "Syntax error: {}", self.message),
        }
    }
}

impl std::error::Error for SyntaxError {}

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

const COMPOUND_HEADERS: &[&str] = &[
    "def", "class", "if", "elif", "else", "for", "while", "with", "try", "except", "finally",
];

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

const THREE_CHAR_OPS: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];

const TWO_CHAR_OPS: &[&str] = &[
    "->", ":=", "==", "!=", "<=", ">=", "**", "//", "<<", ">>", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "@=",
];

const ONE_CHAR_OPS: &str = "+-*/%@&|^~<>=.,:;";

/// Deepest bracket nesting accepted in one program.
pub const MAX_BRACKET_DEPTH: usize = 200;

/// Operators that cannot end a logical line.
const DANGLING_OPS: &[&str] = &[
    "=", "+", "-", "*", "/", "%", "**", "//", ".", "==", "!=", "<", ">", "<=", ">=", "+=",
    "-=", "*=", "/=", "|", "&", "^", "->", ":=",
];

/// Returns true if `word` is a reserved keyword.
#[must_use]
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Tokenizes Python source.
///
/// # Errors
///
/// Returns a `SyntaxError` for the first lexical or layout problem found.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

/// Tokenizes the bracketed group that opens `source`, up to and including
/// its matching close bracket. Text after the group is never examined.
///
/// # Errors
///
/// Returns a `SyntaxError` if the group is malformed or never closed.
pub fn bracketed_group(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer::new(source);
    lexer.stop_when_balanced = true;
    lexer.run()
}

/// Tokenizes and applies statement-level checks.
///
/// # Errors
///
/// Returns the first `SyntaxError` found.
pub fn parse(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let tokens = tokenize(source)?;
    check_statements(&tokens)?;
    Ok(tokens)
}

/// Splits a token stream into simple statements.
///
/// Statements end at a `Newline` or a top-level `;`. Layout tokens are
/// dropped, so each statement holds only its own tokens.
#[must_use]
pub fn statements(tokens: &[Token]) -> Vec<Vec<&Token>> {
    let mut out = Vec::new();
    let mut current: Vec<&Token> = Vec::new();
    let mut depth = 0usize;

    for token in tokens {
        match token.kind {
            TokenKind::Newline => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                depth = 0;
            }
            TokenKind::Indent | TokenKind::Dedent => {}
            TokenKind::Op if token.text == ";" && depth == 0 => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => {
                if token.kind == TokenKind::Op {
                    match token.text.as_str() {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                }
                current.push(token);
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Checks statement-level grammar the lexer cannot see on its own.
fn check_statements(tokens: &[Token]) -> Result<(), SyntaxError> {
    for statement in statements(tokens) {
        let body: &[&Token] = match statement.first() {
            Some(first) if first.is_name("async") => &statement[1..],
            _ => &statement[..],
        };
        let Some(first) = body.first() else {
            continue;
        };

        if first.kind == TokenKind::Name && COMPOUND_HEADERS.contains(&first.text.as_str()) {
            if !has_top_level_colon(body) {
                return Err(SyntaxError::at(first.line, "expected ':'"));
            }
            match first.text.as_str() {
                "def" => {
                    let named = body.get(1).is_some_and(|t| t.is_identifier());
                    let opens = body.get(2).is_some_and(|t| t.is_op("("));
                    if !named || !opens {
                        return Err(SyntaxError::at(first.line, "invalid function definition"));
                    }
                }
                "class" => {
                    if !body.get(1).is_some_and(|t| t.is_identifier()) {
                        return Err(SyntaxError::at(first.line, "invalid class definition"));
                    }
                }
                _ => {}
            }
        }

        if let Some(last) = body.last() {
            let wildcard_import = first.is_name("from") && last.is_op("*");
            if last.kind == TokenKind::Op
                && DANGLING_OPS.contains(&last.text.as_str())
                && !wildcard_import
            {
                return Err(SyntaxError::at(last.line, "invalid syntax"));
            }
        }
    }
    Ok(())
}

fn has_top_level_colon(tokens: &[&Token]) -> bool {
    let mut depth = 0usize;
    for token in tokens {
        if token.kind != TokenKind::Op {
            continue;
        }
        match token.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            ":" if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    brackets: Vec<(char, usize)>,
    at_line_start: bool,
    block_opened_at: Option<usize>,
    stop_when_balanced: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.replace("\r\n", "\n").chars().collect(),
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
            block_opened_at: None,
            stop_when_balanced: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, text: impl Into<String>, line: usize) {
        self.tokens.push(Token::new(kind, text, line));
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.brackets.is_empty() {
                self.at_line_start = false;
                if self.indentation()? {
                    continue;
                }
            }

            let Some(c) = self.peek() else { break };
            match c {
                '\n' => self.newline(),
                ' ' | '\t' | '\x0c' | '\r' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' => self.continuation()?,
                '"' | '\'' => self.string(String::new())?,
                '0'..='9' => self.number(),
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number(),
                c if c == '_' || c.is_alphabetic() => self.name()?,
                '(' | '[' | '{' => {
                    if self.brackets.len() >= MAX_BRACKET_DEPTH {
                        return Err(SyntaxError::at(self.line, "too many nested brackets"));
                    }
                    self.brackets.push((c, self.line));
                    self.push(TokenKind::Op, c, self.line);
                    self.pos += 1;
                }
                ')' | ']' | '}' => {
                    self.close_bracket(c)?;
                    if self.stop_when_balanced && self.brackets.is_empty() {
                        return Ok(self.tokens);
                    }
                }
                _ => self.operator(c)?,
            }
        }
        self.finish()
    }

    /// Measures indentation at the start of a line and emits layout tokens.
    ///
    /// Returns true when the line was blank or comment-only and has been
    /// consumed entirely.
    fn indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut width = 0usize;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(true),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                self.at_line_start = true;
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek() == Some('\n') {
                    self.pos += 1;
                    self.line += 1;
                }
                self.at_line_start = true;
                return Ok(true);
            }
            Some(_) => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if let Some(header_line) = self.block_opened_at.take() {
            if width <= current {
                return Err(SyntaxError::at(
                    self.line,
                    format!("expected an indented block after line {header_line}"),
                ));
            }
            self.indents.push(width);
            self.push(TokenKind::Indent, "", self.line);
        } else if width > current {
            return Err(SyntaxError::at(self.line, "unexpected indent"));
        } else if width < current {
            while self.indents.last().is_some_and(|&level| width < level) {
                self.indents.pop();
                self.push(TokenKind::Dedent, "", self.line);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(SyntaxError::at(
                    self.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(false)
    }

    fn ends_logical_line(&mut self) {
        let has_content = self.tokens.last().is_some_and(|t| !t.is_layout());
        if has_content {
            if self.tokens.last().is_some_and(|t| t.is_op(":")) {
                self.block_opened_at = Some(self.line);
            }
            self.push(TokenKind::Newline, "", self.line);
        }
    }

    fn newline(&mut self) {
        self.pos += 1;
        if self.brackets.is_empty() {
            self.ends_logical_line();
            self.at_line_start = true;
        }
        self.line += 1;
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn continuation(&mut self) -> Result<(), SyntaxError> {
        match self.peek_at(1) {
            Some('\n') => {
                self.pos += 2;
                self.line += 1;
                Ok(())
            }
            None => Err(SyntaxError::at(self.line, "unexpected EOF while parsing")),
            Some(_) => Err(SyntaxError::at(
                self.line,
                "unexpected character after line continuation character",
            )),
        }
    }

    fn string(&mut self, prefix: String) -> Result<(), SyntaxError> {
        let start_line = self.line;
        let Some(quote) = self.peek() else {
            return Err(SyntaxError::at(start_line, "unterminated string literal"));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let mut text = prefix;

        let opening = if triple { 3 } else { 1 };
        for _ in 0..opening {
            text.push(quote);
        }
        self.pos += opening;

        loop {
            match self.peek() {
                None => {
                    let message = if triple {
                        "unterminated triple-quoted string literal"
                    } else {
                        "unterminated string literal"
                    };
                    return Err(SyntaxError::at(start_line, message));
                }
                Some('\\') => {
                    text.push('\\');
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        text.push(escaped);
                        self.pos += 1;
                        if escaped == '\n' {
                            self.line += 1;
                        }
                    }
                }
                Some('\n') if !triple => {
                    return Err(SyntaxError::at(start_line, "unterminated string literal"));
                }
                Some('\n') => {
                    text.push('\n');
                    self.pos += 1;
                    self.line += 1;
                }
                Some(c) if c == quote => {
                    if !triple {
                        text.push(c);
                        self.pos += 1;
                        break;
                    }
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        for _ in 0..3 {
                            text.push(quote);
                        }
                        self.pos += 3;
                        break;
                    }
                    text.push(c);
                    self.pos += 1;
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }

        self.push(TokenKind::Str, text, start_line);
        Ok(())
    }

    fn number(&mut self) {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                break;
            }
            text.push(c);
            self.pos += 1;
            let is_hex = text.starts_with("0x") || text.starts_with("0X");
            if (c == 'e' || c == 'E') && !is_hex {
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.pos += 1;
                }
            }
        }
        self.push(TokenKind::Number, text, self.line);
    }

    fn name(&mut self) -> Result<(), SyntaxError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !(c == '_' || c.is_alphanumeric()) {
                break;
            }
            text.push(c);
            self.pos += 1;
        }

        let quoted = matches!(self.peek(), Some('"' | '\''));
        if quoted && STRING_PREFIXES.contains(&text.to_ascii_lowercase().as_str()) {
            return self.string(text);
        }
        self.push(TokenKind::Name, text, self.line);
        Ok(())
    }

    fn close_bracket(&mut self, c: char) -> Result<(), SyntaxError> {
        let expected_open = match c {
            ')' => '(',
            ']' => '[',
            _ => '{',
        };
        match self.brackets.pop() {
            None => {
                return Err(SyntaxError::at(self.line, format!("unmatched '{c}'")));
            }
            Some((open, open_line)) if open != expected_open => {
                let location = if open_line == self.line {
                    String::new()
                } else {
                    format!(" on line {open_line}")
                };
                return Err(SyntaxError::at(
                    self.line,
                    format!(
                        "closing parenthesis '{c}' does not match opening parenthesis '{open}'{location}"
                    ),
                ));
            }
            Some(_) => {}
        }
        self.push(TokenKind::Op, c, self.line);
        self.pos += 1;
        Ok(())
    }

    fn operator(&mut self, c: char) -> Result<(), SyntaxError> {
        for (width, table) in [(3usize, THREE_CHAR_OPS), (2, TWO_CHAR_OPS)] {
            let candidate: String = self.chars.iter().skip(self.pos).take(width).collect();
            if table.contains(&candidate.as_str()) {
                self.push(TokenKind::Op, candidate, self.line);
                self.pos += width;
                return Ok(());
            }
        }
        if ONE_CHAR_OPS.contains(c) {
            self.push(TokenKind::Op, c, self.line);
            self.pos += 1;
            return Ok(());
        }
        Err(SyntaxError::at(
            self.line,
            format!("invalid character '{}' (U+{:04X})", c, c as u32),
        ))
    }

    fn finish(mut self) -> Result<Vec<Token>, SyntaxError> {
        if let Some(&(open, line)) = self.brackets.last() {
            return Err(SyntaxError::at(line, format!("'{open}' was never closed")));
        }
        self.ends_logical_line();
        if let Some(header_line) = self.block_opened_at {
            return Err(SyntaxError::at(
                self.line,
                format!("expected an indented block after line {header_line}"),
            ));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, "", self.line);
        }
        Ok(self.tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_simple_call() {
        let tokens = tokenize("print('hi')\n").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["print", "(", "'hi'", ")", ""]);
        assert_eq!(tokens[4].kind, TokenKind::Newline);
    }

    #[test]
    fn emits_indent_and_dedent() {
        let source = "def f(x):\n    return x\ny = 1\n";
        let kinds = kinds(source);
        assert!(kinds.contains(&TokenKind::Indent));
        assert!(kinds.contains(&TokenKind::Dedent));
    }

    #[test]
    fn brackets_allow_implicit_continuation() {
        let tokens = tokenize("x = [\n    1,\n    2,\n]\n").unwrap();
        let newlines = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        let tokens = tokenize("s = \"\"\"a\nb\"\"\"\nt = 1\n").unwrap();
        let t = tokens.iter().find(|t| t.is_name("t")).unwrap();
        assert_eq!(t.line, 3);
    }

    #[test]
    fn prefixed_strings_are_single_tokens() {
        let tokens = tokenize("x = rb'\\d'\n").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Str);
        assert_eq!(tokens[2].text, "rb'\\d'");
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let tokens = tokenize("# header\n\nx = 1  # trailing\n\n").unwrap();
        assert_eq!(tokens[0].text, "x");
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = tokenize("x = 1\ny = 'oops\n").unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn unterminated_triple_string_reports_start_line() {
        let err = tokenize("x = '''never\nclosed\n").unwrap_err();
        assert_eq!(err.line, Some(1));
        assert!(err.message.contains("triple-quoted"));
    }

    #[test]
    fn unclosed_bracket_is_reported() {
        let err = tokenize("foo(1, 2\n").unwrap_err();
        assert_eq!(err.line, Some(1));
        assert!(err.message.contains("never closed"));
    }

    #[test]
    fn excessive_bracket_nesting_is_reported() {
        let deep = format!("f({}{})\n", "[".repeat(20_000), "]".repeat(20_000));
        let err = tokenize(&deep).unwrap_err();
        assert_eq!(err.line, Some(1));
        assert_eq!(err.message, "too many nested brackets");

        let allowed = MAX_BRACKET_DEPTH - 1;
        let shallow = format!("f({}{})\n", "[".repeat(allowed), "]".repeat(allowed));
        assert!(tokenize(&shallow).is_ok());
    }

    #[test]
    fn bracketed_group_stops_at_matching_close() {
        let tokens = bracketed_group("(a, b=')')) -> int:\n    $not python\n").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["(", "a", ",", "b", "=", "')'", ")"]);

        assert!(bracketed_group("(a, b").is_err());
    }

    #[test]
    fn mismatched_bracket_is_reported() {
        let err = tokenize("x = [1, 2)\n").unwrap_err();
        assert!(err.message.contains("does not match"));
    }

    #[test]
    fn unexpected_indent_is_reported() {
        let err = tokenize("x = 1\n    y = 2\n").unwrap_err();
        assert_eq!(err.line, Some(2));
        assert_eq!(err.message, "unexpected indent");
    }

    #[test]
    fn missing_block_is_reported() {
        let err = tokenize("if x:\ny = 2\n").unwrap_err();
        assert!(err.message.contains("expected an indented block"));
    }

    #[test]
    fn inconsistent_dedent_is_reported() {
        let err = tokenize("if x:\n    y = 1\n  z = 2\n").unwrap_err();
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn invalid_character_is_reported() {
        let err = tokenize("x = $y\n").unwrap_err();
        assert!(err.message.contains("invalid character"));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let err = parse("def f(x)\n    return x\n").unwrap_err();
        assert_eq!(err.line, Some(1));
        assert_eq!(err.message, "expected ':'");
    }

    #[test]
    fn one_line_compound_statement_is_accepted() {
        assert!(parse("if x: y = 1\n").is_ok());
        assert!(parse("f = lambda a: a + 1\n").is_ok());
    }

    #[test]
    fn dangling_operator_is_rejected() {
        let err = parse("x = \n").unwrap_err();
        assert_eq!(err.message, "invalid syntax");
    }

    #[test]
    fn statements_split_on_semicolons() {
        let tokens = tokenize("import os; os.getcwd()\n").unwrap();
        let stmts = statements(&tokens);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[1][0].is_name("os"));
    }

    #[test]
    fn display_includes_line_number() {
        let err = SyntaxError::at(3, "invalid syntax");
        assert_eq!(err.to_string(), "Syntax error at line 3: invalid syntax");
    }
}
