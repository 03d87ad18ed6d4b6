pub mod tokens;

use thiserror::Error;
use tokens::{is_reserved, keyword_type, Token, TokenType};

use crate::ast::Position;

#[derive(Debug, Clone, Error)]
#[error("{file}:{pos}: {message}")]
pub struct LexerError {
    pub message: String,
    pub pos: Position,
    pub file: String,
}

/// Operators ordered longest first so that the first match wins.
const OPERATORS: &[(&str, TokenType)] = &[
    ("//=", TokenType::SlashSlashEq),
    ("<<=", TokenType::LtLtEq),
    (">>=", TokenType::GtGtEq),
    ("==", TokenType::Equals),
    ("!=", TokenType::NotEquals),
    ("<=", TokenType::LessEqual),
    (">=", TokenType::GreaterEqual),
    ("//", TokenType::SlashSlash),
    ("<<", TokenType::LtLt),
    (">>", TokenType::GtGt),
    ("**", TokenType::StarStar),
    ("+=", TokenType::PlusEq),
    ("-=", TokenType::MinusEq),
    ("*=", TokenType::StarEq),
    ("/=", TokenType::SlashEq),
    ("%=", TokenType::PercentEq),
    ("&=", TokenType::AmpEq),
    ("|=", TokenType::PipeEq),
    ("^=", TokenType::CaretEq),
    ("(", TokenType::LParen),
    (")", TokenType::RParen),
    ("[", TokenType::LBracket),
    ("]", TokenType::RBracket),
    ("{", TokenType::LBrace),
    ("}", TokenType::RBrace),
    (",", TokenType::Comma),
    (";", TokenType::Semicolon),
    (":", TokenType::Colon),
    (".", TokenType::Dot),
    ("+", TokenType::Plus),
    ("-", TokenType::Minus),
    ("*", TokenType::Star),
    ("/", TokenType::Slash),
    ("%", TokenType::Percent),
    ("&", TokenType::Ampersand),
    ("|", TokenType::Pipe),
    ("^", TokenType::Caret),
    ("~", TokenType::Tilde),
    ("<", TokenType::LessThan),
    (">", TokenType::GreaterThan),
    ("=", TokenType::Assign),
];

pub struct Lexer {
    source: Vec<char>,
    filename: String,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    indent_stack: Vec<usize>,
    /// Nesting depth of (), [] and {}; newlines inside brackets are ignored.
    depth: usize,
}

impl Lexer {
    pub fn new(source: &str, filename: &str) -> Self {
        Self {
            source: source.chars().collect(),
            filename: filename.to_string(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            indent_stack: vec![0],
            depth: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        while !self.at_end() {
            self.scan_line()?;
        }

        if self.depth > 0 {
            return Err(self.error("unexpected end of file inside brackets"));
        }

        // A final line without a trailing newline still ends a statement.
        if let Some(last) = self.tokens.last() {
            if last.token_type != TokenType::Newline && last.token_type != TokenType::Dedent {
                self.tokens.push(self.make_token(TokenType::Newline, ""));
            }
        }

        // Emit remaining DEDENTs at EOF
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens.push(self.make_token(TokenType::Dedent, ""));
        }

        self.tokens.push(self.make_token(TokenType::Eof, ""));
        Ok(self.tokens)
    }

    /// Scans one logical line: indentation, then tokens up to the newline
    /// that ends it (newlines inside brackets are skipped).
    fn scan_line(&mut self) -> Result<(), LexerError> {
        // Measure leading spaces
        let mut indent = 0;
        while !self.at_end() && self.peek() == ' ' {
            indent += 1;
            self.advance();
        }
        if !self.at_end() && self.peek() == '\r' {
            self.advance();
        }

        // Skip blank lines and comment-only lines
        if self.at_end() {
            return Ok(());
        }
        if self.peek() == '\n' {
            self.advance();
            return Ok(());
        }
        if self.peek() == '#' {
            self.skip_comment();
            if !self.at_end() {
                self.advance();
            }
            return Ok(());
        }

        if self.peek() == '\t' {
            return Err(self.error("tab characters are not allowed in indentation"));
        }

        // Emit INDENT / DEDENT tokens
        let current = self.current_indent();
        if indent > current {
            self.indent_stack.push(indent);
            self.tokens.push(self.make_token(TokenType::Indent, ""));
        } else if indent < current {
            while self.current_indent() > indent {
                self.indent_stack.pop();
                self.tokens.push(self.make_token(TokenType::Dedent, ""));
            }
            if self.current_indent() != indent {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }

        loop {
            self.skip_spaces();
            if self.at_end() {
                return Ok(());
            }
            match self.peek() {
                '#' => self.skip_comment(),
                '\\' if self.peek_ahead(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                '\\' if self.peek_ahead(1) == Some('\r') && self.peek_ahead(2) == Some('\n') => {
                    self.advance();
                    self.advance();
                    self.advance();
                }
                '\n' => {
                    if self.depth > 0 {
                        self.advance();
                        continue;
                    }
                    self.tokens.push(self.make_token(TokenType::Newline, "\n"));
                    self.advance();
                    return Ok(());
                }
                _ => self.scan_token()?,
            }
        }
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let ch = self.peek();

        if ch == '"' || ch == '\'' {
            return self.scan_string(false);
        }

        if ch.is_ascii_digit() || (ch == '.' && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit())) {
            return self.scan_number();
        }

        if ch.is_alphabetic() || ch == '_' {
            // Raw string prefix
            if (ch == 'r' || ch == 'R') && matches!(self.peek_ahead(1), Some('"') | Some('\'')) {
                self.advance();
                return self.scan_string(true);
            }
            return self.scan_identifier();
        }

        for (text, tt) in OPERATORS {
            if self.matches(text) {
                let start = self.position();
                for _ in 0..text.chars().count() {
                    self.advance();
                }
                if tt.opens_bracket() {
                    self.depth += 1;
                } else if tt.closes_bracket() {
                    if self.depth == 0 {
                        return Err(LexerError {
                            message: format!("unexpected {:?}", text),
                            pos: start,
                            file: self.filename.clone(),
                        });
                    }
                    self.depth -= 1;
                }
                self.tokens.push(Token {
                    token_type: *tt,
                    value: text.to_string(),
                    pos: start,
                });
                return Ok(());
            }
        }

        Err(self.error(&format!("unexpected input character {:?}", ch)))
    }

    fn scan_string(&mut self, raw: bool) -> Result<(), LexerError> {
        let start = self.position();
        let quote = self.advance();
        let triple = self.peek_ahead(0) == Some(quote) && self.peek_ahead(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }
        let mut chars = String::new();

        loop {
            if self.at_end() {
                return Err(LexerError {
                    message: "unexpected EOF in string".to_string(),
                    pos: start,
                    file: self.filename.clone(),
                });
            }
            let ch = self.peek();
            if ch == quote {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_ahead(1) == Some(quote) && self.peek_ahead(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
                chars.push(self.advance());
                continue;
            }
            if ch == '\n' && !triple {
                return Err(LexerError {
                    message: "unexpected newline in string".to_string(),
                    pos: start,
                    file: self.filename.clone(),
                });
            }
            if ch == '\\' {
                if raw {
                    // A raw string keeps the backslash; an escaped quote
                    // still does not terminate the literal.
                    chars.push(self.advance());
                    if !self.at_end() {
                        chars.push(self.advance());
                    }
                    continue;
                }
                self.scan_escape(&mut chars)?;
                continue;
            }
            chars.push(self.advance());
        }

        self.tokens.push(Token {
            token_type: TokenType::StringLit,
            value: chars,
            pos: start,
        });
        Ok(())
    }

    fn scan_escape(&mut self, out: &mut String) -> Result<(), LexerError> {
        let esc_pos = self.position();
        self.advance(); // consume backslash
        if self.at_end() {
            return Err(self.error("unexpected EOF in string"));
        }
        let escaped = self.advance();
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\n' => {} // line continuation inside a string
            'x' => out.push(self.scan_hex_escape(2, esc_pos)?),
            'u' => out.push(self.scan_hex_escape(4, esc_pos)?),
            'U' => out.push(self.scan_hex_escape(8, esc_pos)?),
            other => {
                return Err(LexerError {
                    message: format!("invalid escape sequence \\{}", other),
                    pos: esc_pos,
                    file: self.filename.clone(),
                });
            }
        }
        Ok(())
    }

    fn scan_hex_escape(&mut self, digits: usize, esc_pos: Position) -> Result<char, LexerError> {
        let mut text = String::with_capacity(digits);
        for _ in 0..digits {
            if self.at_end() || !self.peek().is_ascii_hexdigit() {
                return Err(LexerError {
                    message: format!("truncated escape sequence: expected {} hex digits", digits),
                    pos: esc_pos,
                    file: self.filename.clone(),
                });
            }
            text.push(self.advance());
        }
        u32::from_str_radix(&text, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| LexerError {
                message: format!("invalid Unicode code point in escape sequence: {}", text),
                pos: esc_pos,
                file: self.filename.clone(),
            })
    }

    fn scan_number(&mut self) -> Result<(), LexerError> {
        let start = self.position();
        let mut num_chars = String::new();

        // Prefixed integer literals: 0x, 0o, 0b
        if self.peek() == '0' {
            if let Some(prefix) = self.peek_ahead(1) {
                let radix = match prefix {
                    'x' | 'X' => Some(16),
                    'o' | 'O' => Some(8),
                    'b' | 'B' => Some(2),
                    _ => None,
                };
                if let Some(radix) = radix {
                    num_chars.push(self.advance());
                    num_chars.push(self.advance().to_ascii_lowercase());
                    let digits_start = num_chars.len();
                    while !self.at_end() && self.peek().is_digit(radix) {
                        num_chars.push(self.advance());
                    }
                    if num_chars.len() == digits_start {
                        return Err(LexerError {
                            message: format!("invalid base-{} integer literal", radix),
                            pos: start,
                            file: self.filename.clone(),
                        });
                    }
                    self.tokens.push(Token {
                        token_type: TokenType::Integer,
                        value: num_chars,
                        pos: start,
                    });
                    return Ok(());
                }
            }
        }

        let mut is_float = false;
        while !self.at_end() && self.peek().is_ascii_digit() {
            num_chars.push(self.advance());
        }
        if !self.at_end() && self.peek() == '.' {
            is_float = true;
            num_chars.push(self.advance());
            while !self.at_end() && self.peek().is_ascii_digit() {
                num_chars.push(self.advance());
            }
        }
        if !self.at_end() && (self.peek() == 'e' || self.peek() == 'E') {
            let sign = self.peek_ahead(1);
            let has_digits = match sign {
                Some('+') | Some('-') => self.peek_ahead(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if has_digits {
                is_float = true;
                num_chars.push(self.advance());
                if matches!(self.peek(), '+' | '-') {
                    num_chars.push(self.advance());
                }
                while !self.at_end() && self.peek().is_ascii_digit() {
                    num_chars.push(self.advance());
                }
            }
        }

        if !is_float && num_chars.len() > 1 && num_chars.starts_with('0') && num_chars.chars().any(|c| c != '0') {
            return Err(LexerError {
                message: format!("obsolete form of octal literal; use 0o{}", num_chars.trim_start_matches('0')),
                pos: start,
                file: self.filename.clone(),
            });
        }

        if !self.at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            return Err(self.error(&format!("invalid character {:?} in numeric literal", self.peek())));
        }

        let tt = if is_float { TokenType::Float } else { TokenType::Integer };
        self.tokens.push(Token {
            token_type: tt,
            value: num_chars,
            pos: start,
        });
        Ok(())
    }

    fn scan_identifier(&mut self) -> Result<(), LexerError> {
        let start = self.position();
        let mut word = String::new();

        while !self.at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            word.push(self.advance());
        }

        if is_reserved(&word) {
            return Err(LexerError {
                message: format!("keyword {} is reserved", word),
                pos: start,
                file: self.filename.clone(),
            });
        }

        let tt = keyword_type(&word).unwrap_or(TokenType::Identifier);
        self.tokens.push(Token {
            token_type: tt,
            value: word,
            pos: start,
        });
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    fn peek(&self) -> char {
        self.source[self.pos]
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn matches(&self, text: &str) -> bool {
        text.chars().enumerate().all(|(i, c)| self.peek_ahead(i) == Some(c))
    }

    fn advance(&mut self) -> char {
        let ch = self.source[self.pos];
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn skip_spaces(&mut self) {
        while !self.at_end() && matches!(self.peek(), ' ' | '\t' | '\r') {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        while !self.at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn error(&self, message: &str) -> LexerError {
        LexerError {
            message: message.to_string(),
            pos: self.position(),
            file: self.filename.clone(),
        }
    }

    fn make_token(&self, token_type: TokenType, value: &str) -> Token {
        Token {
            token_type,
            value: value.to_string(),
            pos: self.position(),
        }
    }
}
