use std::fmt;

use crate::ast::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Structure
    Indent,
    Dedent,
    Newline,
    Eof,

    // Literals
    StringLit,
    Integer,
    Float,
    Identifier,

    // Punctuation
    Dot,
    Comma,
    Semicolon,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Comparison / arithmetic
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    LtLt,
    GtGt,

    // Assignment
    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    SlashSlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    LtLtEq,
    GtGtEq,

    // Keywords
    And,
    Break,
    Continue,
    Def,
    Elif,
    Else,
    For,
    If,
    In,
    Lambda,
    Load,
    Not,
    Or,
    Pass,
    Return,
    While,
}

impl TokenType {
    /// Whether this token is one of the augmented assignment operators.
    pub fn is_augmented_assign(&self) -> bool {
        matches!(
            self,
            TokenType::PlusEq
                | TokenType::MinusEq
                | TokenType::StarEq
                | TokenType::SlashEq
                | TokenType::SlashSlashEq
                | TokenType::PercentEq
                | TokenType::AmpEq
                | TokenType::PipeEq
                | TokenType::CaretEq
                | TokenType::LtLtEq
                | TokenType::GtGtEq
        )
    }

    /// Tokens that open a bracketed region, inside which newlines and
    /// indentation are insignificant.
    pub fn opens_bracket(&self) -> bool {
        matches!(self, TokenType::LParen | TokenType::LBracket | TokenType::LBrace)
    }

    pub fn closes_bracket(&self) -> bool {
        matches!(self, TokenType::RParen | TokenType::RBracket | TokenType::RBrace)
    }
}

/// Look up a keyword string and return its TokenType, or None if it's a plain identifier.
pub fn keyword_type(word: &str) -> Option<TokenType> {
    match word {
        "and" => Some(TokenType::And),
        "break" => Some(TokenType::Break),
        "continue" => Some(TokenType::Continue),
        "def" => Some(TokenType::Def),
        "elif" => Some(TokenType::Elif),
        "else" => Some(TokenType::Else),
        "for" => Some(TokenType::For),
        "if" => Some(TokenType::If),
        "in" => Some(TokenType::In),
        "lambda" => Some(TokenType::Lambda),
        "load" => Some(TokenType::Load),
        "not" => Some(TokenType::Not),
        "or" => Some(TokenType::Or),
        "pass" => Some(TokenType::Pass),
        "return" => Some(TokenType::Return),
        "while" => Some(TokenType::While),
        _ => None,
    }
}

/// Words reserved for future use; the lexer rejects them as identifiers.
pub fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "as" | "assert"
            | "async"
            | "await"
            | "class"
            | "del"
            | "except"
            | "finally"
            | "from"
            | "global"
            | "import"
            | "is"
            | "nonlocal"
            | "raise"
            | "try"
            | "with"
            | "yield"
    )
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    /// Source text for identifiers and numbers; decoded contents for strings.
    pub value: String,
    pub pos: Position,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token_type {
            TokenType::Indent | TokenType::Dedent | TokenType::Newline | TokenType::Eof => {
                write!(f, "Token({:?}, {})", self.token_type, self.pos)
            }
            _ => {
                write!(f, "Token({:?}, {:?}, {})", self.token_type, self.value, self.pos)
            }
        }
    }
}
