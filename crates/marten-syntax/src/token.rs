//! Lexical tokens

use crate::region::Region;

/// Token kind, carrying literal payloads where applicable
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal (escapes already resolved)
    Str(String),
    /// Identifier
    Name(String),

    // Keywords
    /// `null`
    Null,
    /// `true`
    True,
    /// `false`
    False,
    /// `let`
    Let,
    /// `fn`
    Fn,
    /// `class`
    Class,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `return`
    Return,
    /// `throw`
    Throw,
    /// `try`
    Try,
    /// `catch`
    Catch,
    /// `finally`
    Finally,

    // Punctuation
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `;`
    Semi,
    /// `.`
    Dot,
    /// `=`
    Assign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `!`
    Bang,
    /// `==`
    EqEq,
    /// `!=`
    BangEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Look up the keyword for an identifier, if it is one
    pub fn keyword(name: &str) -> Option<TokenKind> {
        Some(match name {
            "null" => Self::Null,
            "true" => Self::True,
            "false" => Self::False,
            "let" => Self::Let,
            "fn" => Self::Fn,
            "class" => Self::Class,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "return" => Self::Return,
            "throw" => Self::Throw,
            "try" => Self::Try,
            "catch" => Self::Catch,
            "finally" => Self::Finally,
            _ => return None,
        })
    }

    /// Human-readable description for diagnostics
    pub fn describe(&self) -> String {
        match self {
            Self::Int(n) => format!("integer `{}`", n),
            Self::Float(n) => format!("float `{}`", n),
            Self::Str(_) => "string literal".to_string(),
            Self::Name(n) => format!("`{}`", n),
            Self::Eof => "end of input".to_string(),
            other => format!("`{}`", other.text()),
        }
    }

    fn text(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::True => "true",
            Self::False => "false",
            Self::Let => "let",
            Self::Fn => "fn",
            Self::Class => "class",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Return => "return",
            Self::Throw => "throw",
            Self::Try => "try",
            Self::Catch => "catch",
            Self::Finally => "finally",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Semi => ";",
            Self::Dot => ".",
            Self::Assign => "=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::EqEq => "==",
            Self::BangEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            _ => "",
        }
    }
}

/// A lexical token with its source region
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind and payload
    pub kind: TokenKind,
    /// Source region
    pub region: Region,
}

impl Token {
    /// Create a new token
    pub fn new(kind: TokenKind, region: Region) -> Self {
        Self { kind, region }
    }
}
