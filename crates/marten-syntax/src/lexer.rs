//! Hand-written lexer

use crate::error::{SyntaxError, SyntaxResult};
use crate::region::{Region, SourceId};
use crate::token::{Token, TokenKind};

/// Turn source text into a token stream ending in `Eof`
pub fn tokenize(source: &str, source_id: SourceId) -> SyntaxResult<Vec<Token>> {
    Lexer::new(source, source_id).run()
}

struct Lexer<'s> {
    chars: std::iter::Peekable<std::str::Chars<'s>>,
    source_id: SourceId,
    line: u32,
    column: u32,
}

impl<'s> Lexer<'s> {
    fn new(source: &'s str, source_id: SourceId) -> Self {
        Self {
            chars: source.chars().peekable(),
            source_id,
            line: 1,
            column: 1,
        }
    }

    fn run(mut self) -> SyntaxResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.advance() else {
                tokens.push(Token::new(
                    TokenKind::Eof,
                    Region::point(self.source_id, line, column),
                ));
                return Ok(tokens);
            };

            let kind = match c {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semi,
                '.' => TokenKind::Dot,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '=' => {
                    if self.eat('=') {
                        TokenKind::EqEq
                    } else {
                        TokenKind::Assign
                    }
                }
                '!' => {
                    if self.eat('=') {
                        TokenKind::BangEq
                    } else {
                        TokenKind::Bang
                    }
                }
                '<' => {
                    if self.eat('=') {
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    if self.eat('=') {
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '&' => {
                    if self.eat('&') {
                        TokenKind::AndAnd
                    } else {
                        return Err(self.error("expected `&&`", line, column));
                    }
                }
                '|' => {
                    if self.eat('|') {
                        TokenKind::OrOr
                    } else {
                        return Err(self.error("expected `||`", line, column));
                    }
                }
                '"' => self.string(line, column)?,
                c if c.is_ascii_digit() => self.number(c, line, column)?,
                c if c.is_alphabetic() || c == '_' => self.name(c),
                c => {
                    return Err(self.error(format!("unexpected character `{}`", c), line, column));
                }
            };

            let region = Region::new(self.source_id, line, column, self.line, self.column);
            tokens.push(Token::new(kind, region));
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    // Line comment or division; only consume on `//`
                    let mut look = self.chars.clone();
                    look.next();
                    if look.peek() == Some(&'/') {
                        while let Some(&c) = self.chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn string(&mut self, line: u32, column: u32) -> SyntaxResult<TokenKind> {
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(TokenKind::Str(text)),
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(c) => {
                        return Err(self.error(
                            format!("unknown escape `\\{}`", c),
                            self.line,
                            self.column.saturating_sub(2),
                        ));
                    }
                    None => return Err(self.error("unterminated string", line, column)),
                },
                Some(c) => text.push(c),
                None => return Err(self.error("unterminated string", line, column)),
            }
        }
    }

    fn number(&mut self, first: char, line: u32, column: u32) -> SyntaxResult<TokenKind> {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // Fractional part only when a digit follows the dot, so `x.y` lexes
        // as member access.
        let mut is_float = false;
        if self.chars.peek() == Some(&'.') {
            let mut look = self.chars.clone();
            look.next();
            if look.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('.');
                self.advance();
                while let Some(&c) = self.chars.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error("invalid float literal", line, column))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error("integer literal out of range", line, column))
        }
    }

    fn name(&mut self, first: char) -> TokenKind {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::keyword(&text).unwrap_or(TokenKind::Name(text))
    }

    fn error(&self, message: impl Into<String>, line: u32, column: u32) -> SyntaxError {
        SyntaxError::new(message, Region::point(self.source_id, line, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, SourceId(0))
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_punctuation_and_keywords() {
        assert_eq!(
            kinds("try { } catch (e) { }"),
            vec![
                TokenKind::Try,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Catch,
                TokenKind::LParen,
                TokenKind::Name("e".into()),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 10.wide"),
            vec![
                TokenKind::Int(1),
                TokenKind::Float(2.5),
                TokenKind::Int(10),
                TokenKind::Dot,
                TokenKind::Name("wide".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::Str("a\nb".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("1 // ignored\n2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_regions_track_lines() {
        let tokens = tokenize("let\nx", SourceId(0)).unwrap();
        assert_eq!(tokens[0].region.start_line, 1);
        assert_eq!(tokens[1].region.start_line, 2);
        assert_eq!(tokens[1].region.start_column, 1);
    }

    #[test]
    fn test_unterminated_string_errors() {
        let err = tokenize("\"abc", SourceId(0)).unwrap_err();
        assert!(err.message.contains("unterminated"));
    }
}
