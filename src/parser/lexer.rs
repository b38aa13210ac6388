//! Lexer - statement text to positioned tokens

use crate::error::{Result, RqlError};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword (keywords are matched case-insensitively by the parser)
    Ident(String),
    /// Double-quoted string, escapes already decoded
    Str(String),
    /// Number as written (`42`, `-3.5`, `1e3`)
    Number(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Eq,
    Star,
    Dot,
    Eof,
}

impl TokenKind {
    /// Human description for error messages
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(s) => format!("'{}'", s),
            Self::Str(s) => format!("string \"{}\"", s),
            Self::Number(n) => format!("number {}", n),
            Self::LBrace => "'{'".into(),
            Self::RBrace => "'}'".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::LBracket => "'['".into(),
            Self::RBracket => "']'".into(),
            Self::Comma => "','".into(),
            Self::Colon => "':'".into(),
            Self::Semicolon => "';'".into(),
            Self::Eq => "'='".into(),
            Self::Star => "'*'".into(),
            Self::Dot => "'.'".into(),
            Self::Eof => "end of input".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based line
    pub line: usize,
    /// 1-based column (in characters)
    pub column: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') => {
                    // `--` line comment; a lone '-' belongs to a number
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.next() != Some('-') {
                        return;
                    }
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let token = |kind| Token { kind, line, column };

        let Some(ch) = self.peek() else {
            return Ok(token(TokenKind::Eof));
        };

        let kind = match ch {
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            ',' => self.single(TokenKind::Comma),
            ':' => self.single(TokenKind::Colon),
            ';' => self.single(TokenKind::Semicolon),
            '=' => self.single(TokenKind::Eq),
            '*' => self.single(TokenKind::Star),
            '.' => self.single(TokenKind::Dot),
            '"' => self.string(line, column)?,
            '-' | '0'..='9' => self.number(line, column)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.ident(),
            other => {
                return Err(RqlError::parse(
                    format!("unexpected character '{}'", other),
                    line,
                    column,
                ))
            }
        };

        Ok(token(kind))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn ident(&mut self) -> TokenKind {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::Ident(s)
    }

    fn digits(&mut self, out: &mut String) -> usize {
        let mut n = 0;
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            out.push(c);
            self.bump();
            n += 1;
        }
        n
    }

    fn number(&mut self, line: usize, column: usize) -> Result<TokenKind> {
        let mut s = String::new();
        if self.peek() == Some('-') {
            s.push('-');
            self.bump();
        }
        if self.digits(&mut s) == 0 {
            return Err(RqlError::parse("expected digits after '-'", line, column));
        }
        if self.peek() == Some('.') {
            s.push('.');
            self.bump();
            if self.digits(&mut s) == 0 {
                return Err(RqlError::parse(
                    format!("malformed number '{}'", s),
                    line,
                    column,
                ));
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            s.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                s.push(sign);
                self.bump();
            }
            if self.digits(&mut s) == 0 {
                return Err(RqlError::parse(
                    format!("malformed exponent in '{}'", s),
                    line,
                    column,
                ));
            }
        }
        Ok(TokenKind::Number(s))
    }

    fn string(&mut self, line: usize, column: usize) -> Result<TokenKind> {
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(RqlError::parse("unterminated string", line, column)),
                Some('"') => return Ok(TokenKind::Str(s)),
                Some('\\') => {
                    let (esc_line, esc_col) = (self.line, self.column);
                    match self.bump() {
                        Some('"') => s.push('"'),
                        Some('\\') => s.push('\\'),
                        Some('/') => s.push('/'),
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('r') => s.push('\r'),
                        Some('b') => s.push('\u{8}'),
                        Some('f') => s.push('\u{c}'),
                        Some('u') => s.push(self.unicode_escape(esc_line, esc_col)?),
                        Some(other) => {
                            return Err(RqlError::parse(
                                format!("invalid escape '\\{}'", other),
                                esc_line,
                                esc_col,
                            ))
                        }
                        None => return Err(RqlError::parse("unterminated string", line, column)),
                    }
                }
                Some(c) => s.push(c),
            }
        }
    }

    /// `\uXXXX`, combining a UTF-16 surrogate pair into one code point
    fn unicode_escape(&mut self, line: usize, column: usize) -> Result<char> {
        let first = self.hex4(line, column)?;
        let code = match first {
            0xD800..=0xDBFF => {
                if self.bump() != Some('\\') || self.bump() != Some('u') {
                    return Err(RqlError::parse(
                        format!("unpaired surrogate \\u{:04x}", first),
                        line,
                        column,
                    ));
                }
                let second = self.hex4(line, column)?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(RqlError::parse(
                        format!("unpaired surrogate \\u{:04x}", first),
                        line,
                        column,
                    ));
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => {
                return Err(RqlError::parse(
                    format!("unpaired surrogate \\u{:04x}", first),
                    line,
                    column,
                ))
            }
            other => other,
        };
        char::from_u32(code).ok_or_else(|| {
            RqlError::parse(format!("invalid code point \\u{:04x}", code), line, column)
        })
    }

    fn hex4(&mut self, line: usize, column: usize) -> Result<u32> {
        let mut value = 0;
        for _ in 0..4 {
            match self.bump().and_then(|c| c.to_digit(16)) {
                Some(digit) => value = value * 16 + digit,
                None => return Err(RqlError::parse("invalid \\u escape", line, column)),
            }
        }
        Ok(value)
    }
}

/// Tokenize statement text (always ends with `Eof`)
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
