/// SIEVE script tokenizer (RFC 5228).
///
/// The lexer is a cursor: the parser pulls one token at a time, so a lexical
/// error after an earlier syntax error is never reported first.
use crate::sieve::ast::{Position, Quantifier};
use crate::sieve::diagnostic::Diagnostic;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A `:tag` like `:is`, `:contains`, `:over`; stored without the colon.
    Tag(String),
    /// An unquoted identifier like `if`, `header`, `allof`, `fileinto`.
    Identifier(String),
    /// A double-quoted string, escapes already decoded.
    QuotedString(String),
    /// A multi-line `text:` literal, dot-stuffing already decoded.
    MultiLineString(String),
    /// A number, multiplied out by its K/M/G suffix.
    Number { value: u64, quantifier: Option<Quantifier> },
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    Eof,
}

impl Token {
    /// How the token is named in "expected ..." lists.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Tag(_) => "tag",
            Self::Identifier(_) => "identifier",
            Self::QuotedString(_) | Self::MultiLineString(_) => "string",
            Self::Number { .. } => "number",
            Self::Semicolon => ";",
            Self::Comma => ",",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Eof => "end of input",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Span {
    pub token: Token,
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: Position,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, bytes: input.as_bytes(), pos: Position::start() }
    }

    pub fn source(&self) -> &'a str {
        self.input
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos.offset).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos.offset + n).copied()
    }

    fn bump(&mut self) {
        let Some(byte) = self.peek() else {
            return;
        };
        self.pos.offset += 1;
        if byte == b'\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else if byte & 0xC0 != 0x80 {
            // UTF-8 continuation bytes belong to the previous column
            self.pos.column += 1;
        }
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn span(&self, token: Token, start: Position) -> Span {
        Span { token, start, end: self.pos }
    }

    /// Skip whitespace, `# ...` and `/* ... */` comments.
    fn skip_trivia(&mut self) -> Result<(), Diagnostic> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.bump(),
                Some(b'#') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.bump_n(2);
                    loop {
                        match self.peek() {
                            None => {
                                return Err(Diagnostic::lexical(
                                    "Unterminated block comment",
                                    start,
                                    self.pos,
                                ));
                            }
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.bump_n(2);
                                break;
                            }
                            Some(_) => self.bump(),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Span, Diagnostic> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(byte) = self.peek() else {
            return Ok(self.span(Token::Eof, start));
        };

        let punct = match byte {
            b';' => Some(Token::Semicolon),
            b',' => Some(Token::Comma),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'{' => Some(Token::LBrace),
            b'}' => Some(Token::RBrace),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            _ => None,
        };
        if let Some(token) = punct {
            self.bump();
            return Ok(self.span(token, start));
        }

        match byte {
            b'"' => self.quoted_string(start),
            b':' => {
                self.bump();
                if !matches!(self.peek(), Some(b) if b.is_ascii_alphabetic() || b == b'_') {
                    return Err(Diagnostic::lexical(
                        "Expected identifier after ':'",
                        self.pos,
                        self.pos,
                    ));
                }
                let name = self.identifier_text();
                Ok(self.span(Token::Tag(name.to_string()), start))
            }
            b'0'..=b'9' => self.number(start),
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let ident = self.identifier_text();
                if ident == "text" && self.peek() == Some(b':') {
                    self.bump();
                    return self.multiline_string(start);
                }
                Ok(self.span(Token::Identifier(ident.to_string()), start))
            }
            _ => {
                let c = self.input[start.offset..].chars().next().unwrap_or('\u{FFFD}');
                self.bump_n(c.len_utf8());
                Err(Diagnostic::lexical(
                    format!("Unexpected character '{}'", c.escape_debug()),
                    start,
                    self.pos,
                ))
            }
        }
    }

    fn identifier_text(&mut self) -> &'a str {
        let begin = self.pos.offset;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.bump();
        }
        let input = self.input;
        &input[begin..self.pos.offset]
    }

    fn quoted_string(&mut self, start: Position) -> Result<Span, Diagnostic> {
        self.bump(); // opening quote
        let mut s = String::new();
        let mut chunk = self.pos.offset;
        loop {
            match self.peek() {
                None => {
                    return Err(Diagnostic::lexical("Unterminated string", start, self.pos));
                }
                Some(b'"') => {
                    s.push_str(&self.input[chunk..self.pos.offset]);
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    s.push_str(&self.input[chunk..self.pos.offset]);
                    let escape = self.pos;
                    match self.peek_at(1) {
                        Some(c @ (b'\\' | b'"')) => {
                            s.push(c as char);
                            self.bump_n(2);
                        }
                        None => {
                            return Err(Diagnostic::lexical("Unterminated string", start, self.pos));
                        }
                        Some(_) => {
                            let rest = &self.input[escape.offset + 1..];
                            let c = rest.chars().next().unwrap_or('\u{FFFD}');
                            self.bump();
                            self.bump_n(c.len_utf8());
                            return Err(Diagnostic::lexical(
                                format!("Invalid escape sequence '\\{}'", c.escape_debug()),
                                escape,
                                self.pos,
                            ));
                        }
                    }
                    chunk = self.pos.offset;
                }
                Some(_) => self.bump(),
            }
        }
        Ok(self.span(Token::QuotedString(s), start))
    }

    /// `text:` has already been consumed.
    fn multiline_string(&mut self, start: Position) -> Result<Span, Diagnostic> {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.bump();
        }
        if self.peek() == Some(b'#') {
            while !matches!(self.peek(), None | Some(b'\n')) {
                self.bump();
            }
        }
        let header_crlf = self.peek() == Some(b'\r') && self.peek_at(1) == Some(b'\n');
        if header_crlf {
            self.bump();
        }
        if self.peek() != Some(b'\n') {
            let message = "Expected line break after 'text:'";
            return Err(Diagnostic::lexical(message, self.pos, self.pos));
        }
        self.bump();

        let mut body = String::new();
        let crlf_break;
        loop {
            if self.peek().is_none() {
                return Err(Diagnostic::lexical("Unterminated multi-line string", start, self.pos));
            }
            let line_start = self.pos.offset;
            while !matches!(self.peek(), None | Some(b'\n')) {
                self.bump();
            }
            let mut line = &self.input[line_start..self.pos.offset];
            let at_eof = self.peek().is_none();
            self.bump(); // newline, if any

            let bare = line.strip_suffix('\r').unwrap_or(line);
            if bare == "." {
                crlf_break = if at_eof { header_crlf } else { line.ends_with('\r') };
                break;
            }
            if at_eof {
                return Err(Diagnostic::lexical("Unterminated multi-line string", start, self.pos));
            }
            if line.starts_with("..") {
                line = &line[1..];
            }
            body.push_str(line);
            body.push('\n');
        }

        // The line break before the terminating dot is not part of the value.
        // It uses the same convention as the dot line's own break; any other
        // `\r` is content.
        if body.ends_with('\n') {
            body.pop();
            if crlf_break && body.ends_with('\r') {
                body.pop();
            }
        }
        Ok(self.span(Token::MultiLineString(body), start))
    }

    fn number(&mut self, start: Position) -> Result<Span, Diagnostic> {
        let digits = self.digits();
        let quantifier = self.peek().and_then(|b| Quantifier::from_char(b as char));
        if quantifier.is_some() {
            self.bump();
        }
        let value = digits
            .parse::<u64>()
            .ok()
            .and_then(|v| v.checked_mul(quantifier.map_or(1, |q| q.multiplier())));
        let Some(value) = value else {
            return Err(Diagnostic::lexical("Number out of range", start, self.pos));
        };
        Ok(self.span(Token::Number { value, quantifier }, start))
    }

    fn digits(&mut self) -> &'a str {
        let begin = self.pos.offset;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.bump();
        }
        let input = self.input;
        &input[begin..self.pos.offset]
    }
}
