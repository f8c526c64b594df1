//! Strict decoder for the literal values a chat model is asked to reply with.
//!
//! Only numbers, strings and nested tuples/lists are understood. Names,
//! calls, operators and any other expression syntax are rejected, so a reply
//! is never evaluated as code.

use std::fmt;

use thiserror::Error;

pub const MAX_NESTING: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("reply is empty")]
    Empty,
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character {found:?} at byte {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("unterminated string starting at byte {offset}")]
    UnterminatedString { offset: usize },
    #[error("invalid escape sequence at byte {offset}")]
    InvalidEscape { offset: usize },
    #[error("invalid number {text:?} at byte {offset}")]
    InvalidNumber { text: String, offset: usize },
    #[error("nesting deeper than {limit} levels")]
    TooDeep { limit: usize },
    #[error("unexpected trailing input at byte {offset}")]
    TrailingInput { offset: usize },
    #[error("expected a two-element sequence, found {found}")]
    NotAPair { found: String },
    #[error("malformed payload for tag {tag:?}: {reason}")]
    MalformedPayload { tag: String, reason: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqKind {
    Tuple,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Seq(SeqKind, Vec<Literal>),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Literal]> {
        match self {
            Self::Seq(_, items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) | Self::Float(_) => "number",
            Self::Str(_) => "string",
            Self::Seq(SeqKind::Tuple, _) => "tuple",
            Self::Seq(SeqKind::List, _) => "list",
        }
    }

    fn negated(self) -> Self {
        match self {
            Self::Int(value) => value
                .checked_neg()
                .map(Self::Int)
                .unwrap_or(Self::Float(-(value as f64))),
            Self::Float(value) => Self::Float(-value),
            other => other,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => {
                if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
                    write!(f, "{value:.1}")
                } else {
                    write!(f, "{value}")
                }
            }
            Self::Str(text) => {
                f.write_str("'")?;
                for ch in text.chars() {
                    match ch {
                        '\\' => f.write_str("\\\\")?,
                        '\'' => f.write_str("\\'")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("'")
            }
            Self::Seq(kind, items) => {
                let (open, close) = match kind {
                    SeqKind::Tuple => ("(", ")"),
                    SeqKind::List => ("[", "]"),
                };
                f.write_str(open)?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if *kind == SeqKind::Tuple && items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(close)
            }
        }
    }
}

pub fn parse_literal(input: &str) -> Result<Literal, ParseError> {
    let mut parser = LiteralParser::new(input);
    parser.skip_trivia();
    if parser.at_end() {
        return Err(ParseError::Empty);
    }

    let value = parser.parse_top()?;
    parser.skip_trivia();
    if let Some((offset, _)) = parser.peek() {
        return Err(ParseError::TrailingInput { offset });
    }

    Ok(value)
}

struct LiteralParser<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    depth: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<(usize, char)> {
        self.chars.get(self.pos).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, ch)| *ch)
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.peek();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn offset(&self) -> usize {
        self.peek().map(|(offset, _)| offset).unwrap_or(self.src.len())
    }

    fn unexpected(&self) -> ParseError {
        match self.peek() {
            Some((offset, found)) => ParseError::UnexpectedChar { found, offset },
            None => ParseError::UnexpectedEnd,
        }
    }

    // Whitespace and `#` comments.
    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.pos += 1;
            } else if ch == '#' {
                while let Some(ch) = self.peek_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ParseError::TooDeep { limit: MAX_NESTING });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// A bare `a, b` at the top level is a tuple.
    fn parse_top(&mut self) -> Result<Literal, ParseError> {
        let first = self.parse_value()?;
        self.skip_trivia();
        if self.peek_char() != Some(',') {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.peek_char() == Some(',') {
            self.bump();
            self.skip_trivia();
            if self.at_end() {
                break;
            }
            items.push(self.parse_value()?);
            self.skip_trivia();
        }
        Ok(Literal::Seq(SeqKind::Tuple, items))
    }

    fn parse_value(&mut self) -> Result<Literal, ParseError> {
        self.skip_trivia();
        let Some((offset, ch)) = self.peek() else {
            return Err(ParseError::UnexpectedEnd);
        };

        match ch {
            '(' => self.parse_parenthesized(),
            '[' => self.parse_list(),
            '+' | '-' => self.parse_signed(),
            _ if self.at_string_start() => self.parse_strings(),
            _ if self.at_number_start() => self.parse_number(),
            found => Err(ParseError::UnexpectedChar { found, offset }),
        }
    }

    fn at_string_start(&self) -> bool {
        match self.peek_char() {
            Some('"' | '\'') => true,
            Some('r' | 'R' | 'u' | 'U') => matches!(self.peek_at(1), Some('"' | '\'')),
            _ => false,
        }
    }

    fn at_number_start(&self) -> bool {
        match self.peek_char() {
            Some(ch) if ch.is_ascii_digit() => true,
            Some('.') => self.peek_at(1).is_some_and(|ch| ch.is_ascii_digit()),
            _ => false,
        }
    }

    fn parse_parenthesized(&mut self) -> Result<Literal, ParseError> {
        self.enter()?;
        self.bump();
        self.skip_trivia();
        if self.peek_char() == Some(')') {
            self.bump();
            self.leave();
            return Ok(Literal::Seq(SeqKind::Tuple, Vec::new()));
        }

        let first = self.parse_value()?;
        self.skip_trivia();
        let value = match self.peek_char() {
            Some(')') => {
                self.bump();
                first
            }
            Some(',') => Literal::Seq(SeqKind::Tuple, self.parse_items(first, ')')?),
            _ => return Err(self.unexpected()),
        };
        self.leave();
        Ok(value)
    }

    fn parse_list(&mut self) -> Result<Literal, ParseError> {
        self.enter()?;
        self.bump();
        self.skip_trivia();
        if self.peek_char() == Some(']') {
            self.bump();
            self.leave();
            return Ok(Literal::Seq(SeqKind::List, Vec::new()));
        }

        let first = self.parse_value()?;
        let items = self.parse_items(first, ']')?;
        self.leave();
        Ok(Literal::Seq(SeqKind::List, items))
    }

    /// Continues a sequence after its first item, up to and including `close`.
    /// A trailing comma is allowed.
    fn parse_items(&mut self, first: Literal, close: char) -> Result<Vec<Literal>, ParseError> {
        let mut items = vec![first];
        loop {
            self.skip_trivia();
            match self.peek_char() {
                Some(ch) if ch == close => {
                    self.bump();
                    return Ok(items);
                }
                Some(',') => {
                    self.bump();
                    self.skip_trivia();
                    if self.peek_char() == Some(close) {
                        self.bump();
                        return Ok(items);
                    }
                    items.push(self.parse_value()?);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    /// Adjacent string literals concatenate, as in `"a" "b"`.
    fn parse_strings(&mut self) -> Result<Literal, ParseError> {
        let mut text = String::new();
        loop {
            self.parse_string_into(&mut text)?;
            self.skip_trivia();
            if !self.at_string_start() {
                return Ok(Literal::Str(text));
            }
        }
    }

    fn parse_string_into(&mut self, out: &mut String) -> Result<(), ParseError> {
        let start = self.offset();
        let mut raw = false;
        match self.peek_char() {
            Some('r' | 'R') => {
                raw = true;
                self.bump();
            }
            Some('u' | 'U') => {
                self.bump();
            }
            _ => {}
        }

        let Some((_, quote)) = self.bump() else {
            return Err(ParseError::UnexpectedEnd);
        };
        let triple = self.peek_char() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }

        loop {
            let Some((offset, ch)) = self.bump() else {
                return Err(ParseError::UnterminatedString { offset: start });
            };
            match ch {
                _ if ch == quote => {
                    if !triple {
                        return Ok(());
                    }
                    if self.peek_char() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.pos += 2;
                        return Ok(());
                    }
                    out.push(ch);
                }
                '\n' if !triple => return Err(ParseError::UnterminatedString { offset: start }),
                '\\' if raw => {
                    out.push('\\');
                    if let Some((_, next)) = self.bump() {
                        out.push(next);
                    }
                }
                '\\' => self.parse_escape(out, offset, start)?,
                other => out.push(other),
            }
        }
    }

    fn parse_escape(
        &mut self,
        out: &mut String,
        offset: usize,
        string_start: usize,
    ) -> Result<(), ParseError> {
        let Some((_, ch)) = self.bump() else {
            return Err(ParseError::UnterminatedString {
                offset: string_start,
            });
        };

        match ch {
            '\n' => {}
            '\\' | '\'' | '"' => out.push(ch),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),
            '0'..='7' => {
                let mut value = ch.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek_char().and_then(|next| next.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            self.bump();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).ok_or(ParseError::InvalidEscape { offset })?);
            }
            'x' => out.push(self.read_hex_escape(2, offset)?),
            'u' => out.push(self.read_hex_escape(4, offset)?),
            'U' => out.push(self.read_hex_escape(8, offset)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn read_hex_escape(&mut self, digits: usize, offset: usize) -> Result<char, ParseError> {
        let mut value = 0u32;
        for _ in 0..digits {
            let digit = self
                .bump()
                .and_then(|(_, ch)| ch.to_digit(16))
                .ok_or(ParseError::InvalidEscape { offset })?;
            value = value * 16 + digit;
        }
        char::from_u32(value).ok_or(ParseError::InvalidEscape { offset })
    }

    /// One sign only; `--1` is not a literal.
    fn parse_signed(&mut self) -> Result<Literal, ParseError> {
        let negative = matches!(self.bump(), Some((_, '-')));
        self.skip_trivia();
        if !self.at_number_start() {
            return Err(self.unexpected());
        }
        let value = self.parse_number()?;
        Ok(if negative { value.negated() } else { value })
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(ch) = self.peek_char() {
            if !keep(ch) {
                break;
            }
            text.push(ch);
            self.pos += 1;
        }
        text
    }

    fn parse_number(&mut self) -> Result<Literal, ParseError> {
        let offset = self.offset();

        if self.peek_char() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let digits = self.take_while(|ch| ch.is_ascii_alphanumeric() || ch == '_');
                let cleaned = digits.trim_start_matches('_').replace('_', "");
                return i64::from_str_radix(&cleaned, radix)
                    .map(Literal::Int)
                    .map_err(|_| ParseError::InvalidNumber {
                        text: digits,
                        offset,
                    });
            }
        }

        let mut text = self.take_while(|ch| ch.is_ascii_digit() || ch == '_' || ch == '.');
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|ch| ch.is_ascii_digit()) {
                text.push('e');
                if signed {
                    text.extend(self.peek_at(1));
                }
                self.pos += digit_at;
                text.push_str(&self.take_while(|ch| ch.is_ascii_digit() || ch == '_'));
            }
        }

        let invalid = || ParseError::InvalidNumber {
            text: text.clone(),
            offset,
        };

        if let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' {
                return Err(invalid());
            }
        }
        if text.starts_with('_')
            || text.ends_with('_')
            || text.contains("__")
            || text.contains("_.")
            || text.contains("._")
            || text.contains("_e")
        {
            return Err(invalid());
        }

        let cleaned = text.replace('_', "");
        if cleaned.contains('.') || cleaned.contains('e') {
            return cleaned
                .parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| invalid());
        }

        match cleaned.parse::<i64>() {
            Ok(value) => Ok(Literal::Int(value)),
            Err(_) => cleaned
                .parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| invalid()),
        }
    }
}
