//! Python string literals: single or double quoted, with backslash escapes.
use nom::{
    branch::alt,
    bytes::complete::{is_not, take},
    character::complete::{anychar, char, line_ending},
    combinator::{map, value, verify},
    multi::fold_many0,
    sequence::{delimited, preceded},
};

use crate::parser::{
    error::{ParseError, ParseErrorKind},
    ParseResult, Span,
};

/// The code point spelled by exactly `digits` hex digits, as in `\x41`,
/// `\u03bb` or `\U0001F600`
fn hex_escape<'a>(digits: usize) -> impl Fn(Span<'a>) -> ParseResult<'a, char> {
    move |from: Span<'a>| {
        let (i, hex) = verify(take(digits), |s: &Span<'a>| {
            s.fragment().chars().all(|c| c.is_ascii_hexdigit())
        })(from)?;
        let hex = hex.fragment().to_string();
        let (i, x) = ParseError::res(u32::from_str_radix(&hex, 16), i, |e| {
            ParseErrorKind::InvalidBase16EscapeSequence(hex.clone(), Some(e))
        })?;
        ParseError::opt(
            char::from_u32(x),
            i,
            ParseErrorKind::InvalidBase16EscapeSequence(hex.clone(), None),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Text(Span<'a>),
    Char(char),
    /// An escape Python leaves alone, backslash included
    Verbatim(char),
    /// Backslash-newline, which joins lines
    Continuation,
}

fn escape<'a>(from: Span<'a>) -> ParseResult<'a, Piece<'a>> {
    preceded(
        char('\\'),
        alt((
            value(Piece::Continuation, line_ending),
            map(
                alt((
                    value('\n', char('n')),
                    value('\r', char('r')),
                    value('\t', char('t')),
                    value('\0', char('0')),
                    value('\u{07}', char('a')),
                    value('\u{08}', char('b')),
                    value('\u{0C}', char('f')),
                    value('\u{0B}', char('v')),
                    value('\\', char('\\')),
                    value('\'', char('\'')),
                    value('"', char('"')),
                    preceded(char('x'), hex_escape(2)),
                    preceded(char('u'), hex_escape(4)),
                    preceded(char('U'), hex_escape(8)),
                )),
                Piece::Char,
            ),
            map(anychar, Piece::Verbatim),
        )),
    )(from)
}

fn piece<'a>(delim: char) -> impl Fn(Span<'a>) -> ParseResult<'a, Piece<'a>> {
    move |from: Span<'a>| {
        let stop: String = [delim, '\\', '\n'].iter().collect();
        let result = alt((
            map(is_not(stop.as_str()), Piece::Text),
            escape,
        ))(from);
        result
    }
}

/// The contents of a literal, up to but excluding the closing `delim`
pub fn parse_string_inner<'a>(delim: char) -> impl Fn(Span<'a>) -> ParseResult<'a, String> {
    move |from: Span<'a>| {
        fold_many0(piece(delim), String::new, |mut s, piece| {
            match piece {
                Piece::Text(t) => s.push_str(t.fragment()),
                Piece::Char(c) => s.push(c),
                Piece::Verbatim(c) => {
                    s.push('\\');
                    s.push(c);
                }
                Piece::Continuation => {}
            }
            s
        })(from)
    }
}

pub fn parse_string<'a>(delim: char) -> impl Fn(Span<'a>) -> ParseResult<'a, String> {
    move |from: Span<'a>| delimited(char(delim), parse_string_inner(delim), char(delim))(from)
}

/// Parse either a single or double quoted string
pub fn parse_quoted<'a>() -> impl Fn(Span<'a>) -> ParseResult<'a, String> {
    move |from: Span<'a>| alt((parse_string('"'), parse_string('\'')))(from)
}

/// Renders `s` as a double quoted literal that [`parse_quoted`] reads back verbatim
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn parsed<'a>(p: impl Fn(Span<'a>) -> ParseResult<'a, String>, i: &'a str) -> Option<String> {
        match p(Span::new(i)) {
            Ok((rest, s)) if rest.fragment().is_empty() => Some(s),
            _ => None,
        }
    }

    #[test]
    fn literals() {
        assert_eq!(parsed(parse_string('"'), "\"foo\"").as_deref(), Some("foo"));
        assert_eq!(parsed(parse_string('"'), "\"\"").as_deref(), Some(""));
        assert_eq!(parsed(parse_string('\''), "'it\\'s'").as_deref(), Some("it's"));
        assert_eq!(parsed(parse_quoted(), "\"dou'ble\"").as_deref(), Some("dou'ble"));
        assert_eq!(parsed(parse_quoted(), "\"unterminated"), None);
        assert_eq!(parsed(parse_quoted(), "'no\nnewlines'"), None);
    }

    #[test]
    fn escapes() {
        assert_eq!(parsed(parse_quoted(), r"'a\nb\tc'").as_deref(), Some("a\nb\tc"));
        assert_eq!(parsed(parse_quoted(), r"'\x41\u03bb\U0001F600'").as_deref(), Some("Aλ😀"));
        assert_eq!(parsed(parse_quoted(), r"'C:\dir'").as_deref(), Some("C:\\dir"));
        assert_eq!(parsed(parse_quoted(), "'one \\\ntwo'").as_deref(), Some("one two"));
        assert_eq!(parsed(parse_quoted(), r"'\xZZ'").as_deref(), Some("\\xZZ"));
    }

    #[test]
    fn quote_reads_back() {
        for s in ["plain", "with \"quotes\"", "back\\slash", "new\nline", "it's"] {
            assert_eq!(parsed(parse_quoted(), &quote(s)).as_deref(), Some(s));
        }
    }
}
