use std::{cmp::Ordering, fmt, fmt::Write, num::ParseFloatError, num::ParseIntError};

use nom::{error::ErrorKind, AsBytes, Err, IResult, InputLength};

use crate::parser::Span;

#[derive(PartialEq, Debug, Clone)]
pub enum ParseErrorKind {
    InvalidBase16EscapeSequence(String, Option<ParseIntError>),
    ParseIntErr(ParseIntError),
    ParseFloatErr(ParseFloatError),
    ReservedWord(String),
    InvalidTarget,
    TrailingInput(String),
    Nom(ErrorKind),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBase16EscapeSequence(seq, _) => {
                write!(f, "Unknown base 16 string escape sequence {}.", seq)
            }
            Self::ParseIntErr(e) => {
                write!(f, "Error parsing number: {}", e)
            }
            Self::ParseFloatErr(e) => {
                write!(f, "Error parsing float: {}", e)
            }
            Self::ReservedWord(w) => write!(f, "`{}` is a reserved word", w),
            Self::InvalidTarget => write!(f, "cannot assign to expression"),
            Self::TrailingInput(rest) => write!(f, "unexpected input `{}`", rest),
            e => write!(f, "internal parser error {:?}", e),
        }
    }
}

impl ParseErrorKind {
    pub fn is_nom_err(&self) -> bool {
        matches!(self, Self::Nom(_))
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct ParseError<I: AsBytes> {
    pub input: I,
    pub expected: Option<&'static str>,
    pub errors: Vec<ParseErrorKind>,
}

impl<I: AsBytes> ParseError<I> {
    pub fn new(input: I, error: ParseErrorKind) -> Self {
        ParseError {
            input,
            expected: None,
            errors: vec![error],
        }
    }

    pub fn throw<A>(input: I, e: ParseErrorKind) -> IResult<I, A, Self> {
        Err(Err::Error(ParseError::new(input, e)))
    }

    pub fn opt<A>(opt: Option<A>, input: I, error: ParseErrorKind) -> IResult<I, A, Self> {
        match opt {
            Some(a) => Ok((input, a)),
            None => Err(Err::Error(ParseError::new(input, error))),
        }
    }

    pub fn res<A, E, Fun: Fn(E) -> ParseErrorKind>(
        res: Result<A, E>,
        input: I,
        f: Fun,
    ) -> IResult<I, A, Self> {
        match res {
            Ok(a) => Ok((input, a)),
            Err(e) => Err(Err::Error(ParseError::new(input, f(e)))),
        }
    }
}

impl<'a> fmt::Display for ParseError<Span<'a>> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut res = String::new();

        writeln!(
            &mut res,
            "at line {}:{}",
            self.input.location_line(),
            self.input.get_utf8_column()
        )?;
        let line = String::from_utf8_lossy(self.input.get_line_beginning());

        writeln!(&mut res, "{} | {}", self.input.location_line(), line)?;

        let cols = format!("{} | ", self.input.location_line()).len() + self.input.get_utf8_column();
        for _ in 0..(cols - 1) {
            write!(&mut res, " ")?;
        }
        writeln!(&mut res, "^")?;

        if let Some(exp) = self.expected {
            writeln!(&mut res, "Expected {}", exp)?;
        }

        let mut errs = self.errors.iter().filter(|x| !x.is_nom_err()).peekable();
        match errs.peek() {
            None => writeln!(&mut res, "Invalid syntax")?,
            Some(_) => {
                writeln!(&mut res, "Reported errors:")?;
                for kind in errs {
                    writeln!(&mut res, "- {}", kind)?;
                }
            }
        }

        write!(f, "{}", res.trim_end())
    }
}

impl<I: AsBytes> nom::error::ParseError<I> for ParseError<I>
where
    I: InputLength,
    I: Clone,
{
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParseError::new(input, ParseErrorKind::Nom(kind))
    }

    fn append(input: I, kind: ErrorKind, mut other: Self) -> Self {
        match input.input_len().cmp(&other.input.input_len()) {
            Ordering::Less => ParseError::new(input, ParseErrorKind::Nom(kind)),
            Ordering::Equal => {
                other.errors.push(ParseErrorKind::Nom(kind));
                other
            }
            Ordering::Greater => other,
        }
    }

    fn or(self, mut other: Self) -> Self {
        match self.input.input_len().cmp(&other.input.input_len()) {
            Ordering::Less => self,
            Ordering::Equal => {
                for x in self.errors {
                    other.errors.push(x);
                }
                other
            }
            Ordering::Greater => other,
        }
    }
}

impl<I: AsBytes> nom::error::ContextError<I> for ParseError<I>
where
    I: InputLength,
    I: Clone,
{
    fn add_context(input: I, ctx: &'static str, other: Self) -> Self {
        match input.input_len().cmp(&other.input.input_len()) {
            Ordering::Less => ParseError {
                input,
                expected: Some(ctx),
                errors: vec![],
            },
            Ordering::Equal => match other.expected {
                None => ParseError {
                    input,
                    expected: Some(ctx),
                    errors: other.errors,
                },
                _ => other,
            },
            Ordering::Greater => other,
        }
    }
}

/// Owned rendition of a [`ParseError`], detached from the borrowed input so it
/// can travel inside runtime errors and across threads.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Error {
    pub line: u32,
    pub column: usize,
    pub message: String,
}

impl Error {
    pub fn from_nom(source: Err<ParseError<Span<'_>>>) -> Self {
        match source {
            Err::Error(e) | Err::Failure(e) => Self {
                line: e.input.location_line(),
                column: e.input.get_utf8_column(),
                message: e.to_string(),
            },
            Err::Incomplete(_) => Self {
                line: 1,
                column: 1,
                message: "unexpected end of input".into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_error_keeps_position() {
        let input = Span::new("x = \n  @");
        let (rest, _) = nom::bytes::complete::take::<_, _, ParseError<Span<'_>>>(7usize)(input)
            .unwrap();
        let err = Error::from_nom(Err::Error(ParseError::new(
            rest,
            ParseErrorKind::TrailingInput("@".into()),
        )));
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 3);
        assert!(err.message.contains("unexpected input `@`"));
    }
}
