use nom::{character::complete::multispace0, Err, IResult};
use nom_locate::LocatedSpan;

use crate::syntax::{Expr, Source};

pub mod error;
pub mod position;
pub mod program;
pub mod string;
pub mod syntax;

pub use error::Error;
pub use program::parse_program;

pub type Span<'a> = LocatedSpan<&'a str>;
pub type ParseResult<'a, T> = IResult<Span<'a>, T, error::ParseError<Span<'a>>>;

fn parse_complete<'a, T>(
    input: &'a str,
    mut p: impl FnMut(Span<'a>) -> ParseResult<'a, T>,
) -> Result<T, Err<error::ParseError<Span<'a>>>> {
    let (i, _) = multispace0(Span::new(input))?;
    let (i, x) = p(i)?;
    syntax::parse_end(i)?;
    Ok(x)
}

/// Offset reached by a failed parse, used to report whichever attempt got further
fn reached(e: &Err<error::ParseError<Span<'_>>>) -> usize {
    match e {
        Err::Error(e) | Err::Failure(e) => e.input.location_offset(),
        Err::Incomplete(_) => 0,
    }
}

/// Parses a single expression, rejecting trailing input
pub fn parse_expr(input: &str) -> Result<Expr, Error> {
    parse_complete(input, syntax::parse_expr_list).map_err(Error::from_nom)
}

/// Parses one node's text: an expression when it is one, otherwise a statement
pub fn parse_source(input: &str) -> Result<Source, Error> {
    let expr_err = match parse_complete(input, syntax::parse_expr_list) {
        Ok(expr) => return Ok(Source::Expr(expr)),
        Err(e) => e,
    };
    match parse_complete(input, syntax::parse_stmt) {
        Ok(stmt) => Ok(Source::Stmt(stmt)),
        Err(stmt_err) if reached(&stmt_err) > reached(&expr_err) => {
            Err(Error::from_nom(stmt_err))
        }
        Err(_) => Err(Error::from_nom(expr_err)),
    }
}
