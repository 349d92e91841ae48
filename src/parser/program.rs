//! Flow program text: one component per line (or per top-level `,`), nodes
//! joined by `->` (concurrent) and `|` (sequential).
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till},
    character::complete::{anychar, char, line_ending, multispace0, satisfy, space0, space1},
    combinator::{map, not, recognize, value, verify},
    multi::{many0, many1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::{
    graph::{Content, Operator, ProgramGraph},
    parser::{syntax::parse_end, Error, ParseResult, Span},
};

fn quoted<'a>(q: char) -> impl FnMut(Span<'a>) -> ParseResult<'a, ()> {
    move |from: Span<'a>| {
        value(
            (),
            tuple((
                char(q),
                many0(alt((
                    value((), preceded(char('\\'), anychar)),
                    value((), satisfy(move |c| c != q && c != '\\')),
                ))),
                char(q),
            )),
        )(from)
    }
}

fn backticked(from: Span<'_>) -> ParseResult<'_, ()> {
    value((), tuple((char('`'), take_till(|c| c == '`'), char('`'))))(from)
}

/// Anything that hides separators: strings, backticks and balanced brackets
fn opaque(from: Span<'_>) -> ParseResult<'_, ()> {
    alt((quoted('"'), quoted('\''), backticked, bracketed))(from)
}

fn bracketed(from: Span<'_>) -> ParseResult<'_, ()> {
    let (i, open) = satisfy(|c| matches!(c, '(' | '[' | '{'))(from)?;
    let close = match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    };
    value(
        (),
        pair(
            many0(alt((
                opaque,
                value(
                    (),
                    satisfy(|c| !matches!(c, ')' | ']' | '}' | '(' | '[' | '{' | '"' | '\'' | '`')),
                ),
            ))),
            char(close),
        ),
    )(i)
}

fn node_char(from: Span<'_>) -> ParseResult<'_, ()> {
    alt((
        value((), terminated(char('-'), not(char('>')))),
        value(
            (),
            satisfy(|c| {
                !matches!(
                    c,
                    ',' | '|' | '\n' | '\r' | '#' | '-' | '(' | '[' | '{' | ')' | ']' | '}' | '"' | '\'' | '`'
                )
            }),
        ),
    ))(from)
}

fn node(from: Span<'_>) -> ParseResult<'_, String> {
    map(
        verify(recognize(many1(alt((opaque, node_char)))), |s: &Span<'_>| {
            !s.fragment().trim().is_empty()
        }),
        |s| s.fragment().trim().to_string(),
    )(from)
}

fn operator(from: Span<'_>) -> ParseResult<'_, Operator> {
    delimited(
        space0,
        alt((value(Operator::Async, tag("->")), value(Operator::Sync, char('|')))),
        multispace0,
    )(from)
}

fn component(from: Span<'_>) -> ParseResult<'_, Vec<(Content, Operator)>> {
    let (i, first) = node(from)?;
    let (i, rest) = many0(pair(operator, node))(i)?;
    let mut chain = Vec::with_capacity(rest.len() + 1);
    let mut text = first;
    for (op, next) in rest {
        chain.push((Content::Source(text), op));
        text = next;
    }
    chain.push((Content::Source(text), Operator::None));
    Ok((i, chain))
}

fn comment(from: Span<'_>) -> ParseResult<'_, ()> {
    value((), pair(char('#'), take_till(|c| c == '\n')))(from)
}

fn separators(from: Span<'_>) -> ParseResult<'_, ()> {
    value(
        (),
        many0(alt((
            value((), space1),
            value((), line_ending),
            value((), char(',')),
            comment,
        ))),
    )(from)
}

fn parse_components(from: Span<'_>) -> ParseResult<'_, Vec<Vec<(Content, Operator)>>> {
    let (i, _) = separators(from)?;
    let (i, components) = many0(terminated(component, separators))(i)?;
    let (i, _) = parse_end(i)?;
    Ok((i, components))
}

/// Parses a whole program into its graph, one root per component
pub fn parse_program(input: &str) -> Result<ProgramGraph, Error> {
    let (_, components) = parse_components(Span::new(input)).map_err(Error::from_nom)?;
    let mut graph = ProgramGraph::new();
    for chain in components {
        graph.push_chain(chain);
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(src: &str) -> Vec<Vec<(String, String)>> {
        let g = parse_program(src).unwrap();
        g.roots()
            .into_iter()
            .map(|root| {
                let mut chain = vec![];
                let mut ix = Some(root);
                while let Some(n) = ix {
                    let node = g.node(n);
                    let text = match &node.content {
                        Content::Source(s) => s.clone(),
                        Content::Literal(v) => v.repr(),
                    };
                    chain.push((text, node.operator.to_string()));
                    ix = g.successors(n).first().copied();
                }
                chain
            })
            .collect()
    }

    fn pairs(xs: &[(&str, &str)]) -> Vec<(String, String)> {
        xs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn chains_and_operators() {
        assert_eq!(
            shape("1 -> 2 | _ + 1"),
            vec![pairs(&[("1", "ASYNC"), ("2", "SYNC"), ("_ + 1", "NONE")])]
        );
        assert_eq!(
            shape("x = -1 -> _ - 2"),
            vec![pairs(&[("x = -1", "ASYNC"), ("_ - 2", "NONE")])]
        );
    }

    #[test]
    fn components_split_on_lines_and_commas() {
        assert_eq!(
            shape("# header\n\n1 -> 2, 3\n  4 # trailing\n"),
            vec![
                pairs(&[("1", "ASYNC"), ("2", "NONE")]),
                pairs(&[("3", "NONE")]),
                pairs(&[("4", "NONE")]),
            ]
        );
    }

    #[test]
    fn separators_inside_opaque_text_are_kept() {
        assert_eq!(
            shape("[1, 2] -> 'a -> b | c, #d' -> `1 -> 2` -> f(x,\n y)"),
            vec![pairs(&[
                ("[1, 2]", "ASYNC"),
                ("'a -> b | c, #d'", "ASYNC"),
                ("`1 -> 2`", "ASYNC"),
                ("f(x,\n y)", "NONE"),
            ])]
        );
        assert_eq!(
            shape(r#""it\"s" -> {'k': [1, (2, 3)]}"#),
            vec![pairs(&[(r#""it\"s""#, "ASYNC"), ("{'k': [1, (2, 3)]}", "NONE")])]
        );
    }

    #[test]
    fn ids_follow_source_order() {
        let g = parse_program("a -> b\nc").unwrap();
        let ids: Vec<_> = g.roots().into_iter().map(|r| g.node(r).id.clone()).collect();
        assert_eq!(ids, ["000000", "000002"]);
    }

    #[test]
    fn malformed_programs() {
        assert!(parse_program("1 ->").is_err());
        assert!(parse_program("1 -> | 2").is_err());
        assert!(parse_program("f(1").is_err());
        assert!(parse_program("1)").is_err());
        assert!(parse_program("'open").is_err());
        assert!(parse_program("").unwrap().is_empty());
    }
}
