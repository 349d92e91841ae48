use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0, one_of, satisfy},
    combinator::{map, not, opt, peek, recognize, value},
    error::context,
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
};

use crate::{
    parser::{
        error::{ParseError, ParseErrorKind},
        position::Pos,
        string, ParseResult, Span,
    },
    syntax::{BinOp, CmpOp, Expr, Stmt, Target, UnaryOp},
};

pub const RESERVED: [&str; 16] = [
    "True", "False", "None", "and", "or", "not", "in", "is", "if", "else", "lambda", "import",
    "from", "as", "del", "pass",
];

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Skips leading whitespace before running `p`
pub fn ws<'a, O, P>(mut p: P) -> impl FnMut(Span<'a>) -> ParseResult<'a, O>
where
    P: FnMut(Span<'a>) -> ParseResult<'a, O>,
{
    move |from: Span<'a>| {
        let (i, _) = multispace0(from)?;
        p(i)
    }
}

/// Matches a whole word, so `in` does not match the prefix of `index`
pub fn keyword<'a>(word: &'static str) -> impl FnMut(Span<'a>) -> ParseResult<'a, Span<'a>> {
    move |from: Span<'a>| terminated(tag(word), not(satisfy(is_ident_char)))(from)
}

/// Matches an operator token that is not the prefix of a longer one, e.g. `=` but not `==`
fn symbol<'a>(
    op: &'static str,
    not_followed_by: &'static str,
) -> impl FnMut(Span<'a>) -> ParseResult<'a, Span<'a>> {
    move |from: Span<'a>| terminated(tag(op), not(one_of(not_followed_by)))(from)
}

pub fn parse_identifier(from: Span<'_>) -> ParseResult<'_, String> {
    let (i, name) = recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(from)?;
    if RESERVED.contains(name.fragment()) {
        return ParseError::throw(from, ParseErrorKind::ReservedWord(name.to_string()));
    }
    Ok((i, name.fragment().to_string()))
}

pub fn parse_number(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (upto, text) = recognize(tuple((
        digit1,
        opt(pair(char('.'), opt(digit1))),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(from)?;
    let pos = Pos::from_upto(from, upto);
    let text = *text.fragment();
    if text.contains(['.', 'e', 'E']) {
        let (_, x) = ParseError::res(text.parse::<f64>(), from, ParseErrorKind::ParseFloatErr)?;
        Ok((upto, Expr::Float(pos, x)))
    } else {
        let (_, x) = ParseError::res(text.parse::<i64>(), from, ParseErrorKind::ParseIntErr)?;
        Ok((upto, Expr::Int(pos, x)))
    }
}

fn parse_constant(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (upto, expr) = alt((
        value(Expr::None(Pos::No), keyword("None")),
        value(Expr::Bool(Pos::No, true), keyword("True")),
        value(Expr::Bool(Pos::No, false), keyword("False")),
    ))(from)?;
    let pos = Pos::from_upto(from, upto);
    let expr = match expr {
        Expr::Bool(_, b) => Expr::Bool(pos, b),
        _ => Expr::None(pos),
    };
    Ok((upto, expr))
}

fn parse_string_literal(from: Span<'_>) -> ParseResult<'_, Expr> {
    // adjacent literals concatenate: 'a' "b"
    let (i, first) = string::parse_quoted()(from)?;
    let (upto, rest) = many0(preceded(multispace0, string::parse_quoted()))(i)?;
    let text = std::iter::once(first).chain(rest).collect::<String>();
    Ok((upto, Expr::Str(Pos::from_upto(from, upto), text)))
}

fn parse_name(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (upto, name) = parse_identifier(from)?;
    Ok((upto, Expr::Name(Pos::from_upto(from, upto), name)))
}

/// Comma separated expressions with an optional trailing comma, closed by `close`.
/// The flag reports whether any comma was seen.
fn parse_sequence<'a>(close: char) -> impl FnMut(Span<'a>) -> ParseResult<'a, (Vec<Expr>, bool)> {
    move |from: Span<'a>| {
        let (i, xs) = separated_list0(ws(char(',')), parse_expr)(from)?;
        let (i, trailing) = opt(ws(char(',')))(i)?;
        let (i, _) = ws(char(close))(i)?;
        let comma = xs.len() > 1 || trailing.is_some();
        Ok((i, (xs, comma)))
    }
}

fn parse_paren(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (i, _) = char('(')(from)?;
    let (upto, (mut xs, comma)) = parse_sequence(')')(i)?;
    let pos = Pos::from_upto(from, upto);
    if xs.len() == 1 && !comma {
        Ok((upto, xs.remove(0)))
    } else {
        Ok((upto, Expr::Tuple(pos, xs)))
    }
}

fn parse_list(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (i, _) = char('[')(from)?;
    let (upto, (xs, _)) = context("list", parse_sequence(']'))(i)?;
    Ok((upto, Expr::List(Pos::from_upto(from, upto), xs)))
}

fn parse_dict(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (i, _) = char('{')(from)?;
    let (i, entries) = separated_list0(
        ws(char(',')),
        separated_pair(parse_expr, ws(char(':')), parse_expr),
    )(i)?;
    let (i, _) = opt(ws(char(',')))(i)?;
    let (upto, _) = context("dict", ws(char('}')))(i)?;
    Ok((upto, Expr::Dict(Pos::from_upto(from, upto), entries)))
}

fn parse_atom(from: Span<'_>) -> ParseResult<'_, Expr> {
    ws(alt((
        parse_paren,
        parse_list,
        parse_dict,
        parse_string_literal,
        parse_number,
        parse_constant,
        parse_name,
    )))(from)
}

enum Trailer {
    Call(Vec<Expr>, Vec<(String, Expr)>),
    Attribute(String),
    Index(Expr),
    Slice(Option<Expr>, Option<Expr>),
}

enum Argument {
    Positional(Expr),
    Keyword(String, Expr),
}

fn parse_argument(from: Span<'_>) -> ParseResult<'_, Argument> {
    alt((
        map(
            separated_pair(ws(parse_identifier), ws(symbol("=", "=")), parse_expr),
            |(k, v)| Argument::Keyword(k, v),
        ),
        map(parse_expr, Argument::Positional),
    ))(from)
}

fn parse_call(from: Span<'_>) -> ParseResult<'_, Trailer> {
    let (i, _) = ws(char('('))(from)?;
    let (i, xs) = separated_list0(ws(char(',')), parse_argument)(i)?;
    let (i, _) = opt(ws(char(',')))(i)?;
    let (i, _) = context("closing parenthesis", ws(char(')')))(i)?;
    let mut args = vec![];
    let mut kwargs = vec![];
    for arg in xs {
        match arg {
            Argument::Positional(e) => args.push(e),
            Argument::Keyword(k, v) => kwargs.push((k, v)),
        }
    }
    Ok((i, Trailer::Call(args, kwargs)))
}

fn parse_subscript(from: Span<'_>) -> ParseResult<'_, Trailer> {
    let (i, _) = ws(char('['))(from)?;
    let (i, lower) = opt(parse_expr)(i)?;
    let (i, colon) = opt(ws(char(':')))(i)?;
    let (i, trailer) = match (lower, colon) {
        (lower, Some(_)) => {
            let (i, upper) = opt(parse_expr)(i)?;
            (i, Trailer::Slice(lower, upper))
        }
        (Some(index), None) => (i, Trailer::Index(index)),
        (None, None) => return ParseError::throw(i, ParseErrorKind::InvalidTarget),
    };
    let (i, _) = context("closing bracket", ws(char(']')))(i)?;
    Ok((i, trailer))
}

fn parse_trailer(from: Span<'_>) -> ParseResult<'_, Trailer> {
    alt((
        parse_call,
        map(preceded(ws(char('.')), ws(parse_identifier)), Trailer::Attribute),
        parse_subscript,
    ))(from)
}

fn parse_postfix(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (mut i, mut expr) = parse_atom(from)?;
    loop {
        match parse_trailer(i) {
            Ok((upto, trailer)) => {
                let pos = Pos::from_upto(from, upto);
                let target = Box::new(expr);
                expr = match trailer {
                    Trailer::Call(args, kwargs) => Expr::Call(pos, target, args, kwargs),
                    Trailer::Attribute(name) => Expr::Attribute(pos, target, name),
                    Trailer::Index(index) => Expr::Index(pos, target, Box::new(index)),
                    Trailer::Slice(lo, hi) => {
                        Expr::Slice(pos, target, lo.map(Box::new), hi.map(Box::new))
                    }
                };
                i = upto;
            }
            Err(nom::Err::Error(_)) => return Ok((i, expr)),
            Err(e) => return Err(e),
        }
    }
}

fn parse_power(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (i, base) = parse_postfix(from)?;
    let (upto, exponent) = opt(preceded(ws(tag("**")), parse_unary))(i)?;
    match exponent {
        Some(exponent) => Ok((
            upto,
            Expr::Binary(
                Pos::from_upto(from, upto),
                BinOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ),
        )),
        None => Ok((upto, base)),
    }
}

fn parse_unary(from: Span<'_>) -> ParseResult<'_, Expr> {
    let op = opt(ws(alt((
        value(UnaryOp::Neg, char('-')),
        value(UnaryOp::Pos, char('+')),
    ))))(from)?;
    match op {
        (i, Some(op)) => {
            let (upto, operand) = parse_unary(i)?;
            Ok((
                upto,
                Expr::Unary(Pos::from_upto(from, upto), op, Box::new(operand)),
            ))
        }
        (_, None) => parse_power(from),
    }
}

/// Left-associative chain of `operand (op operand)*`
fn parse_binary_chain<'a>(
    mut operand: impl FnMut(Span<'a>) -> ParseResult<'a, Expr>,
    mut operator: impl FnMut(Span<'a>) -> ParseResult<'a, BinOp>,
) -> impl FnMut(Span<'a>) -> ParseResult<'a, Expr> {
    move |from: Span<'a>| {
        let (mut i, mut acc) = operand(from)?;
        loop {
            let Ok((rest, op)) = ws(&mut operator)(i) else {
                return Ok((i, acc));
            };
            let (upto, rhs) = operand(rest)?;
            acc = Expr::Binary(Pos::from_upto(from, upto), op, Box::new(acc), Box::new(rhs));
            i = upto;
        }
    }
}

fn parse_term(from: Span<'_>) -> ParseResult<'_, Expr> {
    parse_binary_chain(
        parse_unary,
        alt((
            value(BinOp::FloorDiv, tag("//")),
            value(BinOp::Div, symbol("/", "=")),
            value(BinOp::Mul, symbol("*", "*=")),
            value(BinOp::Mod, symbol("%", "=")),
        )),
    )(from)
}

fn parse_arith(from: Span<'_>) -> ParseResult<'_, Expr> {
    parse_binary_chain(
        parse_term,
        alt((
            value(BinOp::Add, symbol("+", "=")),
            value(BinOp::Sub, symbol("-", "=>")),
        )),
    )(from)
}

fn parse_cmp_op(from: Span<'_>) -> ParseResult<'_, CmpOp> {
    ws(alt((
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Lt, tag("<")),
        value(CmpOp::Gt, tag(">")),
        value(CmpOp::NotIn, pair(keyword("not"), ws(keyword("in")))),
        value(CmpOp::In, keyword("in")),
        value(CmpOp::IsNot, pair(keyword("is"), ws(keyword("not")))),
        value(CmpOp::Is, keyword("is")),
    )))(from)
}

fn parse_comparison(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (i, first) = parse_arith(from)?;
    let (upto, rest) = many0(pair(parse_cmp_op, parse_arith))(i)?;
    if rest.is_empty() {
        Ok((upto, first))
    } else {
        Ok((
            upto,
            Expr::Compare(Pos::from_upto(from, upto), Box::new(first), rest),
        ))
    }
}

fn parse_not(from: Span<'_>) -> ParseResult<'_, Expr> {
    match ws(keyword("not"))(from) {
        Ok((i, _)) => {
            let (upto, operand) = parse_not(i)?;
            Ok((
                upto,
                Expr::Unary(Pos::from_upto(from, upto), UnaryOp::Not, Box::new(operand)),
            ))
        }
        Err(_) => parse_comparison(from),
    }
}

fn parse_and(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (mut i, mut acc) = parse_not(from)?;
    while let Ok((rest, _)) = ws(keyword("and"))(i) {
        let (upto, rhs) = parse_not(rest)?;
        acc = Expr::And(Pos::from_upto(from, upto), Box::new(acc), Box::new(rhs));
        i = upto;
    }
    Ok((i, acc))
}

fn parse_or(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (mut i, mut acc) = parse_and(from)?;
    while let Ok((rest, _)) = ws(keyword("or"))(i) {
        let (upto, rhs) = parse_and(rest)?;
        acc = Expr::Or(Pos::from_upto(from, upto), Box::new(acc), Box::new(rhs));
        i = upto;
    }
    Ok((i, acc))
}

fn parse_lambda(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (i, _) = ws(keyword("lambda"))(from)?;
    let (i, params) = separated_list0(ws(char(',')), ws(parse_identifier))(i)?;
    let (i, _) = context("lambda body", ws(char(':')))(i)?;
    let (upto, body) = parse_expr(i)?;
    Ok((
        upto,
        Expr::Lambda(Pos::from_upto(from, upto), params, Box::new(body)),
    ))
}

/// A single expression: lambda, or a (possibly conditional) boolean expression
pub fn parse_expr(from: Span<'_>) -> ParseResult<'_, Expr> {
    if let Ok(lambda) = parse_lambda(from) {
        return Ok(lambda);
    }
    let (i, then) = parse_or(from)?;
    let Ok((rest, _)) = ws(keyword("if"))(i) else {
        return Ok((i, then));
    };
    let (rest, cond) = parse_or(rest)?;
    let (rest, _) = context("else branch", ws(keyword("else")))(rest)?;
    let (upto, otherwise) = parse_expr(rest)?;
    Ok((
        upto,
        Expr::IfElse(
            Pos::from_upto(from, upto),
            Box::new(then),
            Box::new(cond),
            Box::new(otherwise),
        ),
    ))
}

/// `a, b, c` as a tuple; a single expression without a comma is returned as is
pub fn parse_expr_list(from: Span<'_>) -> ParseResult<'_, Expr> {
    let (i, mut xs) = separated_list1(ws(char(',')), parse_expr)(from)?;
    let (upto, trailing) = opt(ws(char(',')))(i)?;
    if xs.len() == 1 && trailing.is_none() {
        Ok((upto, xs.remove(0)))
    } else {
        Ok((upto, Expr::Tuple(Pos::from_upto(from, upto), xs)))
    }
}

fn parse_target(from: Span<'_>) -> ParseResult<'_, Target> {
    ws(alt((
        map(parse_identifier, Target::Name),
        delimited(char('('), parse_target_list, ws(char(')'))),
        delimited(char('['), parse_target_list, ws(char(']'))),
    )))(from)
}

fn parse_target_list(from: Span<'_>) -> ParseResult<'_, Target> {
    let (i, mut targets) = separated_list1(ws(char(',')), parse_target)(from)?;
    let (i, trailing) = opt(ws(char(',')))(i)?;
    if targets.len() == 1 && trailing.is_none() {
        Ok((i, targets.remove(0)))
    } else {
        Ok((i, Target::Tuple(targets)))
    }
}

fn parse_assign(from: Span<'_>) -> ParseResult<'_, Stmt> {
    let (i, targets) = many0(terminated(parse_target_list, ws(symbol("=", "="))))(from)?;
    if targets.is_empty() {
        return ParseError::throw(from, ParseErrorKind::InvalidTarget);
    }
    let (upto, rhs) = parse_expr_list(i)?;
    Ok((upto, Stmt::Assign(Pos::from_upto(from, upto), targets, rhs)))
}

fn parse_aug_assign(from: Span<'_>) -> ParseResult<'_, Stmt> {
    let (i, name) = ws(parse_identifier)(from)?;
    let (i, op) = ws(alt((
        value(BinOp::Add, tag("+=")),
        value(BinOp::Sub, tag("-=")),
        value(BinOp::Pow, tag("**=")),
        value(BinOp::Mul, tag("*=")),
        value(BinOp::FloorDiv, tag("//=")),
        value(BinOp::Div, tag("/=")),
        value(BinOp::Mod, tag("%=")),
    )))(i)?;
    let (upto, rhs) = parse_expr_list(i)?;
    Ok((
        upto,
        Stmt::AugAssign(Pos::from_upto(from, upto), name, op, rhs),
    ))
}

fn parse_dotted_name(from: Span<'_>) -> ParseResult<'_, String> {
    let (i, parts) = separated_list1(char('.'), parse_identifier)(from)?;
    Ok((i, parts.join(".")))
}

fn parse_alias<'a>(
    mut name: impl FnMut(Span<'a>) -> ParseResult<'a, String>,
) -> impl FnMut(Span<'a>) -> ParseResult<'a, (String, Option<String>)> {
    move |from: Span<'a>| {
        let (i, n) = ws(&mut name)(from)?;
        let (i, alias) = opt(preceded(ws(keyword("as")), ws(parse_identifier)))(i)?;
        Ok((i, (n, alias)))
    }
}

fn parse_import(from: Span<'_>) -> ParseResult<'_, Stmt> {
    let (i, _) = ws(keyword("import"))(from)?;
    let (upto, names) = separated_list1(ws(char(',')), parse_alias(parse_dotted_name))(i)?;
    Ok((upto, Stmt::Import(Pos::from_upto(from, upto), names)))
}

fn parse_from_import(from: Span<'_>) -> ParseResult<'_, Stmt> {
    let (i, _) = ws(keyword("from"))(from)?;
    let (i, module) = ws(parse_dotted_name)(i)?;
    let (i, _) = ws(keyword("import"))(i)?;
    if let Ok((upto, _)) = ws(char::<_, ParseError<Span<'_>>>('*'))(i) {
        return Ok((upto, Stmt::FromImportAll(Pos::from_upto(from, upto), module)));
    }
    let (i, paren) = opt(ws(char('(')))(i)?;
    let (i, names) = separated_list1(ws(char(',')), parse_alias(parse_identifier))(i)?;
    let (upto, _) = match paren {
        Some(_) => {
            let (i, _) = opt(ws(char(',')))(i)?;
            map(ws(char(')')), Some)(i)?
        }
        None => (i, None),
    };
    Ok((
        upto,
        Stmt::FromImport(Pos::from_upto(from, upto), module, names),
    ))
}

fn parse_del(from: Span<'_>) -> ParseResult<'_, Stmt> {
    let (i, _) = ws(keyword("del"))(from)?;
    let (upto, names) = separated_list1(ws(char(',')), ws(parse_identifier))(i)?;
    Ok((upto, Stmt::Del(Pos::from_upto(from, upto), names)))
}

fn parse_pass(from: Span<'_>) -> ParseResult<'_, Stmt> {
    let (upto, _) = ws(keyword("pass"))(from)?;
    Ok((upto, Stmt::Pass(Pos::from_upto(from, upto))))
}

pub fn parse_stmt(from: Span<'_>) -> ParseResult<'_, Stmt> {
    alt((
        parse_import,
        parse_from_import,
        parse_del,
        parse_pass,
        parse_aug_assign,
        parse_assign,
    ))(from)
}

/// Succeeds only when nothing but whitespace remains
pub fn parse_end(from: Span<'_>) -> ParseResult<'_, ()> {
    let (i, _) = multispace0(from)?;
    if i.fragment().is_empty() {
        Ok((i, ()))
    } else {
        let (_, rest) = peek(take_while(|c: char| c != '\n'))(i)?;
        ParseError::throw(i, ParseErrorKind::TrailingInput(rest.to_string()))
    }
}

#[cfg(test)]
pub mod tests {
    use nom::Parser;
    use proptest::prelude::*;

    use super::*;

    fn test<'a, P, R>(mut p: P, i: &'a str, expected: Option<R>) -> bool
    where
        P: Parser<Span<'a>, R, ParseError<Span<'a>>>,
        R: std::fmt::Debug + PartialEq,
    {
        match (expected, p.parse(Span::<'a>::new(i))) {
            (Some(expected), Ok((_, x))) => x == expected,
            (Some(_), Err(e)) => {
                println!("{}", e);
                false
            }
            (None, Ok(..)) => false,
            (None, Err(_)) => true,
        }
    }

    fn name(n: &str) -> Expr {
        Expr::Name(Pos::No, n.into())
    }

    fn int(x: i64) -> Expr {
        Expr::Int(Pos::No, x)
    }

    fn bin(op: BinOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary(Pos::No, op, Box::new(a), Box::new(b))
    }

    #[test]
    fn unit_parse_literals() {
        assert!(test(parse_expr, "42", Some(int(42))));
        assert!(test(parse_expr, "1.5", Some(Expr::Float(Pos::No, 1.5))));
        assert!(test(parse_expr, "2e3", Some(Expr::Float(Pos::No, 2000.0))));
        assert!(test(parse_expr, "None", Some(Expr::None(Pos::No))));
        assert!(test(parse_expr, "True", Some(Expr::Bool(Pos::No, true))));
        assert!(test(
            parse_expr,
            "'a' \"b\"",
            Some(Expr::Str(Pos::No, "ab".into()))
        ));
        assert!(test(
            parse_expr,
            "[1, 2,]",
            Some(Expr::List(Pos::No, vec![int(1), int(2)]))
        ));
        assert!(test(
            parse_expr,
            "(1,)",
            Some(Expr::Tuple(Pos::No, vec![int(1)]))
        ));
        assert!(test(parse_expr, "(1)", Some(int(1))));
        assert!(test(
            parse_expr,
            "{'a': 1}",
            Some(Expr::Dict(
                Pos::No,
                vec![(Expr::Str(Pos::No, "a".into()), int(1))]
            ))
        ));
        assert!(test(parse_expr, "99999999999999999999", None::<Expr>));
    }

    #[test]
    fn unit_parse_names_and_keywords() {
        assert!(test(parse_expr, "_", Some(name("_"))));
        assert!(test(parse_expr, "index", Some(name("index"))));
        assert!(test(parse_expr, "lambda", None::<Expr>));
        assert!(test(parse_identifier, "import", None::<String>));
        assert!(test(parse_identifier, "imports", Some("imports".to_string())));
    }

    #[test]
    fn unit_parse_precedence() {
        assert!(test(
            parse_expr,
            "1 + 2 * 3",
            Some(bin(BinOp::Add, int(1), bin(BinOp::Mul, int(2), int(3))))
        ));
        assert!(test(
            parse_expr,
            "1 - 2 - 3",
            Some(bin(BinOp::Sub, bin(BinOp::Sub, int(1), int(2)), int(3)))
        ));
        assert!(test(
            parse_expr,
            "2 ** 3 ** 2",
            Some(bin(BinOp::Pow, int(2), bin(BinOp::Pow, int(3), int(2))))
        ));
        assert!(test(
            parse_expr,
            "-2 ** 2",
            Some(Expr::Unary(
                Pos::No,
                UnaryOp::Neg,
                Box::new(bin(BinOp::Pow, int(2), int(2)))
            ))
        ));
        assert!(test(
            parse_expr,
            "7 // 2",
            Some(bin(BinOp::FloorDiv, int(7), int(2)))
        ));
    }

    #[test]
    fn unit_parse_comparisons() {
        assert!(test(
            parse_expr,
            "1 == 0",
            Some(Expr::Compare(
                Pos::No,
                Box::new(int(1)),
                vec![(CmpOp::Eq, int(0))]
            ))
        ));
        assert!(test(
            parse_expr,
            "x not in xs",
            Some(Expr::Compare(
                Pos::No,
                Box::new(name("x")),
                vec![(CmpOp::NotIn, name("xs"))]
            ))
        ));
        assert!(test(
            parse_expr,
            "a is not None",
            Some(Expr::Compare(
                Pos::No,
                Box::new(name("a")),
                vec![(CmpOp::IsNot, Expr::None(Pos::No))]
            ))
        ));
        assert!(test(
            parse_expr,
            "not a and b",
            Some(Expr::And(
                Pos::No,
                Box::new(Expr::Unary(Pos::No, UnaryOp::Not, Box::new(name("a")))),
                Box::new(name("b"))
            ))
        ));
    }

    #[test]
    fn unit_parse_trailers() {
        assert!(test(
            parse_expr,
            "os.getpid()",
            Some(Expr::Call(
                Pos::No,
                Box::new(Expr::Attribute(Pos::No, Box::new(name("os")), "getpid".into())),
                vec![],
                vec![]
            ))
        ));
        assert!(test(
            parse_expr,
            "f(1, k=2)",
            Some(Expr::Call(
                Pos::No,
                Box::new(name("f")),
                vec![int(1)],
                vec![("k".into(), int(2))]
            ))
        ));
        assert!(test(
            parse_expr,
            "f(a == 2)",
            Some(Expr::Call(
                Pos::No,
                Box::new(name("f")),
                vec![Expr::Compare(
                    Pos::No,
                    Box::new(name("a")),
                    vec![(CmpOp::Eq, int(2))]
                )],
                vec![]
            ))
        ));
        assert!(test(
            parse_expr,
            "xs[1:]",
            Some(Expr::Slice(
                Pos::No,
                Box::new(name("xs")),
                Some(Box::new(int(1))),
                None
            ))
        ));
        assert!(test(
            parse_expr,
            "d['k']",
            Some(Expr::Index(
                Pos::No,
                Box::new(name("d")),
                Box::new(Expr::Str(Pos::No, "k".into()))
            ))
        ));
    }

    #[test]
    fn unit_parse_conditional_and_lambda() {
        assert!(test(
            parse_expr,
            "1 if c else 2",
            Some(Expr::IfElse(
                Pos::No,
                Box::new(int(1)),
                Box::new(name("c")),
                Box::new(int(2))
            ))
        ));
        assert!(test(
            parse_expr,
            "lambda x, y: x",
            Some(Expr::Lambda(
                Pos::No,
                vec!["x".into(), "y".into()],
                Box::new(name("x"))
            ))
        ));
    }

    #[test]
    fn unit_parse_statements() {
        assert!(test(
            parse_stmt,
            "x = 1",
            Some(Stmt::Assign(Pos::No, vec![Target::Name("x".into())], int(1)))
        ));
        assert!(test(
            parse_stmt,
            "a, b = 1, 2",
            Some(Stmt::Assign(
                Pos::No,
                vec![Target::Tuple(vec![
                    Target::Name("a".into()),
                    Target::Name("b".into())
                ])],
                Expr::Tuple(Pos::No, vec![int(1), int(2)])
            ))
        ));
        assert!(test(
            parse_stmt,
            "n += 1",
            Some(Stmt::AugAssign(Pos::No, "n".into(), BinOp::Add, int(1)))
        ));
        assert!(test(
            parse_stmt,
            "import os, math as m",
            Some(Stmt::Import(
                Pos::No,
                vec![("os".into(), None), ("math".into(), Some("m".into()))]
            ))
        ));
        assert!(test(
            parse_stmt,
            "from os import getpid as pid",
            Some(Stmt::FromImport(
                Pos::No,
                "os".into(),
                vec![("getpid".into(), Some("pid".into()))]
            ))
        ));
        assert!(test(
            parse_stmt,
            "from math import *",
            Some(Stmt::FromImportAll(Pos::No, "math".into()))
        ));
        assert!(test(parse_stmt, "1 = x", None::<Stmt>));
    }

    proptest! {
        #[test]
        fn prop_int_literals(x in 0i64..i64::MAX) {
            let src = x.to_string();
            prop_assert!(test(parse_expr, &src, Some(int(x))));
        }
    }
}
