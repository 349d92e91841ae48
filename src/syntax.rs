use std::collections::BTreeSet;
use std::fmt;

use strum::{AsRefStr, Display};

use crate::parser::position::Pos;

/// Expressions of the embedded node language
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    None(Pos),
    Bool(Pos, bool),
    Int(Pos, i64),
    Float(Pos, f64),
    // A string literal: "foo", 'bar\n'
    Str(Pos, String),
    Name(Pos, String),
    List(Pos, Vec<Expr>),
    // A parenthesized, comma separated sequence: (1, 2) or (1,)
    Tuple(Pos, Vec<Expr>),
    Dict(Pos, Vec<(Expr, Expr)>),
    // Attribute access: os.getpid
    Attribute(Pos, Box<Expr>, String),
    Index(Pos, Box<Expr>, Box<Expr>),
    // Slicing: xs[1:], xs[:2], xs[1:3]
    Slice(Pos, Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
    // Function call with positional and keyword arguments
    Call(Pos, Box<Expr>, Vec<Expr>, Vec<(String, Expr)>),
    Unary(Pos, UnaryOp, Box<Expr>),
    Binary(Pos, BinOp, Box<Expr>, Box<Expr>),
    // Chained comparison: a < b <= c
    Compare(Pos, Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Pos, Box<Expr>, Box<Expr>),
    Or(Pos, Box<Expr>, Box<Expr>),
    // Conditional expression: then if cond else otherwise
    IfElse(Pos, Box<Expr>, Box<Expr>, Box<Expr>),
    Lambda(Pos, Vec<String>, Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "+")]
    Pos,
    #[strum(serialize = "not")]
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
pub enum BinOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "//")]
    FloorDiv,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "**")]
    Pow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
pub enum CmpOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "not in")]
    NotIn,
    #[strum(serialize = "is")]
    Is,
    #[strum(serialize = "is not")]
    IsNot,
}

/// Left-hand side of an assignment
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Name(String),
    Tuple(Vec<Target>),
}

/// Statements, executed for their effect on the environment
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    // a = b = value
    Assign(Pos, Vec<Target>, Expr),
    // x += value
    AugAssign(Pos, String, BinOp, Expr),
    // import os, math as m
    Import(Pos, Vec<(String, Option<String>)>),
    // from os import getpid as pid
    FromImport(Pos, String, Vec<(String, Option<String>)>),
    // from os import *
    FromImportAll(Pos, String),
    Pass(Pos),
    Del(Pos, Vec<String>),
}

/// A node's text after parsing: either an expression (which replaces `_`) or a
/// statement (which only touches the environment)
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    Expr(Expr),
    Stmt(Stmt),
}

impl Expr {
    pub fn pos(&self) -> Pos {
        match self {
            Self::None(pos)
            | Self::Bool(pos, _)
            | Self::Int(pos, _)
            | Self::Float(pos, _)
            | Self::Str(pos, _)
            | Self::Name(pos, _)
            | Self::List(pos, _)
            | Self::Tuple(pos, _)
            | Self::Dict(pos, _)
            | Self::Attribute(pos, ..)
            | Self::Index(pos, ..)
            | Self::Slice(pos, ..)
            | Self::Call(pos, ..)
            | Self::Unary(pos, ..)
            | Self::Binary(pos, ..)
            | Self::Compare(pos, ..)
            | Self::And(pos, ..)
            | Self::Or(pos, ..)
            | Self::IfElse(pos, ..)
            | Self::Lambda(pos, ..) => *pos,
        }
    }

    /// Names this expression reads from its environment
    pub fn free_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut Vec::new(), &mut names);
        names
    }

    fn collect_names(&self, bound: &mut Vec<String>, names: &mut BTreeSet<String>) {
        match self {
            Self::None(_) | Self::Bool(..) | Self::Int(..) | Self::Float(..) | Self::Str(..) => (),
            Self::Name(_, name) => {
                if !bound.contains(name) {
                    names.insert(name.clone());
                }
            }
            Self::List(_, xs) | Self::Tuple(_, xs) => {
                xs.iter().for_each(|x| x.collect_names(bound, names))
            }
            Self::Dict(_, entries) => entries.iter().for_each(|(k, v)| {
                k.collect_names(bound, names);
                v.collect_names(bound, names);
            }),
            Self::Attribute(_, obj, _) | Self::Unary(_, _, obj) => obj.collect_names(bound, names),
            Self::Index(_, a, b)
            | Self::Binary(_, _, a, b)
            | Self::And(_, a, b)
            | Self::Or(_, a, b) => {
                a.collect_names(bound, names);
                b.collect_names(bound, names);
            }
            Self::Slice(_, obj, lo, hi) => {
                obj.collect_names(bound, names);
                for e in [lo, hi].into_iter().flatten() {
                    e.collect_names(bound, names);
                }
            }
            Self::Call(_, f, args, kwargs) => {
                f.collect_names(bound, names);
                args.iter().for_each(|x| x.collect_names(bound, names));
                kwargs.iter().for_each(|(_, x)| x.collect_names(bound, names));
            }
            Self::Compare(_, first, rest) => {
                first.collect_names(bound, names);
                rest.iter().for_each(|(_, x)| x.collect_names(bound, names));
            }
            Self::IfElse(_, then, cond, otherwise) => {
                then.collect_names(bound, names);
                cond.collect_names(bound, names);
                otherwise.collect_names(bound, names);
            }
            Self::Lambda(_, params, body) => {
                let depth = bound.len();
                bound.extend(params.iter().cloned());
                body.collect_names(bound, names);
                bound.truncate(depth);
            }
        }
    }
}

impl Source {
    pub fn free_names(&self) -> BTreeSet<String> {
        match self {
            Self::Expr(e) => e.free_names(),
            Self::Stmt(Stmt::Assign(_, _, e)) => e.free_names(),
            Self::Stmt(Stmt::AugAssign(_, name, _, e)) => {
                let mut names = e.free_names();
                names.insert(name.clone());
                names
            }
            Self::Stmt(Stmt::Del(_, targets)) => targets.iter().cloned().collect(),
            Self::Stmt(_) => BTreeSet::new(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Tuple(targets) => {
                write!(f, "(")?;
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
        }
    }
}
