#![doc = include_str!("../README.md")]

pub mod cli;
pub mod compiler;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod graph;
pub mod parser;
pub mod pool;
pub mod reduce;
pub mod remote;
pub mod runtime;
mod scheduler;
pub mod spawn;
pub mod syntax;
pub mod value;
pub mod writer;

pub use env::Env;
pub use error::Error;
pub use graph::{Operator, ProgramGraph};
pub use runtime::{Program, Runtime};
pub use value::Value;
