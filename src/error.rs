use crate::parser;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Parser error: {0}")]
    Parse(#[from] parser::Error),
}

/// Failures raised while compiling or running a single node
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    UnboundName(String),
    #[error("invalid syntax: {0}")]
    Syntax(#[from] parser::Error),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ValueError: {0}")]
    Value(String),
    #[error("KeyError: {0}")]
    Key(String),
    #[error("IndexError: {0}")]
    Index(String),
    #[error("AttributeError: {0}")]
    Attribute(String),
    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),
    #[error("ImportError: no module named {0}")]
    Import(String),
    #[error("nested evaluation exceeded depth {0}")]
    RecursionLimit(usize),
    #[error("binding '{0}' cannot be passed to a spawned process")]
    Capture(String),
    #[error("spawned process failed: {0}")]
    Spawn(String),
    #[error("branch panicked: {0}")]
    BranchPanicked(String),
    #[error("thread pool error: {0}")]
    Pool(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failures of a remote invocation, surfaced without retry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("endpoint {url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unsupported scheme in host '{0}'")]
    UnsupportedScheme(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Structural problems of a program graph, detected before it runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{0}' already exists")]
    DuplicateNode(String),
    #[error("no node with id '{0}'")]
    UnknownNode(String),
    #[error("graph contains a cycle through node '{0}'")]
    Cycle(String),
    #[error("node '{0}' has successors but no operator")]
    MissingOperator(String),
}

impl EvalError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    pub fn value_error(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }
}
