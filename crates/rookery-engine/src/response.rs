use async_graphql_parser::Pos;
use serde::{Deserialize, Serialize};

/// The result of executing one request.
///
/// `data` and `errors` are both always serialized: the transport contract is
/// a structured result-or-errors payload with an empty error list on full
/// success.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub data: Option<serde_json::Value>,
    pub errors: Vec<ServerError>,
}

impl Response {
    pub fn new(data: serde_json::Value, errors: Vec<ServerError>) -> Self {
        Self {
            data: Some(data),
            errors,
        }
    }

    /// A response that failed before resolution began; carries no data at
    /// all, not even partial.
    pub fn from_errors(errors: Vec<ServerError>) -> Self {
        Self { data: None, errors }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// An error bound to a position in the query and a path in the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
}

impl ServerError {
    pub fn new(message: impl Into<String>, pos: Option<Pos>) -> Self {
        Self {
            message: message.into(),
            locations: pos.map(Location::from).into_iter().collect(),
            path: Vec::new(),
        }
    }

    #[must_use]
    pub(crate) fn at_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl From<Pos> for Location {
    fn from(pos: Pos) -> Self {
        Self {
            line: pos.line,
            column: pos.column,
        }
    }
}

/// One step of a response path: a field key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}
