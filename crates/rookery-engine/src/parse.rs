use std::collections::HashMap;

use async_graphql_parser::{
    types::{DocumentOperations, FragmentDefinition, OperationDefinition},
    Positioned,
};
use async_graphql_value::Name;

use crate::response::{Location, ServerError};

#[derive(thiserror::Error, Debug)]
pub(crate) enum ParseError {
    #[error("Unknown operation named '{0}'.")]
    UnknownOperation(String),
    #[error("Missing operation name.")]
    MissingOperationName,
    #[error(transparent)]
    ParserError(#[from] async_graphql_parser::Error),
}

impl From<ParseError> for ServerError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::ParserError(err) => {
                let locations = err.positions().into_iter().map(Location::from).collect();
                let mut error = ServerError::new(err.to_string(), None);
                error.locations = locations;
                error
            }
            err => ServerError::new(err.to_string(), None),
        }
    }
}

pub(crate) struct ParsedOperation {
    pub definition: OperationDefinition,
    pub fragments: HashMap<Name, Positioned<FragmentDefinition>>,
}

/// Parses the query document and picks the operation to execute.
pub(crate) fn parse_operation(query: &str, operation_name: Option<&str>) -> Result<ParsedOperation, ParseError> {
    let document = async_graphql_parser::parse_query(query)?;

    let operation = if let Some(operation_name) = operation_name {
        match document.operations {
            DocumentOperations::Single(_) => None,
            DocumentOperations::Multiple(mut operations) => operations.remove(operation_name),
        }
        .ok_or_else(|| ParseError::UnknownOperation(operation_name.to_string()))?
    } else {
        match document.operations {
            DocumentOperations::Single(operation) => operation,
            DocumentOperations::Multiple(operations) => {
                let mut operations = operations.into_values();
                match (operations.next(), operations.next()) {
                    (Some(operation), None) => operation,
                    _ => return Err(ParseError::MissingOperationName),
                }
            }
        }
    };

    Ok(ParsedOperation {
        definition: operation.node,
        fragments: document.fragments,
    })
}
