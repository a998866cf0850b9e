use crate::prelude::graphql::*;
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::slice::Iter;
use thiserror::Error;

/// Error types for execution.
///
/// Note that these are not actually returned to the client, but are instead converted to JSON for
/// [`struct@Error`].
#[derive(Error, Display, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[ignore_extra_doc_attributes]
pub enum FetchError {
    /// Query references unknown location '{location}'.
    ValidationUnknownLocationError {
        /// The location that was unknown.
        location: String,
    },

    /// Query requires variable '{name}', but it was not provided.
    ValidationMissingVariable {
        /// Name of the variable.
        name: String,
    },

    /// Query defines variable '{name}' with an invalid value type.
    ValidationInvalidTypeVariable {
        /// Name of the variable.
        name: String,
    },

    /// Query could not be planned: {reason}
    ValidationPlanningError {
        /// The failure reason.
        reason: String,
    },

    /// Query could not be parsed: {reason}
    ValidationParseError {
        /// The failure reason.
        reason: String,
    },

    /// Named operation '{name}' was not found in the document.
    ValidationUnknownOperationError {
        /// The requested operation name.
        name: String,
    },

    /// Query requires introspection, but no executable is registered for the '{location}' location.
    ///
    /// Introspection is delegated to whatever executable serves the reserved
    /// supergraph location, typically the composed schema itself.
    ValidationMissingIntrospectionExecutable {
        /// The reserved supergraph location.
        location: String,
    },

    /// Location '{location}' response was malformed: {reason}
    SubrequestMalformedResponse {
        /// The location that responded with the malformed response.
        location: String,

        /// The reason the serialization failed.
        reason: String,
    },

    /// HTTP fetch failed from '{location}': {reason}
    ///
    /// Note that this relates to a transport error and not a GraphQL error.
    SubrequestHttpError {
        /// The location that failed.
        location: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// Subquery requires field '{field}' but it was not found in the current response.
    ExecutionFieldNotFound {
        /// The field that is not found.
        field: String,
    },

    /// Invalid content: {reason}
    ExecutionInvalidContent { reason: String },

    /// Could not find path: {reason}
    ExecutionPathNotFound { reason: String },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        Error {
            message: self.to_string(),
            locations: Default::default(),
            path,
            extensions: serde_json::to_value(self)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default(),
        }
    }

    /// Convert the error to an appropriate response.
    pub fn to_response(&self) -> Response {
        Response {
            data: Default::default(),
            errors: vec![self.to_graphql_error(None)],
        }
    }
}

/// Any error.
#[derive(Error, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error from the originating request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// The path of the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional graphql extensions.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

/// A location in the request that triggered a graphql error.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// The line number.
    pub line: i32,

    /// The column number.
    pub column: i32,
}

/// Error in the supergraph schema.
#[derive(Debug, Error, Display)]
pub enum SchemaError {
    /// IO error: {0}
    IoError(#[from] std::io::Error),
    /// Parsing error(s): {0}
    Parse(ParseErrors),
}

/// Collected syntax errors from parsing a GraphQL document.
#[derive(Debug)]
pub struct ParseErrors {
    errors: Vec<apollo_parser::Error>,
}

impl ParseErrors {
    pub(crate) fn new(errors: Iter<'_, apollo_parser::Error>) -> Self {
        Self {
            errors: errors.cloned().collect(),
        }
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} (at offset {})", err.message(), err.index())?;
        }
        Ok(())
    }
}
