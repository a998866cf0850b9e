use crate::prelude::graphql::*;
use apollo_parser::ast::{self, AstNode};
use indexmap::IndexMap;

/// A parsed client document: operations plus fragment definitions, with
/// every field resolved against the supergraph schema.
#[derive(Debug, Default)]
pub struct Query {
    string: String,
    pub(crate) fragments: Fragments,
    pub(crate) operations: Vec<Operation>,
}

impl Query {
    pub fn as_str(&self) -> &str {
        &self.string
    }

    /// Parse a query string against the supergraph schema.
    ///
    /// Returns `None` if the document has syntax errors or references fields
    /// unknown to the schema.
    #[tracing::instrument(skip_all, level = "trace")]
    pub fn parse(query: impl Into<String>, schema: &Schema) -> Option<Self> {
        let string = query.into();

        let parser = apollo_parser::Parser::new(string.as_str());
        let tree = parser.parse();
        let errors = tree
            .errors()
            .map(|err| format!("{:?}", err))
            .collect::<Vec<_>>();

        if !errors.is_empty() {
            failfast_debug!("parsing error(s): {}", errors.join(", "));
            return None;
        }

        let document = tree.document();
        let fragments = Fragments::from_ast(&document, schema)?;

        let operations = document
            .definitions()
            .filter_map(|definition| {
                if let ast::Definition::OperationDefinition(operation) = definition {
                    Some(Operation::from_ast(operation, schema))
                } else {
                    None
                }
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Query {
            string,
            fragments,
            operations,
        })
    }

    /// Select the operation to execute: the named one when a name is given,
    /// otherwise the only one in the document.
    pub fn operation(&self, name: Option<&str>) -> Option<&Operation> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name)),
            None => {
                if self.operations.len() == 1 {
                    self.operations.first()
                } else {
                    None
                }
            }
        }
    }

    /// Validate a [`Request`]'s variables against this [`Query`].
    #[tracing::instrument(skip_all, level = "trace")]
    pub fn validate_variables(&self, request: &Request, schema: &Schema) -> Result<(), Response> {
        let operation_name = request.operation_name.as_deref();
        let mut errors = Vec::new();

        for operation in self.operations.iter().filter(|operation| {
            operation_name.is_none() || operation.name.as_deref() == operation_name
        }) {
            for (name, definition) in &operation.variables {
                match request.variables.get(name) {
                    None => {
                        if definition.field_type.is_non_null() && !definition.has_default {
                            errors.push(
                                FetchError::ValidationMissingVariable { name: name.clone() }
                                    .to_graphql_error(None),
                            );
                        }
                    }
                    Some(value) => {
                        if definition
                            .field_type
                            .validate_value(value, schema)
                            .is_err()
                        {
                            errors.push(
                                FetchError::ValidationInvalidTypeVariable { name: name.clone() }
                                    .to_graphql_error(None),
                            );
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Response::builder().errors(errors).build())
        }
    }
}

/// A single operation of a parsed document.
#[derive(Debug)]
pub struct Operation {
    pub(crate) name: Option<String>,
    pub(crate) kind: OperationKind,
    pub(crate) selection_set: Vec<Selection>,
    pub(crate) variables: IndexMap<String, VariableDefinition>,
}

impl Operation {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    // Spec: https://spec.graphql.org/draft/#sec-Language.Operations
    fn from_ast(operation: ast::OperationDefinition, schema: &Schema) -> Option<Self> {
        let name = operation.name().map(|x| x.text().to_string());

        let kind = operation
            .operation_type()
            .map(OperationKind::from)
            .unwrap_or_default();

        let current_type =
            FieldType::Named(schema.root_operation_name(kind).to_string());

        let selection_set = operation
            .selection_set()
            .expect("the node SelectionSet is not optional in the spec; qed")
            .selections()
            .map(|selection| Selection::from_ast(selection, &current_type, schema))
            .collect::<Option<_>>()?;

        let variables = operation
            .variable_definitions()
            .iter()
            .flat_map(|x| x.variable_definitions())
            .map(|definition| {
                let name = definition
                    .variable()
                    .expect("the node Variable is not optional in the spec; qed")
                    .name()
                    .expect("the node Name is not optional in the spec; qed")
                    .text()
                    .to_string();
                let ty = definition
                    .ty()
                    .expect("the node Type is not optional in the spec; qed");
                // the syntax text carries trailing trivia, including the
                // comma separating it from the next definition
                let type_text = ty
                    .syntax()
                    .text()
                    .to_string()
                    .trim_end_matches(|c: char| c == ',' || c.is_whitespace())
                    .trim_start()
                    .to_string();

                (
                    name,
                    VariableDefinition {
                        field_type: FieldType::from(ty),
                        type_text,
                        has_default: definition.default_value().is_some(),
                    },
                )
            })
            .collect();

        Some(Operation {
            selection_set,
            name,
            variables,
            kind,
        })
    }

    /// GraphQL type text of a declared variable, e.g. `[ID!]!`.
    pub(crate) fn variable_type_text(&self, name: &str) -> Option<&str> {
        self.variables
            .get(name)
            .map(|definition| definition.type_text.as_str())
    }
}

/// A declared operation variable.
#[derive(Debug)]
pub struct VariableDefinition {
    pub(crate) field_type: FieldType,
    pub(crate) type_text: String,
    pub(crate) has_default: bool,
}

impl From<ast::OperationType> for OperationKind {
    // Spec: https://spec.graphql.org/draft/#OperationType
    fn from(operation_type: ast::OperationType) -> Self {
        if operation_type.query_token().is_some() {
            Self::Query
        } else if operation_type.mutation_token().is_some() {
            Self::Mutation
        } else if operation_type.subscription_token().is_some() {
            Self::Subscription
        } else {
            unreachable!(
                "either the `query` token is provided, either the `mutation` token, \
                either the `subscription` token; qed"
            )
        }
    }
}
