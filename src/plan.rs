use crate::prelude::graphql::*;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// GraphQL operation type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Keyword form, as written in a GraphQL document.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }

    /// Default root operation type name.
    pub fn default_type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

impl Default for OperationKind {
    fn default() -> Self {
        OperationKind::Query
    }
}

/// An executable stitching plan: a flat list of location operations ordered
/// so that an operation never precedes the operation that supplies its
/// `after_key` dependency.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub ops: Vec<PlanOperation>,
}

impl Plan {
    /// Checks that every planned location has a registered executable,
    /// returning an error response usable as-is otherwise.
    pub fn validate_locations(&self, supergraph: &Supergraph) -> Result<(), Response> {
        let unknown: Vec<&str> = self
            .ops
            .iter()
            .map(|op| op.location.as_str())
            .filter(|location| !supergraph.has_executable(location))
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            failfast_debug!("unknown locations in plan: {:?}", unknown);
            Err(Response::builder()
                .errors(
                    unknown
                        .into_iter()
                        .map(|location| {
                            if location == SUPERGRAPH_LOCATION {
                                FetchError::ValidationMissingIntrospectionExecutable {
                                    location: location.to_string(),
                                }
                            } else {
                                FetchError::ValidationUnknownLocationError {
                                    location: location.to_string(),
                                }
                            }
                            .to_graphql_error(None)
                        })
                        .collect::<Vec<_>>(),
                )
                .build())
        }
    }

    pub fn contains_mutations(&self) -> bool {
        self.ops
            .iter()
            .any(|op| op.operation_type == OperationKind::Mutation)
    }
}

/// One delegated operation within a [`Plan`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOperation {
    /// Unique key of this operation within the plan.
    pub key: usize,

    /// Key of the operation whose results this one depends on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_key: Option<usize>,

    /// The location this operation executes at.
    pub location: String,

    /// The operation type sent to the location.
    pub operation_type: OperationKind,

    /// Field names from the result root down to the objects this operation's
    /// results merge into. Empty for root operations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insertion_path: Vec<String>,

    /// Restricts this operation to origin objects of the given concrete type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_condition: Option<String>,

    /// The serialized selection set delegated to the location.
    pub selections: String,

    /// Variables used by `selections`, mapped to their GraphQL type text.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, String>,

    /// The boundary used to reach the location, absent for root operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary: Option<Boundary>,
}
