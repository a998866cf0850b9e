use crate::prelude::graphql::*;

/// The client-facing entry point: parses and validates a request, plans it
/// against the supergraph, executes the plan, and shapes the merged result
/// into the final response.
pub struct Gateway {
    supergraph: Supergraph,
    options: ExecutionOptions,
}

impl Gateway {
    pub fn new(supergraph: Supergraph, options: ExecutionOptions) -> Self {
        Self {
            supergraph,
            options,
        }
    }

    pub fn supergraph(&self) -> &Supergraph {
        &self.supergraph
    }

    #[tracing::instrument(skip_all, level = "info")]
    pub async fn execute(&self, request: Request) -> Response {
        let query_string = match request.query.as_deref() {
            Some(query) if !query.trim().is_empty() => query,
            _ => {
                return FetchError::ValidationParseError {
                    reason: "no query provided".to_string(),
                }
                .to_response()
            }
        };

        let query = match Query::parse(query_string, self.supergraph.schema()) {
            Some(query) => query,
            None => {
                return FetchError::ValidationParseError {
                    reason: "the query could not be parsed or validated against the schema"
                        .to_string(),
                }
                .to_response()
            }
        };

        let operation_name = request.operation_name.as_deref();
        let operation = match query.operation(operation_name) {
            Some(operation) => operation,
            None => {
                return match operation_name {
                    Some(name) => FetchError::ValidationUnknownOperationError {
                        name: name.to_string(),
                    },
                    None => FetchError::ValidationPlanningError {
                        reason: "the document defines no unambiguous operation".to_string(),
                    },
                }
                .to_response()
            }
        };

        if let Err(response) = query.validate_variables(&request, self.supergraph.schema()) {
            return response;
        }

        let plan = match Planner::new(&self.supergraph, &query, operation_name)
            .and_then(|planner| planner.plan())
        {
            Ok(plan) => plan,
            Err(err) => return err.to_response(),
        };

        if let Err(response) = plan.validate_locations(&self.supergraph) {
            return response;
        }

        let mut executor =
            Executor::new(&self.supergraph, request.variables.as_ref(), &self.options);
        let (data, mut errors) = executor.perform(&plan).await;

        let shaper = Shaper::new(&self.supergraph, &query, operation);
        let (data, shape_errors) = shaper.perform(data);
        errors.extend(shape_errors);

        Response::builder().data(data).errors(errors).build()
    }
}
