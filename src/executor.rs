use crate::prelude::graphql::*;
use futures::future::join_all;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Matches the aliases boundary documents use for their results:
/// `_<op key>_result` for list boundaries, `_<op key>_<origin>_result`
/// for singular ones.
static RESULT_ALIAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_(\d+)(?:_(\d+))?_result$").expect("the regex is valid; qed"));

/// Execution tuning knobs.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct ExecutionOptions {
    /// Dispatch the location requests of a wave concurrently instead of
    /// one after the other.
    #[builder(default)]
    pub nonblocking: bool,

    /// Time limit applied to each location request.
    #[builder(default)]
    pub timeout: Option<Duration>,
}

/// Runs a [`Plan`] in dependency waves: every operation whose parent has
/// completed executes in the next wave, location requests within a wave
/// batch together.
pub struct Executor<'a> {
    supergraph: &'a Supergraph,
    variables: &'a Object,
    options: &'a ExecutionOptions,
    query_count: usize,
}

/// One request to one location, carrying the plan operations it serves
/// and, for boundary operations, the origin paths their results merge
/// back into.
struct Subrequest<'p> {
    location: String,
    document: String,
    variables: Object,
    ops: Vec<&'p PlanOperation>,
    origins: HashMap<usize, Vec<Path>>,
}

impl<'a> Executor<'a> {
    pub fn new(
        supergraph: &'a Supergraph,
        variables: &'a Object,
        options: &'a ExecutionOptions,
    ) -> Self {
        Self {
            supergraph,
            variables,
            options,
            query_count: 0,
        }
    }

    /// Number of location requests dispatched so far.
    pub fn query_count(&self) -> usize {
        self.query_count
    }

    #[tracing::instrument(skip_all, level = "debug")]
    pub async fn perform(&mut self, plan: &Plan) -> (Value, Vec<Error>) {
        let mut data = Value::Object(Object::default());
        let mut errors = Vec::new();

        // `done` stops an operation from running again; only `completed`
        // releases its dependents. Pruned and failed operations are done
        // but never complete, so their sub-trees stay untouched.
        let mut done: HashSet<usize> = HashSet::new();
        let mut completed: HashSet<usize> = HashSet::new();

        loop {
            let ready = plan
                .ops
                .iter()
                .filter(|op| {
                    !done.contains(&op.key)
                        && op
                            .after_key
                            .map(|key| completed.contains(&key))
                            .unwrap_or(true)
                })
                .collect::<Vec<_>>();
            if ready.is_empty() {
                break;
            }

            let mut subrequests = Vec::new();

            let mut roots: IndexMap<&str, Vec<&PlanOperation>> = IndexMap::new();
            for op in &ready {
                if op.boundary.is_none() {
                    roots.entry(op.location.as_str()).or_default().push(*op);
                }
            }
            for (location, ops) in roots {
                subrequests.push(self.prepare_root(location, ops));
            }

            let mut boundaries: IndexMap<&str, Vec<&PlanOperation>> = IndexMap::new();
            for op in &ready {
                if op.boundary.is_some() {
                    boundaries.entry(op.location.as_str()).or_default().push(*op);
                }
            }
            for (location, ops) in boundaries {
                let (subrequest, pruned) = self.prepare_boundary(location, ops, &data);
                for key in pruned {
                    // no origin objects in the current data, so the whole
                    // branch is pruned
                    done.insert(key);
                }
                if let Some(subrequest) = subrequest {
                    subrequests.push(subrequest);
                }
            }

            if subrequests.is_empty() {
                continue;
            }
            self.query_count += subrequests.len();

            let outcomes = if self.options.nonblocking {
                join_all(subrequests.iter().map(|sub| self.dispatch(sub))).await
            } else {
                let mut outcomes = Vec::with_capacity(subrequests.len());
                for subrequest in &subrequests {
                    outcomes.push(self.dispatch(subrequest).await);
                }
                outcomes
            };

            for (subrequest, outcome) in subrequests.iter().zip(outcomes) {
                match outcome {
                    Ok(response) => {
                        self.merge_response(subrequest, response, &mut data, &mut errors);
                        for op in &subrequest.ops {
                            done.insert(op.key);
                            completed.insert(op.key);
                        }
                    }
                    Err(err) => {
                        failfast_error!("location {} failed: {}", subrequest.location, err);
                        for op in &subrequest.ops {
                            errors.push(err.to_graphql_error(Some(Path::from_keys(
                                op.insertion_path.clone(),
                            ))));
                            done.insert(op.key);
                        }
                    }
                }
            }
        }

        (data, errors)
    }

    async fn dispatch(&self, subrequest: &Subrequest<'_>) -> Result<Response, FetchError> {
        let call = self.supergraph.execute_at_location(
            &subrequest.location,
            &subrequest.document,
            subrequest.variables.clone(),
        );
        match self.options.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::SubrequestHttpError {
                    location: subrequest.location.clone(),
                    reason: format!("request timed out after {:?}", timeout),
                }),
            },
            None => call.await,
        }
    }

    /// Root operations of a wave sharing a location combine into one
    /// document.
    fn prepare_root<'p>(&self, location: &str, ops: Vec<&'p PlanOperation>) -> Subrequest<'p> {
        let operation_type = ops[0].operation_type;
        let body = ops
            .iter()
            .map(|op| inner_selections(&op.selections))
            .collect::<Vec<_>>()
            .join(" ");
        let document = format!(
            "{}{} {{ {} }}",
            operation_type.as_str(),
            variable_declarations(&ops),
            body,
        );
        let variables = self.scoped_variables(ops.iter().flat_map(|op| op.variables.keys()));

        Subrequest {
            location: location.to_string(),
            document,
            variables,
            ops,
            origins: HashMap::new(),
        }
    }

    /// Boundary operations of a wave sharing a location combine into one
    /// aliased document: each operation fetches its origin objects' join
    /// keys out of the merged data and contributes one batched field call
    /// (or one call per origin for singular and composite-key boundaries).
    ///
    /// Returns the subrequest, if any operation has qualifying origins,
    /// along with the keys of the operations that got pruned.
    fn prepare_boundary<'p>(
        &self,
        location: &str,
        ops: Vec<&'p PlanOperation>,
        data: &Value,
    ) -> (Option<Subrequest<'p>>, Vec<usize>) {
        let mut included = Vec::new();
        let mut pruned = Vec::new();
        let mut origins_by_op = HashMap::new();
        let mut fields = Vec::new();

        for op in ops {
            let boundary = op
                .boundary
                .as_ref()
                .expect("only boundary operations are grouped here; qed");
            let mut origins = Vec::new();
            collect_origins(
                data,
                Path::empty(),
                &op.insertion_path,
                op.type_condition.as_deref(),
                &boundary.key_aliases(),
                self.supergraph.schema(),
                &mut origins,
            );
            if origins.is_empty() {
                pruned.push(op.key);
                continue;
            }

            let (paths, keys): (Vec<Path>, Vec<Vec<Value>>) = origins.into_iter().unzip();

            if boundary.batches_keys() {
                let keys = keys
                    .into_iter()
                    .map(|mut values| values.remove(0))
                    .collect();
                let keys = serde_json::to_string(&Value::Array(keys))
                    .expect("serializing json values never fails; qed");
                fields.push(format!(
                    "_{}_result: {}({}: {}) {}",
                    op.key, boundary.field, boundary.args[0], keys, op.selections,
                ));
            } else {
                for (i, values) in keys.iter().enumerate() {
                    let args = boundary
                        .args
                        .iter()
                        .zip(values)
                        .map(|(arg, value)| {
                            let value = serde_json::to_string(value)
                                .expect("serializing json values never fails; qed");
                            format!("{}: {}", arg, value)
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    fields.push(format!(
                        "_{}_{}_result: {}({}) {}",
                        op.key, i, boundary.field, args, op.selections,
                    ));
                }
            }

            origins_by_op.insert(op.key, paths);
            included.push(op);
        }

        if included.is_empty() {
            return (None, pruned);
        }

        let document = format!(
            "query{} {{ {} }}",
            variable_declarations(&included),
            fields.join(" "),
        );
        let variables =
            self.scoped_variables(included.iter().flat_map(|op| op.variables.keys()));

        let subrequest = Subrequest {
            location: location.to_string(),
            document,
            variables,
            ops: included,
            origins: origins_by_op,
        };
        (Some(subrequest), pruned)
    }

    fn scoped_variables<'k>(&self, names: impl Iterator<Item = &'k String>) -> Object {
        let mut variables = Object::new();
        for name in names {
            if let Some(value) = self.variables.get(name) {
                variables.insert(name.clone(), value.clone());
            }
        }
        variables
    }

    fn merge_response(
        &self,
        subrequest: &Subrequest<'_>,
        response: Response,
        data: &mut Value,
        errors: &mut Vec<Error>,
    ) {
        let Response {
            data: mut payload,
            errors: response_errors,
        } = response;

        for mut error in response_errors {
            // line/column positions refer to a document the client never
            // wrote
            error.locations = Vec::new();
            error.path = error.path.take().map(|path| repath(path, subrequest));
            errors.push(error);
        }

        if subrequest.origins.is_empty() {
            data.deep_merge(payload);
            return;
        }

        for op in &subrequest.ops {
            let origins = subrequest
                .origins
                .get(&op.key)
                .expect("boundary subrequests carry their origins; qed");
            let boundary = op
                .boundary
                .as_ref()
                .expect("subrequests with origins are boundary requests; qed");

            if boundary.batches_keys() {
                let alias = format!("_{}_result", op.key);
                match take_result(&mut payload, &alias) {
                    Some(Value::Array(results)) => {
                        for (origin, result) in origins.iter().zip(results) {
                            merge_origin(data, origin, result);
                        }
                    }
                    Some(Value::Null) | None => {}
                    Some(other) => {
                        failfast_debug!("boundary list result is not an array: {:?}", other);
                    }
                }
            } else {
                for (i, origin) in origins.iter().enumerate() {
                    let alias = format!("_{}_{}_result", op.key, i);
                    if let Some(result) = take_result(&mut payload, &alias) {
                        merge_origin(data, origin, result);
                    }
                }
            }
        }
    }
}

/// Collect the concrete paths and key values of the objects a boundary
/// operation joins onto, walking `remaining` from `value` and fanning out
/// through arrays. Objects missing any key are skipped.
fn collect_origins(
    value: &Value,
    current: Path,
    remaining: &[String],
    type_condition: Option<&str>,
    key_aliases: &[String],
    schema: &Schema,
    origins: &mut Vec<(Path, Vec<Value>)>,
) {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_origins(
                    item,
                    current.child_index(i),
                    remaining,
                    type_condition,
                    key_aliases,
                    schema,
                    origins,
                );
            }
        }
        Value::Object(object) => match remaining.split_first() {
            Some((head, rest)) => {
                if let Some(child) = object.get(head.as_str()) {
                    collect_origins(
                        child,
                        current.child_key(head),
                        rest,
                        type_condition,
                        key_aliases,
                        schema,
                        origins,
                    );
                }
            }
            None => {
                if let Some(condition) = type_condition {
                    let matches = object
                        .get("_STITCH_typename")
                        .and_then(Value::as_str)
                        .map(|typename| typename == condition || schema.is_subtype(condition, typename))
                        .unwrap_or(false);
                    if !matches {
                        return;
                    }
                }
                let mut values = Vec::with_capacity(key_aliases.len());
                for alias in key_aliases {
                    match object.get(alias.as_str()) {
                        Some(key) if !key.is_null() => values.push(key.clone()),
                        _ => return,
                    }
                }
                origins.push((current, values));
            }
        },
        _ => {}
    }
}

fn take_result(payload: &mut Value, alias: &str) -> Option<Value> {
    payload.as_object_mut().and_then(|object| object.remove(alias))
}

fn merge_origin(data: &mut Value, origin: &Path, result: Value) {
    if result.is_null() {
        // null results leave the origin object as fetched so far
        return;
    }
    match data.get_path_mut(origin) {
        Some(target) => target.deep_merge(result),
        None => failfast_debug!("origin path {} no longer addresses data", origin),
    }
}

/// Rebase a location error path from the batched document onto the origin
/// object it refers to. Paths that cannot be resolved keep only their
/// remainder.
fn repath(path: Path, subrequest: &Subrequest<'_>) -> Path {
    let mut elements = path.0.into_iter();
    let first = match elements.next() {
        Some(element) => element,
        None => return Path::empty(),
    };

    let alias = match &first {
        PathElement::Key(key) => key.clone(),
        PathElement::Index(_) => return Path(std::iter::once(first).chain(elements).collect()),
    };
    let captures = match RESULT_ALIAS.captures(&alias) {
        Some(captures) => captures,
        None => return Path(std::iter::once(first).chain(elements).collect()),
    };

    let op_key = captures[1].parse::<usize>().unwrap_or_default();
    let origin_index = captures.get(2).map(|m| m.as_str().parse::<usize>().unwrap_or_default());

    match origin_index {
        // singular aliases carry their origin index themselves
        Some(i) => match subrequest.origins.get(&op_key).and_then(|origins| origins.get(i)) {
            Some(origin) => origin.join(elements),
            None => Path(elements.collect()),
        },
        // list aliases are followed by the batch index
        None => match elements.next() {
            Some(PathElement::Index(i)) => {
                match subrequest.origins.get(&op_key).and_then(|origins| origins.get(i)) {
                    Some(origin) => origin.join(elements),
                    None => Path(elements.collect()),
                }
            }
            Some(other) => Path(std::iter::once(other).chain(elements).collect()),
            None => Path::empty(),
        },
    }
}

fn inner_selections(selections: &str) -> &str {
    selections
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim()
}

fn variable_declarations(ops: &[&PlanOperation]) -> String {
    let mut declarations: IndexMap<&String, &String> = IndexMap::new();
    for op in ops {
        for (name, type_text) in &op.variables {
            declarations.insert(name, type_text);
        }
    }
    if declarations.is_empty() {
        return String::new();
    }
    format!(
        "({})",
        declarations
            .iter()
            .map(|(name, type_text)| format!("${}: {}", name, type_text))
            .collect::<Vec<_>>()
            .join(", "),
    )
}
