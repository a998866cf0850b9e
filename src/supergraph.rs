use crate::prelude::graphql::*;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reserved location name for fields the gateway resolves locally,
/// i.e. schema introspection.
pub const SUPERGRAPH_LOCATION: &str = "__super";

/// The composed graph: the merged schema plus the routing tables that say
/// which location resolves which field and how entity types join across
/// locations.
pub struct Supergraph {
    schema: Schema,
    /// type name -> field name -> locations able to resolve it, in
    /// preference order.
    fields: HashMap<String, IndexMap<String, Vec<String>>>,
    /// type name -> boundaries that resolve it, in declaration order.
    boundaries: HashMap<String, Vec<Boundary>>,
    /// type name -> location -> boundary key sets fully resolvable there.
    possible_keys: HashMap<String, HashMap<String, Vec<Vec<String>>>>,
    executables: HashMap<String, Arc<dyn Executable>>,
}

impl fmt::Debug for Supergraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supergraph")
            .field("fields", &self.fields)
            .field("boundaries", &self.boundaries)
            .field("locations", &self.executables.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Supergraph {
    pub fn new(
        schema: Schema,
        fields: HashMap<String, IndexMap<String, Vec<String>>>,
        boundaries: HashMap<String, Vec<Boundary>>,
    ) -> Self {
        // precompute which key sets can leave each (type, location) pair:
        // the boundary key sets whose every member the location resolves
        let mut possible_keys: HashMap<String, HashMap<String, Vec<Vec<String>>>> = HashMap::new();
        for (type_name, type_boundaries) in &boundaries {
            let type_fields = fields.get(type_name);
            let mut locations: Vec<&str> = type_fields
                .iter()
                .flat_map(|fields| {
                    fields
                        .values()
                        .flat_map(|locations| locations.iter().map(|l| l.as_str()))
                })
                .collect();
            locations.sort_unstable();
            locations.dedup();

            let by_location = possible_keys.entry(type_name.clone()).or_default();
            for location in locations {
                let mut key_sets: Vec<Vec<String>> = Vec::new();
                for boundary in type_boundaries {
                    if key_sets.iter().any(|set| set == &boundary.keys) {
                        continue;
                    }
                    let available = boundary.keys.iter().all(|key| {
                        type_fields
                            .and_then(|fields| fields.get(key))
                            .map(|locations| locations.iter().any(|l| l == location))
                            .unwrap_or(false)
                    });
                    if available {
                        key_sets.push(boundary.keys.clone());
                    }
                }
                by_location.insert(location.to_string(), key_sets);
            }
        }

        Self {
            schema,
            fields,
            boundaries,
            possible_keys,
            executables: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn boundaries(&self, type_name: &str) -> &[Boundary] {
        self.boundaries
            .get(type_name)
            .map(|b| b.as_slice())
            .unwrap_or_default()
    }

    /// Locations able to resolve a field, in preference order.
    pub fn locations_for_field(&self, type_name: &str, field_name: &str) -> Option<&[String]> {
        self.fields
            .get(type_name)
            .and_then(|fields| fields.get(field_name))
            .map(|locations| locations.as_slice())
    }

    pub(crate) fn possible_keys(&self, type_name: &str, location: &str) -> &[Vec<String>] {
        self.possible_keys
            .get(type_name)
            .and_then(|by_location| by_location.get(location))
            .map(|key_sets| key_sets.as_slice())
            .unwrap_or_default()
    }

    /// Register the executable that serves a location.
    pub fn assign_executable(&mut self, location: impl Into<String>, executable: Arc<dyn Executable>) {
        self.executables.insert(location.into(), executable);
    }

    pub fn has_executable(&self, location: &str) -> bool {
        self.executables.contains_key(location)
    }

    /// Dispatch a document to the executable registered for a location.
    #[tracing::instrument(skip_all, level = "debug", fields(location = location))]
    pub async fn execute_at_location(
        &self,
        location: &str,
        document: &str,
        variables: Object,
    ) -> Result<Response, FetchError> {
        let executable = self.executables.get(location).ok_or_else(|| {
            FetchError::ValidationUnknownLocationError {
                location: location.to_string(),
            }
        })?;
        tracing::trace!(%document, "location request");
        executable.execute(document, variables).await
    }

    /// Find the cheapest chains of boundaries that reach each goal location
    /// from `start_location`, for objects of the given type.
    ///
    /// Routes favor the fewest hops into non-goal locations, then the fewest
    /// joins overall. Unreachable goals are absent from the result.
    pub fn route_type_to_locations(
        &self,
        type_name: &str,
        start_location: &str,
        goal_locations: &[String],
    ) -> HashMap<String, Vec<Boundary>> {
        let mut results: HashMap<String, Vec<Boundary>> = HashMap::new();
        let mut costs: HashMap<String, usize> = HashMap::new();

        let mut paths: Vec<Vec<PathStep>> = self
            .possible_keys(type_name, start_location)
            .iter()
            .map(|keys| {
                vec![PathStep {
                    location: start_location.to_string(),
                    keys: keys.clone(),
                    cost: 0,
                    boundary: None,
                }]
            })
            .collect();

        while let Some(path) = {
            // best-first: pop the cheapest, shortest candidate
            paths.sort_by(|a, b| {
                let ka = (a.last().map(|s| s.cost).unwrap_or(0), a.len());
                let kb = (b.last().map(|s| s.cost).unwrap_or(0), b.len());
                kb.cmp(&ka)
            });
            paths.pop()
        } {
            let (current_keys, current_cost) = {
                let last = path.last().expect("paths are never empty; qed");
                (last.keys.clone(), last.cost)
            };

            for boundary in self.boundaries(type_name) {
                if boundary.keys != current_keys {
                    continue;
                }
                let forward = boundary.location.as_str();
                // never revisit a location within one path
                if path.iter().any(|step| step.location == forward) {
                    continue;
                }
                let best_cost = costs.get(forward).copied().unwrap_or(usize::MAX);
                if best_cost < current_cost {
                    continue;
                }

                let mut candidate = path.clone();
                {
                    let last = candidate.last_mut().expect("paths are never empty; qed");
                    last.boundary = Some(boundary.clone());
                }

                let mut forward_cost = current_cost;
                if goal_locations.iter().any(|goal| goal == forward) {
                    let replace = match results.get(forward) {
                        None => true,
                        Some(existing) => {
                            current_cost < best_cost
                                || (current_cost == best_cost && candidate.len() < existing.len())
                        }
                    };
                    if replace {
                        results.insert(
                            forward.to_string(),
                            candidate
                                .iter()
                                .filter_map(|step| step.boundary.clone())
                                .collect(),
                        );
                    }
                } else {
                    forward_cost += 1;
                }

                if forward_cost < best_cost {
                    costs.insert(forward.to_string(), forward_cost);
                }

                for keys in self.possible_keys(type_name, forward) {
                    let mut next = candidate.clone();
                    next.push(PathStep {
                        location: forward.to_string(),
                        keys: keys.clone(),
                        cost: forward_cost,
                        boundary: None,
                    });
                    paths.push(next);
                }
            }
        }

        results
    }
}

#[derive(Clone, Debug)]
struct PathStep {
    location: String,
    keys: Vec<String>,
    cost: usize,
    boundary: Option<Boundary>,
}
