use crate::prelude::graphql::*;
use indexmap::IndexMap;

/// Plans a parsed client operation against a [`Supergraph`]: walks the
/// selections from the root, carves them up by resolving location, and
/// chains boundary operations wherever the walk crosses locations.
pub struct Planner<'a> {
    supergraph: &'a Supergraph,
    query: &'a Query,
    operation: &'a Operation,
    ops: Vec<PlanOperation>,
    count: usize,
}

impl<'a> Planner<'a> {
    pub fn new(
        supergraph: &'a Supergraph,
        query: &'a Query,
        operation_name: Option<&str>,
    ) -> Result<Self, FetchError> {
        let operation = query.operation(operation_name).ok_or_else(|| match operation_name {
            Some(name) => FetchError::ValidationUnknownOperationError {
                name: name.to_string(),
            },
            None => FetchError::ValidationPlanningError {
                reason: "the document defines no unambiguous operation".to_string(),
            },
        })?;

        Ok(Self {
            supergraph,
            query,
            operation,
            ops: Vec::new(),
            count: 0,
        })
    }

    #[tracing::instrument(skip_all, level = "debug")]
    pub fn plan(mut self) -> Result<Plan, FetchError> {
        match self.operation.kind {
            OperationKind::Query => self.plan_root_query()?,
            OperationKind::Mutation => self.plan_root_mutation()?,
            OperationKind::Subscription => {
                return Err(FetchError::ValidationPlanningError {
                    reason: "subscription operations are not supported".to_string(),
                })
            }
        }
        Ok(Plan { ops: self.ops })
    }

    fn next_key(&mut self) -> usize {
        self.count += 1;
        self.count
    }

    /// Root query fields group by resolving location; one root operation is
    /// emitted per location and all run in the first wave.
    fn plan_root_query(&mut self) -> Result<(), FetchError> {
        let operation = self.operation;
        let root_type = self
            .supergraph
            .schema()
            .root_operation_name(OperationKind::Query)
            .to_string();

        let fields = self.flatten_root(&operation.selection_set, &root_type);
        let mut groups: Vec<(String, Vec<&'a Selection>)> = Vec::new();
        for field in fields {
            // root __typename is answered during shaping, never delegated
            if matches!(field, Selection::Field { name, .. } if name == "__typename") {
                continue;
            }
            let location = self.root_location(&root_type, field)?;
            match groups.iter_mut().find(|(l, _)| *l == location) {
                Some((_, group)) => group.push(field),
                None => groups.push((location, vec![field])),
            }
        }

        for (location, fields) in groups {
            self.add_root_operation(&location, &root_type, fields, OperationKind::Query, None)?;
        }
        Ok(())
    }

    /// Root mutation fields partition into consecutive same-location runs;
    /// runs chain serially so mutations apply in document order.
    fn plan_root_mutation(&mut self) -> Result<(), FetchError> {
        let operation = self.operation;
        let root_type = self
            .supergraph
            .schema()
            .root_operation_name(OperationKind::Mutation)
            .to_string();

        let fields = self.flatten_root(&operation.selection_set, &root_type);
        let mut runs: Vec<(String, Vec<&'a Selection>)> = Vec::new();
        for field in fields {
            if matches!(field, Selection::Field { name, .. } if name == "__typename") {
                continue;
            }
            let location = self.root_location(&root_type, field)?;
            match runs.last_mut() {
                Some((last, group)) if *last == location => group.push(field),
                _ => runs.push((location, vec![field])),
            }
        }

        let mut after_key = None;
        for (location, fields) in runs {
            let key = self.add_root_operation(
                &location,
                &root_type,
                fields,
                OperationKind::Mutation,
                after_key,
            )?;
            after_key = Some(key);
        }
        Ok(())
    }

    fn add_root_operation(
        &mut self,
        location: &str,
        root_type: &str,
        fields: Vec<&'a Selection>,
        operation_type: OperationKind,
        after_key: Option<usize>,
    ) -> Result<usize, FetchError> {
        let key = self.next_key();
        let index = self.ops.len();
        self.ops.push(PlanOperation {
            key,
            after_key,
            location: location.to_string(),
            operation_type,
            insertion_path: Vec::new(),
            type_condition: None,
            selections: String::new(),
            variables: Default::default(),
            boundary: None,
        });

        let mut used_variables = Vec::new();
        let selections =
            self.extract_locale_selections(location, root_type, &[], &fields, key, None, &mut used_variables)?;
        let variables = self.variable_map(&used_variables)?;

        let op = &mut self.ops[index];
        op.selections = selections;
        op.variables = variables;
        Ok(key)
    }

    /// Resolve root-level fragments into a flat field list. Introspection
    /// stays in; fragments that do not condition on the root type are
    /// dropped, matching what shaping would do with their data.
    fn flatten_root(
        &self,
        selections: &'a [Selection],
        root_type: &str,
    ) -> Vec<&'a Selection> {
        let query = self.query;
        let mut fields = Vec::new();
        for selection in selections {
            match selection {
                Selection::Field { .. } => fields.push(selection),
                Selection::InlineFragment { fragment } => {
                    if fragment.type_condition == root_type {
                        fields.extend(self.flatten_root(&fragment.selection_set, root_type));
                    } else {
                        failfast_debug!(
                            "dropping root fragment on {}, root type is {}",
                            fragment.type_condition,
                            root_type,
                        );
                    }
                }
                Selection::FragmentSpread { name } => match query.fragments.get(name) {
                    Some(fragment) if fragment.type_condition == root_type => {
                        fields.extend(self.flatten_root(&fragment.selection_set, root_type));
                    }
                    Some(fragment) => {
                        failfast_debug!(
                            "dropping root fragment on {}, root type is {}",
                            fragment.type_condition,
                            root_type,
                        );
                    }
                    None => failfast_debug!("missing fragment named: {}", name),
                },
            }
        }
        fields
    }

    fn root_location(&self, root_type: &str, field: &Selection) -> Result<String, FetchError> {
        let name = match field {
            Selection::Field { name, .. } => name,
            _ => unreachable!("flatten_root only returns fields; qed"),
        };
        if name.starts_with("__") {
            return Ok(SUPERGRAPH_LOCATION.to_string());
        }
        self.supergraph
            .locations_for_field(root_type, name)
            .and_then(|locations| locations.first())
            .cloned()
            .ok_or_else(|| FetchError::ValidationPlanningError {
                reason: format!("no location resolves {}.{}", root_type, name),
            })
    }

    /// Serialize the selections resolvable at `location` and spawn chained
    /// boundary operations for everything that is not.
    ///
    /// `parent_op_key` is the operation whose results the spawned operations
    /// depend on; `insertion_path` addresses the parent objects within them.
    #[allow(clippy::too_many_arguments)]
    fn extract_locale_selections(
        &mut self,
        location: &str,
        parent_type: &str,
        insertion_path: &[String],
        selections: &[&'a Selection],
        parent_op_key: usize,
        type_condition: Option<&str>,
        used_variables: &mut Vec<String>,
    ) -> Result<String, FetchError> {
        let mut items = Vec::new();
        let mut remote = Vec::new();

        self.collect_items(
            location,
            parent_type,
            insertion_path,
            selections,
            parent_op_key,
            type_condition,
            used_variables,
            &mut items,
            &mut remote,
        )?;

        if !remote.is_empty() {
            self.delegate_remote_fields(
                location,
                parent_type,
                insertion_path,
                remote,
                parent_op_key,
                type_condition,
                &mut items,
            )?;
        }

        Ok(format!("{{ {} }}", items.join(" ")))
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_items(
        &mut self,
        location: &str,
        parent_type: &str,
        insertion_path: &[String],
        selections: &[&'a Selection],
        parent_op_key: usize,
        type_condition: Option<&str>,
        used_variables: &mut Vec<String>,
        items: &mut Vec<String>,
        remote: &mut Vec<&'a Selection>,
    ) -> Result<(), FetchError> {
        let query = self.query;
        for selection in selections.iter().copied() {
            match selection {
                Selection::Field {
                    name,
                    field_type,
                    variable_refs,
                    selection_set,
                    ..
                } => {
                    if name == "__typename" {
                        items.push(serialize_field_shallow(selection));
                        continue;
                    }
                    if matches!(field_type, FieldType::Introspection(_)) {
                        if location == SUPERGRAPH_LOCATION {
                            items.push(self.serialize_verbatim_field(selection));
                        } else {
                            failfast_debug!("introspection field {} outside {}", name, SUPERGRAPH_LOCATION);
                        }
                        continue;
                    }

                    let locations = self
                        .supergraph
                        .locations_for_field(parent_type, name)
                        .ok_or_else(|| FetchError::ValidationPlanningError {
                            reason: format!("no location resolves {}.{}", parent_type, name),
                        })?;

                    if locations.iter().any(|l| l == location) {
                        for variable in variable_refs {
                            if !used_variables.contains(variable) {
                                used_variables.push(variable.clone());
                            }
                        }
                        match selection_set {
                            Some(children) => {
                                let child_type = field_type.inner_type_name().ok_or_else(|| {
                                    FetchError::ValidationPlanningError {
                                        reason: format!(
                                            "selections on scalar field {}.{}",
                                            parent_type, name,
                                        ),
                                    }
                                })?;
                                let mut child_path = insertion_path.to_vec();
                                child_path.push(
                                    selection
                                        .response_key()
                                        .expect("fields always have a response key; qed")
                                        .to_string(),
                                );
                                let child_refs: Vec<&'a Selection> = children.iter().collect();
                                let inner = self.extract_locale_selections(
                                    location,
                                    child_type,
                                    &child_path,
                                    &child_refs,
                                    parent_op_key,
                                    None,
                                    used_variables,
                                )?;
                                items.push(format!(
                                    "{} {}",
                                    serialize_field_shallow(selection),
                                    inner,
                                ));
                            }
                            None => items.push(serialize_field_shallow(selection)),
                        }
                    } else {
                        remote.push(selection);
                    }
                }
                Selection::InlineFragment { fragment } => {
                    self.collect_fragment_items(
                        location,
                        parent_type,
                        insertion_path,
                        fragment,
                        parent_op_key,
                        type_condition,
                        used_variables,
                        items,
                        remote,
                    )?;
                }
                Selection::FragmentSpread { name } => match query.fragments.get(name) {
                    Some(fragment) => {
                        self.collect_fragment_items(
                            location,
                            parent_type,
                            insertion_path,
                            fragment,
                            parent_op_key,
                            type_condition,
                            used_variables,
                            items,
                            remote,
                        )?;
                    }
                    None => {
                        return Err(FetchError::ValidationPlanningError {
                            reason: format!("missing fragment named: {}", name),
                        })
                    }
                },
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_fragment_items(
        &mut self,
        location: &str,
        parent_type: &str,
        insertion_path: &[String],
        fragment: &'a Fragment,
        parent_op_key: usize,
        type_condition: Option<&str>,
        used_variables: &mut Vec<String>,
        items: &mut Vec<String>,
        remote: &mut Vec<&'a Selection>,
    ) -> Result<(), FetchError> {
        if fragment.type_condition == parent_type {
            // same-type fragments splice into the surrounding selection
            let children: Vec<&'a Selection> = fragment.selection_set.iter().collect();
            return self.collect_items(
                location,
                parent_type,
                insertion_path,
                &children,
                parent_op_key,
                type_condition,
                used_variables,
                items,
                remote,
            );
        }

        // narrowing fragment: recurse with the condition as parent type so
        // spawned operations only apply to matching origin objects
        let children: Vec<&'a Selection> = fragment.selection_set.iter().collect();
        let inner = self.extract_locale_selections(
            location,
            &fragment.type_condition,
            insertion_path,
            &children,
            parent_op_key,
            Some(&fragment.type_condition),
            used_variables,
        )?;
        items.push(format!("... on {} {}", fragment.type_condition, inner));
        Ok(())
    }

    /// Group fields this location cannot resolve by target location, then
    /// emit one chained operation per boundary hop of each route.
    #[allow(clippy::too_many_arguments)]
    fn delegate_remote_fields(
        &mut self,
        location: &str,
        parent_type: &str,
        insertion_path: &[String],
        remote: Vec<&'a Selection>,
        parent_op_key: usize,
        type_condition: Option<&str>,
        items: &mut Vec<String>,
    ) -> Result<(), FetchError> {
        let mut goals: Vec<String> = Vec::new();
        for field in &remote {
            if let Selection::Field { name, .. } = field {
                if let Some(locations) = self.supergraph.locations_for_field(parent_type, name) {
                    for candidate in locations {
                        if !goals.contains(candidate) {
                            goals.push(candidate.clone());
                        }
                    }
                }
            }
        }

        let routes = self
            .supergraph
            .route_type_to_locations(parent_type, location, &goals);

        let mut groups: Vec<(String, Vec<&'a Selection>)> = Vec::new();
        for field in remote {
            let name = match field {
                Selection::Field { name, .. } => name,
                _ => unreachable!("only fields are delegated; qed"),
            };
            let locations = self
                .supergraph
                .locations_for_field(parent_type, name)
                .expect("delegated fields were resolved above; qed");
            // first location in preference order that is actually reachable
            let target = locations
                .iter()
                .find(|l| routes.contains_key(*l))
                .ok_or_else(|| FetchError::ValidationPlanningError {
                    reason: format!(
                        "no route from {} resolves {}.{}",
                        location, parent_type, name,
                    ),
                })?;
            match groups.iter_mut().find(|(l, _)| l == target) {
                Some((_, group)) => group.push(field),
                None => groups.push((target.clone(), vec![field])),
            }
        }

        let conditioned =
            type_condition.is_some() || self.supergraph.schema().is_abstract(parent_type);

        for (target, fields) in groups {
            let route = routes
                .get(&target)
                .expect("groups only contain routable targets; qed");

            // the emitting selection must carry the join keys of the first hop
            let first = route.first().expect("routes are never empty; qed");
            for key in &first.keys {
                let key_alias = format!("_STITCH_{}: {}", key, key);
                if !items.contains(&key_alias) {
                    items.push(key_alias);
                }
            }
            if conditioned {
                let typename_alias = "_STITCH_typename: __typename".to_string();
                if !items.contains(&typename_alias) {
                    items.push(typename_alias);
                }
            }

            let mut after_key = parent_op_key;
            for (hop, boundary) in route.iter().enumerate() {
                let key = self.next_key();
                let index = self.ops.len();
                self.ops.push(PlanOperation {
                    key,
                    after_key: Some(after_key),
                    location: boundary.location.clone(),
                    operation_type: OperationKind::Query,
                    insertion_path: insertion_path.to_vec(),
                    type_condition: type_condition.map(str::to_string),
                    selections: String::new(),
                    variables: Default::default(),
                    boundary: Some(boundary.clone()),
                });

                if hop + 1 < route.len() {
                    // intermediate hops only fetch the next join keys
                    let next_keys = route[hop + 1]
                        .keys
                        .iter()
                        .map(|key| format!("_STITCH_{}: {}", key, key))
                        .collect::<Vec<_>>()
                        .join(" ");
                    self.ops[index].selections = format!("{{ {} }}", next_keys);
                } else {
                    let mut used_variables = Vec::new();
                    let selections = self.extract_locale_selections(
                        &boundary.location,
                        parent_type,
                        insertion_path,
                        &fields,
                        key,
                        type_condition,
                        &mut used_variables,
                    )?;
                    let variables = self.variable_map(&used_variables)?;
                    let op = &mut self.ops[index];
                    op.selections = selections;
                    op.variables = variables;
                }
                after_key = key;
            }
        }
        Ok(())
    }

    fn variable_map(&self, names: &[String]) -> Result<IndexMap<String, String>, FetchError> {
        names
            .iter()
            .map(|name| {
                self.operation
                    .variable_type_text(name)
                    .map(|text| (name.clone(), text.to_string()))
                    .ok_or_else(|| FetchError::ValidationPlanningError {
                        reason: format!("operation does not declare variable ${}", name),
                    })
            })
            .collect()
    }

    /// Serialize an introspection sub-tree exactly as requested, resolving
    /// fragment spreads since locations do not know our fragment names.
    fn serialize_verbatim_field(&self, selection: &Selection) -> String {
        match selection {
            Selection::Field { selection_set, .. } => match selection_set {
                Some(children) if !children.is_empty() => format!(
                    "{} {}",
                    serialize_field_shallow(selection),
                    self.serialize_verbatim_set(children),
                ),
                _ => serialize_field_shallow(selection),
            },
            _ => unreachable!("verbatim serialization starts at a field; qed"),
        }
    }

    fn serialize_verbatim_set(&self, selections: &[Selection]) -> String {
        let items = selections
            .iter()
            .filter_map(|selection| match selection {
                Selection::Field { .. } => Some(self.serialize_verbatim_field(selection)),
                Selection::InlineFragment { fragment } => Some(format!(
                    "... on {} {}",
                    fragment.type_condition,
                    self.serialize_verbatim_set(&fragment.selection_set),
                )),
                Selection::FragmentSpread { name } => {
                    self.query.fragments.get(name).map(|fragment| {
                        format!(
                            "... on {} {}",
                            fragment.type_condition,
                            self.serialize_verbatim_set(&fragment.selection_set),
                        )
                    })
                }
            })
            .collect::<Vec<_>>();
        format!("{{ {} }}", items.join(" "))
    }
}

fn serialize_field_shallow(selection: &Selection) -> String {
    match selection {
        Selection::Field {
            name,
            alias,
            arguments,
            ..
        } => {
            let mut out = String::new();
            if let Some(alias) = alias {
                out.push_str(alias);
                out.push_str(": ");
            }
            out.push_str(name);
            if let Some(arguments) = arguments {
                out.push_str(arguments);
            }
            out
        }
        _ => unreachable!("shallow serialization only applies to fields; qed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_log::test;

    fn three_locations() -> Supergraph {
        let schema: Schema = r#"
        type Storefront { id: ID! name: String! products: [Product] }
        type Product { upc: ID! name: String! price: Float! manufacturer: Manufacturer }
        type Manufacturer { id: ID! name: String! address: String! products: [Product] }
        type Query {
            storefront(id: ID!): Storefront
            product(upc: ID!): Product
            products(upcs: [ID!]!): [Product]!
            manufacturer(id: ID!): Manufacturer
        }
        "#
        .parse()
        .unwrap();

        let locations = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut fields = HashMap::new();
        fields.insert(
            "Storefront".to_string(),
            IndexMap::from([
                ("id".to_string(), locations(&["storefronts"])),
                ("name".to_string(), locations(&["storefronts"])),
                ("products".to_string(), locations(&["storefronts"])),
            ]),
        );
        fields.insert(
            "Product".to_string(),
            IndexMap::from([
                ("upc".to_string(), locations(&["storefronts", "products"])),
                ("name".to_string(), locations(&["products"])),
                ("price".to_string(), locations(&["products"])),
                ("manufacturer".to_string(), locations(&["products"])),
            ]),
        );
        fields.insert(
            "Manufacturer".to_string(),
            IndexMap::from([
                ("id".to_string(), locations(&["products", "manufacturers"])),
                ("name".to_string(), locations(&["manufacturers"])),
                ("address".to_string(), locations(&["manufacturers"])),
                ("products".to_string(), locations(&["products"])),
            ]),
        );
        fields.insert(
            "Query".to_string(),
            IndexMap::from([
                ("storefront".to_string(), locations(&["storefronts"])),
                ("product".to_string(), locations(&["products"])),
                ("products".to_string(), locations(&["products"])),
                ("manufacturer".to_string(), locations(&["manufacturers"])),
            ]),
        );

        let mut boundaries = HashMap::new();
        boundaries.insert(
            "Product".to_string(),
            vec![Boundary {
                location: "products".to_string(),
                type_name: "Product".to_string(),
                keys: vec!["upc".to_string()],
                field: "products".to_string(),
                args: vec!["upcs".to_string()],
                list: true,
                federation: None,
            }],
        );
        boundaries.insert(
            "Manufacturer".to_string(),
            vec![Boundary {
                location: "manufacturers".to_string(),
                type_name: "Manufacturer".to_string(),
                keys: vec!["id".to_string()],
                field: "manufacturer".to_string(),
                args: vec!["id".to_string()],
                list: false,
                federation: None,
            }],
        );

        Supergraph::new(schema, fields, boundaries)
    }

    fn plan(supergraph: &Supergraph, document: &str) -> Plan {
        let query = Query::parse(document, supergraph.schema()).expect("could not parse query");
        Planner::new(supergraph, &query, None)
            .expect("could not build planner")
            .plan()
            .expect("could not plan query")
    }

    #[test]
    fn collects_boundary_operations() {
        let supergraph = three_locations();
        let plan = plan(
            &supergraph,
            r#"{ storefront(id: "1") { name products { name manufacturer { products { name } address } } } }"#,
        );

        assert_eq!(plan.ops.len(), 3);

        let first = &plan.ops[0];
        assert_eq!(first.key, 1);
        assert_eq!(first.after_key, None);
        assert_eq!(first.location, "storefronts");
        assert_eq!(first.operation_type, OperationKind::Query);
        assert!(first.insertion_path.is_empty());
        assert_eq!(
            first.selections,
            r#"{ storefront(id: "1") { name products { _STITCH_upc: upc } } }"#,
        );
        assert!(first.boundary.is_none());

        let second = &plan.ops[1];
        assert_eq!(second.key, 2);
        assert_eq!(second.after_key, Some(1));
        assert_eq!(second.location, "products");
        assert_eq!(second.insertion_path, vec!["storefront", "products"]);
        assert_eq!(
            second.selections,
            "{ name manufacturer { products { name } _STITCH_id: id } }",
        );
        let boundary = second.boundary.as_ref().unwrap();
        assert_eq!(boundary.keys, vec!["upc".to_string()]);
        assert!(boundary.list);

        let third = &plan.ops[2];
        assert_eq!(third.key, 3);
        assert_eq!(third.after_key, Some(2));
        assert_eq!(third.location, "manufacturers");
        assert_eq!(
            third.insertion_path,
            vec!["storefront", "products", "manufacturer"],
        );
        assert_eq!(third.selections, "{ address }");
    }

    #[test]
    fn anchored_location_resolves_common_fields() {
        let supergraph = three_locations();
        // upc resolves at the storefronts location itself, so no boundary
        // operation is needed
        let plan = plan(&supergraph, r#"{ storefront(id: "1") { products { upc } } }"#);
        assert_eq!(plan.ops.len(), 1);
        assert_eq!(
            plan.ops[0].selections,
            r#"{ storefront(id: "1") { products { upc } } }"#,
        );
    }

    #[test]
    fn introspection_routes_to_reserved_location() {
        let supergraph = three_locations();
        let plan = plan(
            &supergraph,
            r#"{ __schema { queryType { name } } storefront(id: "1") { name } }"#,
        );

        assert_eq!(plan.ops.len(), 2);
        assert_eq!(plan.ops[0].location, SUPERGRAPH_LOCATION);
        assert_eq!(
            plan.ops[0].selections,
            "{ __schema { queryType { name } } }",
        );
        assert_eq!(plan.ops[1].location, "storefronts");
        assert_eq!(plan.ops[1].selections, r#"{ storefront(id: "1") { name } }"#);
    }

    #[test]
    fn variables_redeclare_on_the_operations_using_them() {
        let supergraph = three_locations();
        let query = Query::parse(
            r#"query($id: ID!) { storefront(id: $id) { products { name } } }"#,
            supergraph.schema(),
        )
        .unwrap();
        let plan = Planner::new(&supergraph, &query, None)
            .unwrap()
            .plan()
            .unwrap();

        assert_eq!(plan.ops.len(), 2);
        assert_eq!(plan.ops[0].variables.get("id").map(String::as_str), Some("ID!"));
        assert!(plan.ops[1].variables.is_empty());
    }

    #[test]
    fn mutations_chain_in_document_order() {
        let schema: Schema = r#"
        type Query { noop: Boolean }
        type Mutation { addProduct(name: String!): Boolean removeStorefront(id: ID!): Boolean addStorefront(name: String!): Boolean }
        "#
        .parse()
        .unwrap();

        let mut fields = HashMap::new();
        fields.insert(
            "Mutation".to_string(),
            IndexMap::from([
                ("addProduct".to_string(), vec!["products".to_string()]),
                ("removeStorefront".to_string(), vec!["storefronts".to_string()]),
                ("addStorefront".to_string(), vec!["storefronts".to_string()]),
            ]),
        );
        let supergraph = Supergraph::new(schema, fields, HashMap::new());

        let query = Query::parse(
            r#"mutation { addProduct(name: "p") removeStorefront(id: "1") addStorefront(name: "s") }"#,
            supergraph.schema(),
        )
        .unwrap();
        let plan = Planner::new(&supergraph, &query, None)
            .unwrap()
            .plan()
            .unwrap();

        assert_eq!(plan.ops.len(), 2);
        assert_eq!(plan.ops[0].location, "products");
        assert_eq!(plan.ops[0].operation_type, OperationKind::Mutation);
        assert_eq!(plan.ops[0].after_key, None);
        assert_eq!(plan.ops[1].location, "storefronts");
        assert_eq!(plan.ops[1].after_key, Some(plan.ops[0].key));
        assert_eq!(
            plan.ops[1].selections,
            r#"{ removeStorefront(id: "1") addStorefront(name: "s") }"#,
        );
    }

    fn abstract_supergraph() -> Supergraph {
        let schema: Schema = r#"
        type Query { node(id: ID!): Node }
        interface Node { id: ID! }
        type Product implements Node { id: ID! name: String price: Float }
        type Storefront implements Node { id: ID! name: String }
        "#
        .parse()
        .unwrap();

        let mut fields = HashMap::new();
        fields.insert(
            "Query".to_string(),
            IndexMap::from([("node".to_string(), vec!["catalog".to_string()])]),
        );
        fields.insert(
            "Node".to_string(),
            IndexMap::from([("id".to_string(), vec!["catalog".to_string()])]),
        );
        fields.insert(
            "Product".to_string(),
            IndexMap::from([
                ("id".to_string(), vec!["catalog".to_string(), "pricing".to_string()]),
                ("name".to_string(), vec!["catalog".to_string()]),
                ("price".to_string(), vec!["pricing".to_string()]),
            ]),
        );
        fields.insert(
            "Storefront".to_string(),
            IndexMap::from([
                ("id".to_string(), vec!["catalog".to_string()]),
                ("name".to_string(), vec!["catalog".to_string()]),
            ]),
        );

        let mut boundaries = HashMap::new();
        boundaries.insert(
            "Product".to_string(),
            vec![Boundary {
                location: "pricing".to_string(),
                type_name: "Product".to_string(),
                keys: vec!["id".to_string()],
                field: "productById".to_string(),
                args: vec!["id".to_string()],
                list: false,
                federation: None,
            }],
        );

        Supergraph::new(schema, fields, boundaries)
    }

    #[test]
    fn fragments_narrow_spawned_operations() {
        let supergraph = abstract_supergraph();
        let plan = plan(
            &supergraph,
            r#"{ node(id: "1") { ... on Product { name price } } }"#,
        );

        assert_eq!(plan.ops.len(), 2);
        assert_eq!(
            plan.ops[0].selections,
            r#"{ node(id: "1") { ... on Product { name _STITCH_id: id _STITCH_typename: __typename } } }"#,
        );
        let second = &plan.ops[1];
        assert_eq!(second.location, "pricing");
        assert_eq!(second.type_condition.as_deref(), Some("Product"));
        assert_eq!(second.insertion_path, vec!["node"]);
        assert_eq!(second.selections, "{ price }");
    }

    fn composite_key_supergraph() -> Supergraph {
        let schema: Schema = r#"
        type Product { id: ID! shopId: ID! handle: String! location: String! name: String! }
        type Query {
            storefrontsProductById(id: ID!): Product!
            productsProductByCompositeKey(shopId: ID!, handle: String!): Product!
        }
        "#
        .parse()
        .expect("fixture schema is valid");

        let locations = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut fields = HashMap::new();
        fields.insert(
            "Product".to_string(),
            IndexMap::from([
                ("id".to_string(), locations(&["storefronts"])),
                ("shopId".to_string(), locations(&["storefronts"])),
                ("handle".to_string(), locations(&["storefronts"])),
                ("location".to_string(), locations(&["storefronts"])),
                ("name".to_string(), locations(&["products"])),
            ]),
        );
        fields.insert(
            "Query".to_string(),
            IndexMap::from([
                ("storefrontsProductById".to_string(), locations(&["storefronts"])),
                (
                    "productsProductByCompositeKey".to_string(),
                    locations(&["products"]),
                ),
            ]),
        );

        let mut boundaries = HashMap::new();
        boundaries.insert(
            "Product".to_string(),
            vec![
                Boundary {
                    location: "storefronts".to_string(),
                    type_name: "Product".to_string(),
                    keys: vec!["id".to_string()],
                    field: "storefrontsProductById".to_string(),
                    args: vec!["id".to_string()],
                    list: false,
                    federation: None,
                },
                Boundary {
                    location: "products".to_string(),
                    type_name: "Product".to_string(),
                    keys: vec!["shopId".to_string(), "handle".to_string()],
                    field: "productsProductByCompositeKey".to_string(),
                    args: vec!["shopId".to_string(), "handle".to_string()],
                    list: false,
                    federation: None,
                },
            ],
        );

        Supergraph::new(schema, fields, boundaries)
    }

    #[test]
    fn composite_keys_emit_every_member_alias() {
        let supergraph = composite_key_supergraph();
        let plan = plan(
            &supergraph,
            r#"{ storefrontsProductById(id: "1") { location name } }"#,
        );

        assert_eq!(plan.ops.len(), 2);
        assert_eq!(
            plan.ops[0].selections,
            r#"{ storefrontsProductById(id: "1") { location _STITCH_shopId: shopId _STITCH_handle: handle } }"#,
        );

        let second = &plan.ops[1];
        assert_eq!(second.location, "products");
        assert_eq!(second.selections, "{ name }");
        assert_eq!(second.insertion_path, vec!["storefrontsProductById"]);
        let boundary = second.boundary.as_ref().unwrap();
        assert_eq!(
            boundary.keys,
            vec!["shopId".to_string(), "handle".to_string()],
        );
    }
}
