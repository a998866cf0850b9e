use crate::prelude::graphql::*;

/// Shapes the raw merged tree into the response the client asked for:
/// only requested keys survive (which drops the `_STITCH_` join fields),
/// absent optional fields become explicit nulls, and absent non-null
/// fields invalidate their nearest nullable ancestor.
pub struct Shaper<'a> {
    schema: &'a Schema,
    query: &'a Query,
    operation: &'a Operation,
}

impl<'a> Shaper<'a> {
    pub fn new(supergraph: &'a Supergraph, query: &'a Query, operation: &'a Operation) -> Self {
        Self {
            schema: supergraph.schema(),
            query,
            operation,
        }
    }

    #[tracing::instrument(skip_all, level = "debug")]
    pub fn perform(&self, data: Value) -> (Value, Vec<Error>) {
        let mut errors = Vec::new();
        let root_type = self.schema.root_operation_name(self.operation.kind);

        let input = match data {
            Value::Object(object) => object,
            _ => Object::default(),
        };

        let mut output = Object::default();
        match self.apply_selection_set(
            &self.operation.selection_set,
            root_type,
            &input,
            &mut output,
            &Path::empty(),
            true,
            &mut errors,
        ) {
            Ok(()) => (Value::Object(output), errors),
            Err(InvalidValue) => (Value::Null, errors),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_selection_set(
        &self,
        selections: &[Selection],
        parent_type: &str,
        input: &Object,
        output: &mut Object,
        path: &Path,
        root: bool,
        errors: &mut Vec<Error>,
    ) -> Result<(), InvalidValue> {
        for selection in selections {
            match selection {
                Selection::Field {
                    name,
                    field_type,
                    selection_set,
                    ..
                } => {
                    let key = selection
                        .response_key()
                        .expect("fields always have a response key; qed");

                    if name == "__typename" {
                        // locations answer with their own root type names, so
                        // the client-visible name comes from our schema
                        let value = if root {
                            Value::String(parent_type.to_string())
                        } else {
                            concrete_typename(input)
                                .map(|typename| Value::String(typename.to_string()))
                                .unwrap_or_else(|| Value::String(parent_type.to_string()))
                        };
                        output.insert(key.to_string(), value);
                        continue;
                    }

                    if let FieldType::Introspection(_) = field_type {
                        // introspection sub-trees pass through as fetched
                        output.insert(
                            key.to_string(),
                            input.get(key).cloned().unwrap_or(Value::Null),
                        );
                        continue;
                    }

                    let field_path = path.child_key(key);
                    match self.format_value(
                        field_type,
                        input.get(key),
                        selection_set.as_deref(),
                        &field_path,
                        errors,
                    ) {
                        Ok(value) => {
                            output.insert(key.to_string(), value);
                        }
                        Err(InvalidValue) => {
                            if field_type.is_non_null() {
                                return Err(InvalidValue);
                            }
                            output.insert(key.to_string(), Value::Null);
                        }
                    }
                }
                Selection::InlineFragment { fragment } => {
                    self.apply_fragment(fragment, parent_type, input, output, path, root, errors)?;
                }
                Selection::FragmentSpread { name } => match self.query.fragments.get(name) {
                    Some(fragment) => {
                        self.apply_fragment(
                            fragment,
                            parent_type,
                            input,
                            output,
                            path,
                            root,
                            errors,
                        )?;
                    }
                    None => failfast_debug!("missing fragment named: {}", name),
                },
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_fragment(
        &self,
        fragment: &Fragment,
        parent_type: &str,
        input: &Object,
        output: &mut Object,
        path: &Path,
        root: bool,
        errors: &mut Vec<Error>,
    ) -> Result<(), InvalidValue> {
        let condition = fragment.type_condition.as_str();
        let applies = condition == parent_type
            || self.schema.is_subtype(condition, parent_type)
            || concrete_typename(input)
                .map(|typename| {
                    typename == condition || self.schema.is_subtype(condition, typename)
                })
                .unwrap_or(false);
        if !applies {
            return Ok(());
        }

        // keep the more specific of the two types for nested decisions
        let narrowed = if self.schema.is_subtype(condition, parent_type) {
            parent_type
        } else {
            condition
        };
        self.apply_selection_set(
            &fragment.selection_set,
            narrowed,
            input,
            output,
            path,
            root,
            errors,
        )
    }

    fn format_value(
        &self,
        field_type: &FieldType,
        value: Option<&Value>,
        selection_set: Option<&[Selection]>,
        path: &Path,
        errors: &mut Vec<Error>,
    ) -> Result<Value, InvalidValue> {
        match field_type {
            FieldType::NonNull(inner) => {
                match self.format_value(inner, value, selection_set, path, errors)? {
                    Value::Null => {
                        errors.push(Error {
                            message: "Cannot return null for non-nullable field".to_string(),
                            locations: Vec::new(),
                            path: Some(path.clone()),
                            extensions: Default::default(),
                        });
                        Err(InvalidValue)
                    }
                    value => Ok(value),
                }
            }

            FieldType::List(inner) => match value {
                Some(Value::Array(items)) => Ok(Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            let item_path = path.child_index(i);
                            self.format_value(inner, Some(item), selection_set, &item_path, errors)
                                .unwrap_or(Value::Null)
                        })
                        .collect(),
                )),
                None | Some(Value::Null) => Ok(Value::Null),
                Some(other) => {
                    failfast_debug!("expected a list at {}, got: {:?}", path, other);
                    Ok(Value::Null)
                }
            },

            FieldType::Named(type_name) => match (value, selection_set) {
                (None | Some(Value::Null), _) => Ok(Value::Null),
                // enums and custom scalars have no sub-selections
                (Some(value), None) => Ok(value.clone()),
                (Some(Value::Object(input)), Some(selections)) => {
                    let concrete = if self.schema.is_abstract(type_name) {
                        concrete_typename(input).unwrap_or(type_name)
                    } else {
                        type_name
                    };
                    let mut output = Object::default();
                    self.apply_selection_set(
                        selections, concrete, input, &mut output, path, false, errors,
                    )?;
                    Ok(Value::Object(output))
                }
                (Some(other), Some(_)) => {
                    failfast_debug!("expected an object at {}, got: {:?}", path, other);
                    Ok(Value::Null)
                }
            },

            FieldType::Introspection(_) => Ok(value.cloned().unwrap_or(Value::Null)),

            scalar => {
                let value = value.cloned().unwrap_or(Value::Null);
                if value.is_null() || scalar.validate_value(&value, self.schema).is_ok() {
                    Ok(value)
                } else {
                    failfast_debug!("scalar mismatch at {}: {:?}", path, value);
                    Ok(Value::Null)
                }
            }
        }
    }
}

/// The concrete type of a fetched object, preferring the planner-injected
/// alias over a client-requested `__typename`.
fn concrete_typename(input: &Object) -> Option<&str> {
    input
        .get("_STITCH_typename")
        .or_else(|| input.get("__typename"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use test_log::test;

    fn supergraph() -> Supergraph {
        let schema: Schema = r#"
        type Query { product: Product products: [Product] node: Node }
        interface Node { id: ID! }
        type Product implements Node { id: ID! name: String! price: Float manufacturer: Manufacturer }
        type Manufacturer implements Node { id: ID! name: String }
        "#
        .parse()
        .unwrap();
        Supergraph::new(schema, HashMap::new(), HashMap::new())
    }

    fn shape(supergraph: &Supergraph, document: &str, data: Value) -> (Value, Vec<Error>) {
        let query = Query::parse(document, supergraph.schema()).expect("could not parse query");
        let operation = query.operation(None).expect("no operation");
        Shaper::new(supergraph, &query, operation).perform(data)
    }

    #[test]
    fn prunes_join_keys_and_fills_missing_optionals() {
        let supergraph = supergraph();
        let (data, errors) = shape(
            &supergraph,
            "{ product { name price } }",
            json!({"product": {"name": "widget", "_STITCH_id": "1"}}),
        );
        assert!(errors.is_empty());
        assert_eq!(data, json!({"product": {"name": "widget", "price": null}}));
    }

    #[test]
    fn missing_non_null_nulls_nearest_nullable_parent() {
        let supergraph = supergraph();
        let (data, errors) = shape(
            &supergraph,
            "{ product { name price } }",
            json!({"product": {"price": 9.99, "_STITCH_id": "1"}}),
        );
        assert_eq!(data, json!({"product": null}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, Some(Path::from("product/name")));
    }

    #[test]
    fn list_elements_shape_independently() {
        let supergraph = supergraph();
        let (data, errors) = shape(
            &supergraph,
            "{ products { name } }",
            json!({"products": [{"name": "a"}, {"_STITCH_id": "x"}]}),
        );
        assert_eq!(data, json!({"products": [{"name": "a"}, null]}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, Some(Path::from("products/1/name")));
    }

    #[test]
    fn root_typename_uses_client_schema_names() {
        let supergraph = supergraph();
        let (data, errors) = shape(
            &supergraph,
            "{ __typename product { name __typename } }",
            json!({"product": {"name": "widget"}}),
        );
        assert!(errors.is_empty());
        assert_eq!(
            data,
            json!({"__typename": "Query", "product": {"name": "widget", "__typename": "Product"}}),
        );
    }

    #[test]
    fn fragments_apply_by_concrete_typename() {
        let supergraph = supergraph();

        let (data, errors) = shape(
            &supergraph,
            "{ node { ... on Product { name } } }",
            json!({"node": {"_STITCH_typename": "Product", "_STITCH_id": "1", "name": "widget"}}),
        );
        assert!(errors.is_empty());
        assert_eq!(data, json!({"node": {"name": "widget"}}));

        let (data, errors) = shape(
            &supergraph,
            "{ node { ... on Product { name } } }",
            json!({"node": {"_STITCH_typename": "Manufacturer", "name": "acme"}}),
        );
        assert!(errors.is_empty());
        assert_eq!(data, json!({"node": {}}));
    }

    #[test]
    fn introspection_passes_through_raw() {
        let supergraph = supergraph();
        let raw = json!({"__schema": {"queryType": {"name": "Query"}}});
        let (data, errors) = shape(
            &supergraph,
            "{ __schema { queryType { name } } }",
            raw.clone(),
        );
        assert!(errors.is_empty());
        assert_eq!(data, raw);
    }
}
