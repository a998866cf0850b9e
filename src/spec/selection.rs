use crate::prelude::graphql::*;
use apollo_parser::ast::{self, AstNode};

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field {
        /// The field name as declared in the schema.
        name: String,
        alias: Option<String>,
        /// The argument list in source form, e.g. `(id: "1", limit: $n)`.
        arguments: Option<String>,
        /// Names of the variables referenced by `arguments`, recursively.
        variable_refs: Vec<String>,
        field_type: FieldType,
        selection_set: Option<Vec<Selection>>,
    },
    InlineFragment {
        fragment: Fragment,
    },
    FragmentSpread {
        name: String,
    },
}

impl Selection {
    pub(crate) fn from_ast(
        selection: ast::Selection,
        current_type: &FieldType,
        schema: &Schema,
    ) -> Option<Self> {
        match selection {
            // Spec: https://spec.graphql.org/draft/#Field
            ast::Selection::Field(field) => {
                let name = field
                    .name()
                    .expect("the node Name is not optional in the spec; qed")
                    .text()
                    .to_string();
                let alias = field
                    .alias()
                    .and_then(|x| x.name())
                    .map(|x| x.text().to_string());

                let field_type = match name.as_str() {
                    "__typename" => FieldType::String,
                    "__schema" => FieldType::Introspection("__Schema".to_string()),
                    "__type" => FieldType::Introspection("__Type".to_string()),
                    field_name => {
                        if let FieldType::Introspection(_) = current_type {
                            // introspection sub-trees are passed through untyped
                            FieldType::Introspection(String::new())
                        } else {
                            let parent = current_type.inner_type_name()?;
                            if schema.is_union(parent) {
                                // unions expose no fields of their own
                                failfast_debug!(
                                    "field {} selected directly on union {}",
                                    field_name,
                                    parent,
                                );
                                return None;
                            }
                            schema.field_type(parent, field_name)?.clone()
                        }
                    }
                };

                let mut variable_refs = Vec::new();
                let arguments = field.arguments().map(|args| {
                    let parts = args
                        .arguments()
                        .map(|argument| {
                            let argument_name = argument
                                .name()
                                .expect("the node Name is not optional in the spec; qed")
                                .text()
                                .to_string();
                            let value = argument
                                .value()
                                .expect("the node Value is not optional in the spec; qed");
                            collect_variable_refs(&value, &mut variable_refs);
                            let value_text = value.syntax().text().to_string();
                            format!("{}: {}", argument_name, value_text.trim())
                        })
                        .collect::<Vec<_>>();
                    format!("({})", parts.join(", "))
                });

                let selection_set = if field_type.is_builtin_scalar() {
                    None
                } else {
                    match field.selection_set() {
                        // an unresolvable child rejects the whole document
                        Some(x) => Some(
                            x.selections()
                                .map(|selection| {
                                    Selection::from_ast(selection, &field_type, schema)
                                })
                                .collect::<Option<Vec<_>>>()?,
                        ),
                        None => None,
                    }
                };

                Some(Self::Field {
                    name,
                    alias,
                    arguments,
                    variable_refs,
                    field_type,
                    selection_set,
                })
            }
            // Spec: https://spec.graphql.org/draft/#InlineFragment
            ast::Selection::InlineFragment(inline_fragment) => {
                let type_condition = inline_fragment
                    .type_condition()
                    .expect("inline fragments must specify the type they apply to; qed")
                    .named_type()
                    .expect("inline fragments must specify the type they apply to; qed")
                    .name()
                    .expect("the node Name is not optional in the spec; qed")
                    .text()
                    .to_string();

                let current_type = FieldType::Named(type_condition.clone());

                let selection_set = inline_fragment
                    .selection_set()
                    .expect("the node SelectionSet is not optional in the spec; qed")
                    .selections()
                    .map(|selection| Selection::from_ast(selection, &current_type, schema))
                    .collect::<Option<Vec<_>>>()?;

                Some(Self::InlineFragment {
                    fragment: Fragment {
                        type_condition,
                        selection_set,
                    },
                })
            }
            // Spec: https://spec.graphql.org/draft/#FragmentSpread
            ast::Selection::FragmentSpread(fragment_spread) => {
                let name = fragment_spread
                    .fragment_name()
                    .expect("the node FragmentName is not optional in the spec; qed")
                    .name()
                    .expect("the node Name is not optional in the spec; qed")
                    .text()
                    .to_string();

                Some(Self::FragmentSpread { name })
            }
        }
    }

    /// The key this selection produces in response data.
    pub(crate) fn response_key(&self) -> Option<&str> {
        match self {
            Selection::Field { name, alias, .. } => {
                Some(alias.as_deref().unwrap_or(name.as_str()))
            }
            _ => None,
        }
    }
}

fn collect_variable_refs(value: &ast::Value, refs: &mut Vec<String>) {
    match value {
        ast::Value::Variable(variable) => {
            if let Some(name) = variable.name() {
                let name = name.text().to_string();
                if !refs.contains(&name) {
                    refs.push(name);
                }
            }
        }
        ast::Value::ListValue(list) => {
            for value in list.values() {
                collect_variable_refs(&value, refs);
            }
        }
        ast::Value::ObjectValue(object) => {
            for field in object.object_fields() {
                if let Some(value) = field.value() {
                    collect_variable_refs(&value, refs);
                }
            }
        }
        _ => {}
    }
}
