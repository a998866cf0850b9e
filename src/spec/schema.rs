use crate::prelude::graphql::*;
use apollo_parser::ast;
use std::collections::{HashMap, HashSet};

/// The merged supergraph schema, parsed once from SDL.
///
/// Keeps the registries needed for planning and shaping: per-type field
/// types, abstract type membership, enums, custom scalars, input object
/// types, and root operation type names.
#[derive(Debug, Default)]
pub struct Schema {
    string: String,
    subtype_map: HashMap<String, HashSet<String>>,
    // objects and interfaces both carry fields, so both live here
    type_fields: HashMap<String, HashMap<String, FieldType>>,
    interfaces: HashSet<String>,
    unions: HashSet<String>,
    pub(crate) custom_scalars: HashSet<String>,
    pub(crate) enums: HashMap<String, HashSet<String>>,
    pub(crate) input_types: HashMap<String, HashMap<String, FieldType>>,
    root_operations: HashMap<OperationKind, String>,
}

impl std::str::FromStr for Schema {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parser = apollo_parser::Parser::new(s);
        let tree = parser.parse();

        {
            let errors = tree.errors().cloned().collect::<Vec<_>>();
            if !errors.is_empty() {
                failfast_debug!("schema parsing error(s): {:?}", errors);
                return Err(SchemaError::Parse(ParseErrors::new(errors.iter())));
            }
        }

        let document = tree.document();
        let mut schema = Schema {
            string: s.to_owned(),
            ..Default::default()
        };

        // the subtype logic of this algorithm is inspired from the npm package graphql:
        // https://github.com/graphql/graphql-js/blob/ac8f0c6b484a0d5dca2dc13c387247f96772580a/src/type/schema.ts#L302-L327
        for definition in document.definitions() {
            macro_rules! implements_interfaces {
                ($definition:expr) => {{
                    let name = $definition
                        .name()
                        .expect("never optional according to spec; qed")
                        .text()
                        .to_string();

                    for key in $definition
                        .implements_interfaces()
                        .iter()
                        .flat_map(|member_types| member_types.named_types().flat_map(|x| x.name()))
                    {
                        let key = key.text().to_string();
                        let set = schema.subtype_map.entry(key).or_default();
                        set.insert(name.clone());
                    }
                }};
            }

            macro_rules! collect_fields {
                ($definition:expr) => {{
                    let name = $definition
                        .name()
                        .expect("never optional according to spec; qed")
                        .text()
                        .to_string();

                    let fields = schema.type_fields.entry(name).or_default();
                    for field in $definition
                        .fields_definition()
                        .iter()
                        .flat_map(|x| x.field_definitions())
                    {
                        let field_name = field
                            .name()
                            .expect("the node Name is not optional in the spec; qed")
                            .text()
                            .to_string();
                        let field_type = FieldType::from(
                            field
                                .ty()
                                .expect("the node Type is not optional in the spec; qed"),
                        );
                        fields.insert(field_name, field_type);
                    }
                }};
            }

            match definition {
                // Spec: https://spec.graphql.org/draft/#ObjectTypeDefinition
                ast::Definition::ObjectTypeDefinition(object) => {
                    implements_interfaces!(object);
                    collect_fields!(object);
                }
                // Spec: https://spec.graphql.org/draft/#sec-Object-Extensions
                ast::Definition::ObjectTypeExtension(object) => {
                    implements_interfaces!(object);
                    collect_fields!(object);
                }
                // Spec: https://spec.graphql.org/draft/#InterfaceTypeDefinition
                ast::Definition::InterfaceTypeDefinition(interface) => {
                    let name = interface
                        .name()
                        .expect("never optional according to spec; qed")
                        .text()
                        .to_string();
                    schema.interfaces.insert(name);
                    implements_interfaces!(interface);
                    collect_fields!(interface);
                }
                // Spec: https://spec.graphql.org/draft/#sec-Interface-Extensions
                ast::Definition::InterfaceTypeExtension(interface) => {
                    implements_interfaces!(interface);
                    collect_fields!(interface);
                }
                // Spec: https://spec.graphql.org/draft/#UnionTypeDefinition
                ast::Definition::UnionTypeDefinition(union) => {
                    schema.collect_union_members(
                        union.name(),
                        union
                            .union_member_types()
                            .iter()
                            .flat_map(|x| x.named_types())
                            .collect(),
                    );
                }
                // Spec: https://spec.graphql.org/draft/#sec-Union-Extensions
                ast::Definition::UnionTypeExtension(union) => {
                    schema.collect_union_members(
                        union.name(),
                        union
                            .union_member_types()
                            .iter()
                            .flat_map(|x| x.named_types())
                            .collect(),
                    );
                }
                // Spec: https://spec.graphql.org/draft/#EnumTypeDefinition
                ast::Definition::EnumTypeDefinition(enum_definition) => {
                    let name = enum_definition
                        .name()
                        .expect("never optional according to spec; qed")
                        .text()
                        .to_string();
                    let values = enum_definition
                        .enum_values_definition()
                        .iter()
                        .flat_map(|x| x.enum_value_definitions())
                        .flat_map(|value| {
                            value
                                .enum_value()
                                .and_then(|x| x.name())
                                .map(|x| x.text().to_string())
                        })
                        .collect();
                    schema.enums.insert(name, values);
                }
                // Spec: https://spec.graphql.org/draft/#ScalarTypeDefinition
                ast::Definition::ScalarTypeDefinition(scalar) => {
                    let name = scalar
                        .name()
                        .expect("never optional according to spec; qed")
                        .text()
                        .to_string();
                    schema.custom_scalars.insert(name);
                }
                // Spec: https://spec.graphql.org/draft/#InputObjectTypeDefinition
                ast::Definition::InputObjectTypeDefinition(input) => {
                    let name = input
                        .name()
                        .expect("never optional according to spec; qed")
                        .text()
                        .to_string();
                    let fields = input
                        .input_fields_definition()
                        .iter()
                        .flat_map(|x| x.input_value_definitions())
                        .map(|value| {
                            let field_name = value
                                .name()
                                .expect("the node Name is not optional in the spec; qed")
                                .text()
                                .to_string();
                            let field_type = FieldType::from(
                                value
                                    .ty()
                                    .expect("the node Type is not optional in the spec; qed"),
                            );
                            (field_name, field_type)
                        })
                        .collect();
                    schema.input_types.insert(name, fields);
                }
                // Spec: https://spec.graphql.org/draft/#sec-Schema
                ast::Definition::SchemaDefinition(schema_definition) => {
                    for root in schema_definition.root_operation_type_definitions() {
                        let kind = root
                            .operation_type()
                            .map(OperationKind::from)
                            .unwrap_or_default();
                        if let Some(name) = root.named_type().and_then(|x| x.name()) {
                            schema
                                .root_operations
                                .insert(kind, name.text().to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(schema)
    }
}

impl Schema {
    pub fn read(path: impl AsRef<std::path::Path>) -> Result<Self, SchemaError> {
        std::fs::read_to_string(path)?.parse()
    }

    pub fn as_str(&self) -> &str {
        &self.string
    }

    pub fn is_subtype(&self, abstract_type: &str, maybe_subtype: &str) -> bool {
        self.subtype_map
            .get(abstract_type)
            .map(|x| x.contains(maybe_subtype))
            .unwrap_or(false)
    }

    /// Whether the named type is an interface or a union.
    pub fn is_abstract(&self, type_name: &str) -> bool {
        self.interfaces.contains(type_name) || self.unions.contains(type_name)
    }

    pub fn is_union(&self, type_name: &str) -> bool {
        self.unions.contains(type_name)
    }

    /// The declared type of a field, if the parent type declares it.
    pub fn field_type(&self, parent_type: &str, field_name: &str) -> Option<&FieldType> {
        self.type_fields.get(parent_type)?.get(field_name)
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.type_fields.contains_key(type_name)
            || self.unions.contains(type_name)
            || self.enums.contains_key(type_name)
            || self.custom_scalars.contains(type_name)
    }

    /// The root operation type name for the given operation kind, honoring an
    /// explicit `schema {}` definition and falling back to the default names.
    pub fn root_operation_name(&self, kind: OperationKind) -> &str {
        self.root_operations
            .get(&kind)
            .map(|name| name.as_str())
            .unwrap_or_else(|| kind.default_type_name())
    }

    fn collect_union_members(&mut self, name: Option<ast::Name>, members: Vec<ast::NamedType>) {
        let key = name
            .expect("never optional according to spec; qed")
            .text()
            .to_string();
        self.unions.insert(key.clone());
        let set = self.subtype_map.entry(key).or_default();
        for member in members.into_iter().flat_map(|x| x.name()) {
            set.insert(member.text().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn is_subtype() {
        let schema: Schema = "union UnionType = Foo | Bar | Baz".parse().unwrap();
        assert!(schema.is_subtype("UnionType", "Foo"));
        assert!(schema.is_subtype("UnionType", "Bar"));
        assert!(schema.is_subtype("UnionType", "Baz"));
        assert!(schema.is_union("UnionType"));
        assert!(schema.is_abstract("UnionType"));

        let schema: Schema = "type ObjectType implements Foo & Bar { id: ID }"
            .parse()
            .unwrap();
        assert!(schema.is_subtype("Foo", "ObjectType"));
        assert!(schema.is_subtype("Bar", "ObjectType"));

        let schema: Schema = "extend union UnionType = Foo | Bar".parse().unwrap();
        assert!(schema.is_subtype("UnionType", "Foo"));
        assert!(schema.is_subtype("UnionType", "Bar"));
    }

    #[test]
    fn field_types() {
        let schema: Schema = r#"
        type Query { me: User }
        type User { id: ID! friends: [User!] name: String }
        interface Node { id: ID! }
        "#
        .parse()
        .unwrap();

        assert_eq!(
            schema.field_type("User", "id"),
            Some(&FieldType::NonNull(Box::new(FieldType::Id))),
        );
        assert_eq!(
            schema.field_type("Query", "me"),
            Some(&FieldType::Named("User".to_string())),
        );
        assert_eq!(schema.field_type("User", "missing"), None);
        assert_eq!(
            schema.field_type("Node", "id"),
            Some(&FieldType::NonNull(Box::new(FieldType::Id))),
        );
        assert!(schema.is_abstract("Node"));
        assert!(!schema.is_abstract("User"));
    }

    #[test]
    fn root_operation_names() {
        let schema: Schema = "type Query { x: Int }".parse().unwrap();
        assert_eq!(schema.root_operation_name(OperationKind::Query), "Query");

        let schema: Schema = r#"
        schema { query: RootQuery mutation: RootMutation }
        type RootQuery { x: Int }
        type RootMutation { y: Int }
        "#
        .parse()
        .unwrap();
        assert_eq!(
            schema.root_operation_name(OperationKind::Query),
            "RootQuery",
        );
        assert_eq!(
            schema.root_operation_name(OperationKind::Mutation),
            "RootMutation",
        );
    }

    #[test]
    fn enums_and_scalars() {
        let schema: Schema = r#"
        scalar Upload
        enum Episode { NEWHOPE EMPIRE JEDI }
        type Query { x: Episode }
        "#
        .parse()
        .unwrap();
        assert!(schema.custom_scalars.contains("Upload"));
        assert!(schema.enums.get("Episode").unwrap().contains("EMPIRE"));
    }
}
