use async_trait::async_trait;
use graphql_stitch::prelude::graphql::*;
use graphql_stitch::prelude::Executable;
use indexmap::IndexMap;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A location answering from canned responses matched by document
/// substring, recording every request it receives.
struct MockLocation {
    canned: Vec<(&'static str, Value)>,
    calls: Mutex<Vec<(String, Object)>>,
}

impl MockLocation {
    fn new(canned: Vec<(&'static str, Value)>) -> Arc<Self> {
        Arc::new(Self {
            canned,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, Object)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executable for MockLocation {
    async fn execute(&self, document: &str, variables: Object) -> Result<Response, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((document.to_string(), variables));
        let body = self
            .canned
            .iter()
            .find(|(marker, _)| document.contains(marker))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| FetchError::SubrequestHttpError {
                location: "mock".to_string(),
                reason: format!("unexpected document: {}", document),
            })?;
        serde_json::from_value(body).map_err(|err| FetchError::SubrequestMalformedResponse {
            location: "mock".to_string(),
            reason: err.to_string(),
        })
    }
}

fn locations(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// The storefronts / products / manufacturers composition: each type's
/// fields are spread across locations and joined through boundaries.
fn three_location_supergraph() -> Supergraph {
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
    .expect("fixture schema is valid");

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

#[tokio::test]
async fn stitches_across_three_locations() {
    let storefronts = MockLocation::new(vec![(
        "storefront(id:",
        json!({
            "data": {
                "storefront": {
                    "name": "eShoppe",
                    "products": [{"_STITCH_upc": "1"}, {"_STITCH_upc": "2"}],
                },
            },
        }),
    )]);
    let products = MockLocation::new(vec![(
        "_2_result",
        json!({
            "data": {
                "_2_result": [
                    {
                        "name": "iPhone",
                        "price": 699.99,
                        "manufacturer": {"_STITCH_id": "apple"},
                    },
                    {
                        "name": "Apple Watch",
                        "price": 399.99,
                        "manufacturer": {"_STITCH_id": "apple"},
                    },
                ],
            },
        }),
    )]);
    let manufacturers = MockLocation::new(vec![(
        "_3_0_result",
        json!({
            "data": {
                "_3_0_result": {"name": "Apple", "address": "Cupertino"},
                "_3_1_result": {"name": "Apple", "address": "Cupertino"},
            },
        }),
    )]);

    let mut supergraph = three_location_supergraph();
    supergraph.assign_executable("storefronts", storefronts.clone());
    supergraph.assign_executable("products", products.clone());
    supergraph.assign_executable("manufacturers", manufacturers.clone());

    let gateway = Gateway::new(supergraph, ExecutionOptions::builder().nonblocking(true).build());
    let response = gateway
        .execute(
            Request::builder()
                .query(
                    r#"{
                        storefront(id: "1") {
                            name
                            products { name price manufacturer { name address } }
                        }
                    }"#
                    .to_string(),
                )
                .build(),
        )
        .await;

    assert!(response.errors.is_empty(), "errors: {:?}", response.errors);
    assert_eq!(
        response.data,
        json!({
            "storefront": {
                "name": "eShoppe",
                "products": [
                    {
                        "name": "iPhone",
                        "price": 699.99,
                        "manufacturer": {"name": "Apple", "address": "Cupertino"},
                    },
                    {
                        "name": "Apple Watch",
                        "price": 399.99,
                        "manufacturer": {"name": "Apple", "address": "Cupertino"},
                    },
                ],
            },
        }),
    );

    // products was asked for both keys in one batch
    let product_calls = products.calls();
    assert_eq!(product_calls.len(), 1);
    assert!(product_calls[0]
        .0
        .contains(r#"_2_result: products(upcs: ["1","2"])"#));

    // the singular manufacturer boundary fans out per origin object
    let manufacturer_calls = manufacturers.calls();
    assert_eq!(manufacturer_calls.len(), 1);
    assert!(manufacturer_calls[0]
        .0
        .contains(r#"_3_0_result: manufacturer(id: "apple")"#));
    assert!(manufacturer_calls[0]
        .0
        .contains(r#"_3_1_result: manufacturer(id: "apple")"#));
}

/// Two locations joined through a conjunctive two-field key: the products
/// location can only resolve a Product given both its shopId and handle.
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
            (
                "storefrontsProductById".to_string(),
                locations(&["storefronts"]),
            ),
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

#[tokio::test]
async fn stitches_through_composite_keys() {
    let storefronts = MockLocation::new(vec![(
        "storefrontsProductById",
        json!({
            "data": {
                "result": {
                    "location": "Toronto",
                    "_STITCH_shopId": "123",
                    "_STITCH_handle": "iphone",
                },
            },
        }),
    )]);
    let products = MockLocation::new(vec![(
        "_2_0_result",
        json!({
            "data": {"_2_0_result": {"name": "iPhone"}},
        }),
    )]);

    let mut supergraph = composite_key_supergraph();
    supergraph.assign_executable("storefronts", storefronts.clone());
    supergraph.assign_executable("products", products.clone());

    let gateway = Gateway::new(supergraph, ExecutionOptions::default());
    let response = gateway
        .execute(
            Request::builder()
                .query(
                    r#"{ result: storefrontsProductById(id: "1") { location name } }"#.to_string(),
                )
                .build(),
        )
        .await;

    assert!(response.errors.is_empty(), "errors: {:?}", response.errors);
    assert_eq!(
        response.data,
        json!({"result": {"location": "Toronto", "name": "iPhone"}}),
    );

    // every key member travels as its own argument
    let product_calls = products.calls();
    assert_eq!(product_calls.len(), 1);
    assert!(product_calls[0].0.contains(
        r#"_2_0_result: productsProductByCompositeKey(shopId: "123", handle: "iphone") { name }"#,
    ));
}

#[tokio::test]
async fn forwards_variables_to_the_locations_using_them() {
    let storefronts = MockLocation::new(vec![(
        "storefront(id: $id)",
        json!({"data": {"storefront": {"name": "eShoppe"}}}),
    )]);

    let mut supergraph = three_location_supergraph();
    supergraph.assign_executable("storefronts", storefronts.clone());

    let gateway = Gateway::new(supergraph, ExecutionOptions::default());
    let response = gateway
        .execute(
            Request::builder()
                .query("query Shop($id: ID!) { storefront(id: $id) { name } }".to_string())
                .operation_name("Shop".to_string())
                .variables(Arc::new(json!({"id": "1"}).as_object().unwrap().clone()))
                .build(),
        )
        .await;

    assert!(response.errors.is_empty(), "errors: {:?}", response.errors);
    assert_eq!(response.data, json!({"storefront": {"name": "eShoppe"}}));

    let calls = storefronts.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].0,
        "query($id: ID!) { storefront(id: $id) { name } }",
    );
    assert_eq!(Value::Object(calls[0].1.clone()), json!({"id": "1"}));
}

#[tokio::test]
async fn location_errors_surface_with_client_paths() {
    let storefronts = MockLocation::new(vec![(
        "storefront(id:",
        json!({
            "data": {
                "storefront": {
                    "name": "eShoppe",
                    "products": [{"_STITCH_upc": "1"}],
                },
            },
        }),
    )]);
    let products = MockLocation::new(vec![(
        "_2_result",
        json!({
            "data": {"_2_result": [null]},
            "errors": [{
                "message": "upc 1 is gone",
                "path": ["_2_result", 0],
                "locations": [{"line": 1, "column": 9}],
            }],
        }),
    )]);

    let mut supergraph = three_location_supergraph();
    supergraph.assign_executable("storefronts", storefronts);
    supergraph.assign_executable("products", products);

    let gateway = Gateway::new(supergraph, ExecutionOptions::default());
    let response = gateway
        .execute(
            Request::builder()
                .query(r#"{ storefront(id: "1") { name products { name price } } }"#.to_string())
                .build(),
        )
        .await;

    let gone = response
        .errors
        .iter()
        .find(|error| error.message == "upc 1 is gone")
        .expect("location error is forwarded");
    assert_eq!(gone.path, Some(Path::from("storefront/products/0")));
    assert!(gone.locations.is_empty());
}

#[tokio::test]
async fn missing_location_executables_fail_validation() {
    let supergraph = three_location_supergraph();
    let gateway = Gateway::new(supergraph, ExecutionOptions::default());
    let response = gateway
        .execute(
            Request::builder()
                .query(r#"{ storefront(id: "1") { name } }"#.to_string())
                .build(),
        )
        .await;

    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("storefronts"));
}
