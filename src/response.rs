use crate::prelude::graphql::*;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// A graphql response.
/// Used for client responses and location sub-responses alike.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(setter(into)))]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "skip_data_if", default)]
    #[builder(default = Value::Object(Default::default()))]
    pub data: Value,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    #[builder(default)]
    pub errors: Vec<Error>,
}

fn skip_data_if(value: &Value) -> bool {
    match value {
        Value::Object(o) => o.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

impl Response {
    /// Decode a location response body, mapping failures to [`FetchError`].
    pub fn from_slice(location: &str, body: &[u8]) -> Result<Response, FetchError> {
        serde_json::from_slice(body).map_err(|error| FetchError::SubrequestMalformedResponse {
            location: location.to_string(),
            reason: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_log::test;

    #[test]
    fn test_response_deserialization() {
        let response = Response::from_slice(
            "products",
            json!({
                "data": {"me": {"name": "ada"}},
                "errors": [{
                    "message": "gone",
                    "path": ["me", "friends", 1, "name"],
                    "locations": [{"line": 1, "column": 3}]
                }]
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        assert_eq!(response.data, json!({"me": {"name": "ada"}}));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(
            response.errors[0].path,
            Some(Path::from("me/friends/1/name")),
        );
        assert_eq!(
            response.errors[0].locations,
            vec![Location { line: 1, column: 3 }],
        );
    }

    #[test]
    fn test_response_serialization_skips_empty() {
        let response = Response::builder().build();
        assert_eq!(serde_json::to_string(&response).unwrap(), "{}");
    }
}
