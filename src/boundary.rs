use serde::{Deserialize, Serialize};

/// A boundary describes how a location can resolve an entity type from keys
/// owned by another location: a root field that accepts key values and
/// returns the keyed objects.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boundary {
    /// The location that provides this entry point.
    pub location: String,

    /// The entity type this boundary resolves.
    pub type_name: String,

    /// The key fields selected on origin objects to join on, in argument
    /// order. Composite keys list every member field.
    pub keys: Vec<String>,

    /// The root field to query at the boundary location.
    pub field: String,

    /// The arguments of `field` that receive key values, aligned with
    /// `keys`: argument `i` receives the value of key `i`.
    pub args: Vec<String>,

    /// Whether `field` accepts a list of keys and returns a matching list.
    #[serde(default)]
    pub list: bool,

    /// Marks boundaries imported from federation `_entities` style SDL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation: Option<bool>,
}

impl Boundary {
    /// The internal aliases under which the key fields are fetched on origin
    /// objects, aligned with `keys`.
    pub fn key_aliases(&self) -> Vec<String> {
        self.keys
            .iter()
            .map(|key| format!("_STITCH_{}", key))
            .collect()
    }

    /// Whether boundary documents batch all origin keys into one list-valued
    /// call. Composite keys always fan out one call per origin object.
    pub fn batches_keys(&self) -> bool {
        self.list && self.keys.len() == 1
    }
}
