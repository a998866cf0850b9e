use serde::{Deserialize, Serialize};
use std::fmt;

/// A JSON value.
pub type Value = serde_json::Value;

/// A JSON object.
pub type Object = serde_json::Map<String, Value>;

/// Extension trait for [`serde_json::Value`].
pub trait ValueExt {
    /// Deep merge the given value into `self`.
    ///
    /// Objects merge key by key, arrays merge element by element, `null`
    /// never overwrites existing content.
    fn deep_merge(&mut self, other: Value);

    /// Get a reference to the value at the given path, if it exists.
    fn get_path(&self, path: &Path) -> Option<&Value>;

    /// Get a mutable reference to the value at the given path, if it exists.
    fn get_path_mut(&mut self, path: &Path) -> Option<&mut Value>;
}

impl ValueExt for Value {
    fn deep_merge(&mut self, other: Value) {
        match (&mut *self, other) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, value) in b {
                    match a.get_mut(&key) {
                        Some(entry) => entry.deep_merge(value),
                        None => {
                            a.insert(key, value);
                        }
                    }
                }
            }
            (Value::Array(a), Value::Array(b)) => {
                for (i, value) in b.into_iter().enumerate() {
                    match a.get_mut(i) {
                        Some(entry) => entry.deep_merge(value),
                        None => a.push(value),
                    }
                }
            }
            (_, Value::Null) => {}
            (Value::Null, b) => {
                *self = b;
            }
            (a, b) => {
                if *a != b {
                    failfast_debug!("value mismatch during merge: {:?} / {:?}", a, b);
                }
                *a = b;
            }
        }
    }

    fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for element in path.iter() {
            current = match element {
                PathElement::Key(key) => current.as_object()?.get(key)?,
                PathElement::Index(i) => current.as_array()?.get(*i)?,
            };
        }
        Some(current)
    }

    fn get_path_mut(&mut self, path: &Path) -> Option<&mut Value> {
        let mut current = self;
        for element in path.iter() {
            current = match element {
                PathElement::Key(key) => current.as_object_mut()?.get_mut(key)?,
                PathElement::Index(i) => current.as_array_mut()?.get_mut(*i)?,
            };
        }
        Some(current)
    }
}

/// One element of a [`Path`] into a JSON tree.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index into an array.
    Index(usize),

    /// A key into an object.
    Key(String),
}

/// A path into the result data, as found in GraphQL error paths.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Self {
        Self(Default::default())
    }

    pub fn from_keys<I, T>(keys: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self(
            keys.into_iter()
                .map(|k| PathElement::Key(k.into()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element);
    }

    /// Returns a new path with `other` appended to `self`.
    pub fn join(&self, other: impl IntoIterator<Item = PathElement>) -> Self {
        let mut elements = self.0.clone();
        elements.extend(other);
        Self(elements)
    }

    pub fn child_key(&self, key: &str) -> Self {
        let mut path = self.clone();
        path.push(PathElement::Key(key.to_string()));
        path
    }

    pub fn child_index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.push(PathElement::Index(index));
        path
    }
}

impl IntoIterator for Path {
    type Item = PathElement;
    type IntoIter = std::vec::IntoIter<PathElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self(
            s.split('/')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    if let Ok(index) = part.parse::<usize>() {
                        PathElement::Index(index)
                    } else {
                        PathElement::Key(part.to_string())
                    }
                })
                .collect(),
        )
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/")?;
            match element {
                PathElement::Key(key) => write!(f, "{}", key)?,
                PathElement::Index(index) => write!(f, "{}", index)?,
            }
        }
        Ok(())
    }
}
