//! The `Model` trait and attribute decoding
//!
//! A model is a plain struct that knows its schema, its identity and how
//! to convert to and from attribute values. Persistence never inspects
//! the struct itself.

use rustc_hash::FxHashMap;
use std::str::FromStr;
use tessera_core::{BoolPolicy, Error, Result, Value};

use crate::schema::Schema;

/// A persistable entity type
///
/// ```
/// use tessera_core::{Result, Value};
/// use tessera_model::{Attributes, Model, Schema};
///
/// #[derive(Debug, Default)]
/// struct Tag {
///     id: Option<u64>,
///     label: String,
/// }
///
/// impl Model for Tag {
///     const NAME: &'static str = "Tag";
///
///     fn schema() -> Schema {
///         Schema::new(Self::NAME).unique("label")
///     }
///     fn id(&self) -> Option<u64> {
///         self.id
///     }
///     fn set_id(&mut self, id: u64) {
///         self.id = Some(id);
///     }
///     fn to_attributes(&self) -> Vec<(String, Value)> {
///         vec![("label".into(), self.label.clone().into())]
///     }
///     fn from_attributes(id: u64, attributes: Attributes) -> Result<Self> {
///         Ok(Tag { id: Some(id), label: attributes.required("label")? })
///     }
/// }
/// ```
pub trait Model: Sized {
    /// Type name; the root of every key the type owns
    const NAME: &'static str;

    /// Declarations for this type
    fn schema() -> Schema;

    /// Identity, once saved
    fn id(&self) -> Option<u64>;

    /// Record the identity assigned by a save
    fn set_id(&mut self, id: u64);

    /// Complete attribute set; `Value::Null` leaves the attribute unset
    fn to_attributes(&self) -> Vec<(String, Value)>;

    /// Rebuild from a stored hash
    fn from_attributes(id: u64, attributes: Attributes) -> Result<Self>;
}

/// Stored attributes of one entity, as strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    values: FxHashMap<String, String>,
}

impl Attributes {
    /// Wrap stored pairs
    pub fn new<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            values: pairs.into_iter().collect(),
        }
    }

    /// Raw value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Owned value, if present
    pub fn string(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    /// Owned value; absence is a decode error
    pub fn required(&self, name: &str) -> Result<String> {
        self.string(name)
            .ok_or_else(|| Error::decode(format!("missing attribute '{}'", name)))
    }

    /// Parsed value, if present
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    Error::decode(format!("attribute '{}' = '{}': {}", name, raw, e))
                })
            })
            .transpose()
    }

    /// Boolean value; absent reads as `false`, matching `false_booleans = "omit"`
    pub fn flag(&self, name: &str) -> Result<bool> {
        Ok(self.parse::<bool>(name)?.unwrap_or(false))
    }

    /// Number of stored attributes
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate stored pairs (unordered)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Encode a model's attributes for the save protocol
///
/// Rejects attributes the schema does not declare; drops `Null` (and
/// `false` under [`BoolPolicy::OmitFalse`]).
pub(crate) fn encode_attributes<M: Model>(
    schema: &Schema,
    model: &M,
    policy: BoolPolicy,
) -> Result<Vec<(String, String)>> {
    let mut encoded = Vec::new();
    for (name, value) in model.to_attributes() {
        if !schema.is_declared(&name) {
            return Err(Error::invalid_input(format!(
                "{} has no attribute '{}'",
                schema.name(),
                name
            )));
        }
        if let Some(stored) = value.encode(policy) {
            encoded.push((name, stored));
        }
    }
    Ok(encoded)
}
