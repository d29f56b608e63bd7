use std::sync::Arc;

use bytes::Bytes;

pub type ObjectMap = ahash::AHashMap<Arc<str>, Value>;
pub type MapMap = ahash::AHashMap<MapKey, Value>;

/// Key of a protobuf `map<..>` entry. Protobuf restricts map keys to
/// booleans, integers, and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Bool(bool),
    I64(i64),
    U64(u64),
    String(Arc<str>),
}

/// Schema-free value tree used to describe request payloads before they are
/// bound to a message descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(Arc<str>),
    Bytes(Bytes),
    Array(Vec<Value>),
    Object(ObjectMap),
    Map(MapMap),
}

impl Value {
    /// Builds an object value from `(field name, value)` pairs.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut map = ObjectMap::default();
        for (k, v) in fields {
            map.insert(k.into(), v);
        }
        Self::Object(map)
    }

    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::String(Arc::from(s))
    }
}
