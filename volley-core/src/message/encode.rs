use std::collections::HashMap;

use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MessageDescriptor};

use crate::value::{MapKey, Value};

type Result<T> = std::result::Result<T, String>;

/// Binds a value tree to a message descriptor.
///
/// Strict by design: unknown fields and shape mismatches are errors, because
/// a template that does not match the schema is a configuration bug and the
/// run must abort rather than silently send partial payloads.
pub(super) fn to_message(desc: &MessageDescriptor, value: &Value) -> Result<DynamicMessage> {
    let fields = match value {
        Value::Object(map) => map,
        Value::Null => {
            // An explicit null yields the empty message.
            return Ok(DynamicMessage::new(desc.clone()));
        }
        _ => return Err(format!("message {} must be an object", desc.full_name())),
    };

    let mut msg = DynamicMessage::new(desc.clone());
    for (field_name, v) in fields {
        let Some(field) = desc.get_field_by_name(field_name) else {
            return Err(format!(
                "unknown field '{field_name}' for message {}",
                desc.full_name()
            ));
        };

        msg.set_field(&field, field_value(&field, v)?);
    }

    Ok(msg)
}

fn field_value(field: &FieldDescriptor, value: &Value) -> Result<prost_reflect::Value> {
    if field.is_map() {
        return map_value(field, value);
    }

    if field.is_list() {
        let Value::Array(items) = value else {
            return Err(format!("field '{}' must be an array", field.name()));
        };

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(scalar_value(field, field.kind(), item)?);
        }
        return Ok(prost_reflect::Value::List(out));
    }

    scalar_value(field, field.kind(), value)
}

fn map_value(field: &FieldDescriptor, value: &Value) -> Result<prost_reflect::Value> {
    let Kind::Message(entry_desc) = field.kind() else {
        return Err(format!("field '{}' is not a map", field.name()));
    };

    let key_kind = entry_desc
        .get_field_by_name("key")
        .ok_or_else(|| format!("invalid map entry for '{}': missing key", field.name()))?
        .kind();
    let value_field = entry_desc
        .get_field_by_name("value")
        .ok_or_else(|| format!("invalid map entry for '{}': missing value", field.name()))?;

    let entries: Vec<(MapKey, &Value)> = match value {
        Value::Object(m) => m
            .iter()
            .map(|(k, v)| (MapKey::String(k.clone()), v))
            .collect(),
        Value::Map(m) => m.iter().map(|(k, v)| (k.clone(), v)).collect(),
        _ => return Err(format!("field '{}' must be a map/object", field.name())),
    };

    let mut out: HashMap<prost_reflect::MapKey, prost_reflect::Value> =
        HashMap::with_capacity(entries.len());
    for (k, v) in entries {
        out.insert(
            map_key(&key_kind, &k, field.name())?,
            scalar_value(&value_field, value_field.kind(), v)?,
        );
    }

    Ok(prost_reflect::Value::Map(out))
}

fn map_key(kind: &Kind, key: &MapKey, field: &str) -> Result<prost_reflect::MapKey> {
    Ok(match kind {
        Kind::String => match key {
            MapKey::String(s) => prost_reflect::MapKey::String(s.to_string()),
            _ => return Err(format!("map key for '{field}' must be a string")),
        },
        Kind::Bool => match key {
            MapKey::Bool(b) => prost_reflect::MapKey::Bool(*b),
            _ => return Err(format!("map key for '{field}' must be a boolean")),
        },
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            prost_reflect::MapKey::I32(map_key_i64(key, field)? as i32)
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            prost_reflect::MapKey::I64(map_key_i64(key, field)?)
        }
        Kind::Uint32 | Kind::Fixed32 => {
            prost_reflect::MapKey::U32(map_key_u64(key, field)? as u32)
        }
        Kind::Uint64 | Kind::Fixed64 => prost_reflect::MapKey::U64(map_key_u64(key, field)?),
        _ => return Err(format!("unsupported map key kind for '{field}'")),
    })
}

fn map_key_i64(key: &MapKey, field: &str) -> Result<i64> {
    match key {
        MapKey::I64(i) => Ok(*i),
        MapKey::U64(u) => i64::try_from(*u)
            .map_err(|_| format!("map key for '{field}' out of int64 range")),
        MapKey::String(s) => s
            .parse::<i64>()
            .map_err(|_| format!("invalid int64 map key for '{field}'")),
        MapKey::Bool(_) => Err(format!("map key for '{field}' must be an integer")),
    }
}

fn map_key_u64(key: &MapKey, field: &str) -> Result<u64> {
    match key {
        MapKey::U64(u) => Ok(*u),
        MapKey::I64(i) => u64::try_from(*i)
            .map_err(|_| format!("map key for '{field}' must be non-negative")),
        MapKey::String(s) => s
            .parse::<u64>()
            .map_err(|_| format!("invalid uint64 map key for '{field}'")),
        MapKey::Bool(_) => Err(format!("map key for '{field}' must be an integer")),
    }
}

fn scalar_value(field: &FieldDescriptor, kind: Kind, value: &Value) -> Result<prost_reflect::Value> {
    use prost_reflect::Value as V;

    Ok(match kind {
        Kind::Bool => match value {
            Value::Bool(b) => V::Bool(*b),
            _ => return Err(mismatch(field, "a boolean")),
        },
        Kind::String => match value {
            Value::String(s) => V::String(s.to_string()),
            Value::I64(i) => V::String(i.to_string()),
            Value::U64(u) => V::String(u.to_string()),
            Value::F64(f) => V::String(f.to_string()),
            _ => return Err(mismatch(field, "a string")),
        },
        Kind::Bytes => match value {
            Value::Bytes(b) => V::Bytes(b.clone()),
            Value::String(s) => V::Bytes(bytes::Bytes::copy_from_slice(s.as_bytes())),
            _ => return Err(mismatch(field, "bytes")),
        },

        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            let n = as_i64(field, value)?;
            V::I32(i32::try_from(n).map_err(|_| range(field, "int32"))?)
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => V::I64(as_i64(field, value)?),
        Kind::Uint32 | Kind::Fixed32 => {
            let n = as_u64(field, value)?;
            V::U32(u32::try_from(n).map_err(|_| range(field, "uint32"))?)
        }
        Kind::Uint64 | Kind::Fixed64 => V::U64(as_u64(field, value)?),

        Kind::Float => V::F32(as_f64(field, value)? as f32),
        Kind::Double => V::F64(as_f64(field, value)?),

        Kind::Enum(enum_desc) => match value {
            Value::String(s) => match enum_desc.get_value_by_name(s.as_ref()) {
                Some(v) => V::EnumNumber(v.number()),
                None => {
                    return Err(format!(
                        "unknown value '{s}' for enum {} in field '{}'",
                        enum_desc.full_name(),
                        field.name()
                    ));
                }
            },
            other => {
                let n = as_i64(field, other)?;
                V::EnumNumber(i32::try_from(n).map_err(|_| range(field, "enum"))?)
            }
        },

        Kind::Message(msg_desc) => V::Message(to_message(&msg_desc, value)?),
    })
}

fn as_i64(field: &FieldDescriptor, value: &Value) -> Result<i64> {
    match value {
        Value::I64(i) => Ok(*i),
        Value::U64(u) => i64::try_from(*u).map_err(|_| range(field, "int64")),
        Value::String(s) => s.parse::<i64>().map_err(|_| mismatch(field, "an integer")),
        _ => Err(mismatch(field, "an integer")),
    }
}

fn as_u64(field: &FieldDescriptor, value: &Value) -> Result<u64> {
    match value {
        Value::U64(u) => Ok(*u),
        Value::I64(i) => u64::try_from(*i).map_err(|_| range(field, "uint64")),
        Value::String(s) => s
            .parse::<u64>()
            .map_err(|_| mismatch(field, "an unsigned integer")),
        _ => Err(mismatch(field, "an unsigned integer")),
    }
}

fn as_f64(field: &FieldDescriptor, value: &Value) -> Result<f64> {
    match value {
        Value::F64(f) => Ok(*f),
        Value::I64(i) => Ok(*i as f64),
        Value::U64(u) => Ok(*u as f64),
        Value::String(s) => s.parse::<f64>().map_err(|_| mismatch(field, "a number")),
        _ => Err(mismatch(field, "a number")),
    }
}

fn mismatch(field: &FieldDescriptor, expected: &str) -> String {
    format!("field '{}' must be {expected}", field.name())
}

fn range(field: &FieldDescriptor, ty: &str) -> String {
    format!("field '{}' is out of {ty} range", field.name())
}
