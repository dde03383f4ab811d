//! Writing JSON-shaped values into a CRDT document.
//!
//! Objects become maps, arrays become lists, and everything else becomes a
//! scalar. Strings are stored as plain string scalars, not collaborative text.

use automerge::transaction::Transactable;
use automerge::{AutomergeError, ObjId, ObjType, ROOT, ScalarValue};
use serde_json::Value;

use crate::error::VersoError;

enum Slot<'a> {
    Key(&'a str),
    Index(usize),
}

/// Put `value` under `key` of map object `obj`, creating nested objects as needed.
pub fn put_json<Tx: Transactable>(
    tx: &mut Tx,
    obj: &ObjId,
    key: &str,
    value: &Value,
) -> Result<(), AutomergeError> {
    put_value(tx, obj, Slot::Key(key), value)
}

/// Write every entry of a JSON object into the document root.
///
/// Any other value has no root representation and is rejected with
/// [`VersoError::InvalidPayload`].
pub fn write_json_root<Tx: Transactable>(tx: &mut Tx, value: &Value) -> crate::error::Result<()> {
    let Value::Object(map) = value else {
        return Err(VersoError::InvalidPayload(format!(
            "document root must be a JSON object, got {}",
            json_kind(value)
        )));
    };
    for (key, item) in map {
        put_value(tx, &ROOT, Slot::Key(key), item)?;
    }
    Ok(())
}

fn put_value<Tx: Transactable>(
    tx: &mut Tx,
    obj: &ObjId,
    slot: Slot<'_>,
    value: &Value,
) -> Result<(), AutomergeError> {
    match value {
        Value::Object(map) => {
            let child = put_object(tx, obj, slot, ObjType::Map)?;
            for (key, item) in map {
                put_value(tx, &child, Slot::Key(key), item)?;
            }
        }
        Value::Array(items) => {
            let child = put_object(tx, obj, slot, ObjType::List)?;
            for (index, item) in items.iter().enumerate() {
                put_value(tx, &child, Slot::Index(index), item)?;
            }
        }
        scalar => {
            let scalar = to_scalar(scalar);
            match slot {
                Slot::Key(key) => tx.put(obj, key, scalar)?,
                Slot::Index(index) => tx.insert(obj, index, scalar)?,
            }
        }
    }
    Ok(())
}

fn put_object<Tx: Transactable>(
    tx: &mut Tx,
    obj: &ObjId,
    slot: Slot<'_>,
    kind: ObjType,
) -> Result<ObjId, AutomergeError> {
    match slot {
        Slot::Key(key) => tx.put_object(obj, key, kind),
        Slot::Index(index) => tx.insert_object(obj, index, kind),
    }
}

fn to_scalar(value: &Value) -> ScalarValue {
    match value {
        Value::Bool(b) => ScalarValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ScalarValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                ScalarValue::Uint(u)
            } else {
                ScalarValue::F64(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => ScalarValue::from(s.as_str()),
        _ => ScalarValue::Null,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
