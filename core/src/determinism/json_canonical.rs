use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Bytes hashed for every catalog entry and intake event: compact UTF-8
/// JSON with object keys sorted and integer-only numbers.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let v = canonicalize(serde_json::to_value(value)?)?;
    Ok(serde_json::to_vec(&v)?)
}

fn canonicalize(v: Value) -> CoreResult<Value> {
    Ok(match v {
        Value::Object(map) => {
            let sorted = map
                .into_iter()
                .map(|(k, vv)| Ok((k, canonicalize(vv)?)))
                .collect::<CoreResult<BTreeMap<String, Value>>>()?;
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(canonicalize)
                .collect::<CoreResult<Vec<_>>>()?,
        ),
        Value::Number(n) if n.is_f64() => {
            return Err(CoreError::DeterminismViolation(format!(
                "canonical JSON forbids non-integer number {}",
                n
            )))
        }
        other => other,
    })
}
