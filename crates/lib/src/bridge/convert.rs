//! Conversions between node data and Y-CRDT values.
//!
//! Integers travel as CRDT numbers while an `f64` holds them exactly and as
//! CRDT big integers beyond that; on the way back, integral numbers within
//! the exactly representable range become integers again. CRDT `undefined`
//! maps to null and binary buffers are rejected.

use std::{collections::BTreeMap, sync::Arc};

use yrs::{Any, Array, ArrayPrelim, ArrayRef, In, Map, MapPrelim, MapRef, Out, ReadTxn};

use super::{BridgeError, YRoot};
use crate::{
    Result,
    snapshot::Snapshot,
    value::{Primitive, Value},
};

/// Largest integer magnitude an `f64` represents exactly.
const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

pub(crate) fn primitive_to_any(primitive: &Primitive) -> Any {
    match primitive {
        Primitive::Null => Any::Null,
        Primitive::Bool(b) => Any::Bool(*b),
        Primitive::Int(i) if i.unsigned_abs() > MAX_SAFE_INTEGER.unsigned_abs() => Any::BigInt(*i),
        Primitive::Int(i) => Any::Number(*i as f64),
        Primitive::Float(f) => Any::Number(*f),
        Primitive::Text(s) => Any::String(Arc::from(s.as_str())),
    }
}

/// Builds CRDT input (nested shared types for lists and objects).
pub(crate) fn snapshot_to_in(snapshot: &Snapshot) -> In {
    match snapshot {
        Snapshot::Primitive(primitive) => In::Any(primitive_to_any(primitive)),
        Snapshot::List(items) => In::Array(items.iter().map(snapshot_to_in).collect::<ArrayPrelim>()),
        Snapshot::Object(map) => In::Map(
            map.iter()
                .map(|(key, value)| (key.clone(), snapshot_to_in(value)))
                .collect::<MapPrelim>(),
        ),
    }
}

fn number_to_value(number: f64) -> Value {
    if number.is_finite() && number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER as f64 {
        Value::Int(number as i64)
    } else {
        Value::Float(number)
    }
}

pub(crate) fn any_to_value(any: &Any) -> Result<Value> {
    Ok(match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(n) => number_to_value(*n),
        Any::BigInt(i) => Value::Int(*i),
        Any::String(s) => Value::Text(s.to_string()),
        Any::Array(items) => Value::List(items.iter().map(any_to_value).collect::<Result<_>>()?),
        Any::Map(map) => Value::Object(
            map.iter()
                .map(|(key, value)| Ok((key.to_string(), any_to_value(value)?)))
                .collect::<Result<BTreeMap<_, _>>>()?,
        ),
        Any::Buffer(_) => {
            return Err(BridgeError::UnsupportedValue {
                kind: "binary buffer".to_string(),
            }
            .into());
        }
    })
}

pub(crate) fn out_to_value<T: ReadTxn>(out: &Out, txn: &T) -> Result<Value> {
    match out {
        Out::Any(any) => any_to_value(any),
        Out::YMap(map) => map_to_value(map, txn),
        Out::YArray(array) => array_to_value(array, txn),
        Out::YText(_) => Err(BridgeError::UnsupportedValue {
            kind: "shared text".to_string(),
        }
        .into()),
        _ => Err(BridgeError::UnsupportedValue {
            kind: "shared type".to_string(),
        }
        .into()),
    }
}

pub(crate) fn map_to_value<T: ReadTxn>(map: &MapRef, txn: &T) -> Result<Value> {
    let mut out = BTreeMap::new();
    for (key, value) in map.iter(txn) {
        out.insert(key.to_string(), out_to_value(&value, txn)?);
    }
    Ok(Value::Object(out))
}

pub(crate) fn array_to_value<T: ReadTxn>(array: &ArrayRef, txn: &T) -> Result<Value> {
    let items = array
        .iter(txn)
        .map(|value| out_to_value(&value, txn))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::List(items))
}

pub(crate) fn root_to_value<T: ReadTxn>(root: &YRoot, txn: &T) -> Result<Value> {
    match root {
        YRoot::Map(map) => map_to_value(map, txn),
        YRoot::Array(array) => array_to_value(array, txn),
    }
}
