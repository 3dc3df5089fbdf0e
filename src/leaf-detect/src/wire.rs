//! Typed-wrapper JSON for record-store items.
//!
//! The record store nests every scalar one level inside an object whose only
//! key names the value's type, e.g. `{"S": "Tomato Healthy"}` or
//! `{"BOOL": false}`. These helpers translate that JSON to and from
//! [`AttributeValue`] so fixtures and dry runs can be written as plain JSON.

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Map, Value};

use crate::error::WireError;
use crate::Item;

pub fn to_json(value: &AttributeValue) -> Value {
    let (tag, payload) = match value {
        AttributeValue::S(s) => ("S", Value::String(s.clone())),
        AttributeValue::N(n) => ("N", Value::String(n.clone())),
        AttributeValue::Bool(b) => ("BOOL", Value::Bool(*b)),
        AttributeValue::Null(b) => ("NULL", Value::Bool(*b)),
        AttributeValue::L(list) => ("L", Value::Array(list.iter().map(to_json).collect())),
        AttributeValue::M(map) => ("M", item_to_json(map)),
        AttributeValue::Ss(set) => (
            "SS",
            Value::Array(set.iter().cloned().map(Value::String).collect()),
        ),
        AttributeValue::Ns(set) => (
            "NS",
            Value::Array(set.iter().cloned().map(Value::String).collect()),
        ),
        AttributeValue::B(blob) => ("B", Value::String(base64::encode(blob.as_ref()))),
        AttributeValue::Bs(set) => (
            "BS",
            Value::Array(
                set.iter()
                    .map(|blob| Value::String(base64::encode(blob.as_ref())))
                    .collect(),
            ),
        ),
        // A type this SDK version cannot name; shown rather than dropped.
        _ => ("UNKNOWN", Value::Null),
    };

    let mut wrapper = Map::new();
    wrapper.insert(tag.to_owned(), payload);
    Value::Object(wrapper)
}

/// Render a whole item as an object of wrapped values, keys sorted.
pub fn item_to_json(item: &Item) -> Value {
    let mut keys: Vec<&String> = item.keys().collect();
    keys.sort();

    let mut object = Map::new();
    for key in keys {
        object.insert(key.clone(), to_json(&item[key]));
    }
    Value::Object(object)
}

pub fn from_json(value: &Value) -> Result<AttributeValue, WireError> {
    let (tag, payload) = value
        .as_object()
        .filter(|wrapper| wrapper.len() == 1)
        .and_then(|wrapper| wrapper.iter().next())
        .ok_or_else(|| WireError::NotAWrapper(value.to_string()))?;

    let invalid = || WireError::InvalidPayload {
        tag: tag.clone(),
        payload: payload.to_string(),
    };

    match tag.as_str() {
        "S" => payload
            .as_str()
            .map(|s| AttributeValue::S(s.to_owned()))
            .ok_or_else(invalid),
        "N" => match payload {
            Value::String(n) => Ok(AttributeValue::N(n.clone())),
            Value::Number(n) => Ok(AttributeValue::N(n.to_string())),
            _ => Err(invalid()),
        },
        "BOOL" => payload.as_bool().map(AttributeValue::Bool).ok_or_else(invalid),
        "NULL" => payload.as_bool().map(AttributeValue::Null).ok_or_else(invalid),
        "L" => {
            let list = payload.as_array().ok_or_else(invalid)?;
            Ok(AttributeValue::L(
                list.iter().map(from_json).collect::<Result<_, _>>()?,
            ))
        }
        "M" => Ok(AttributeValue::M(item_from_json(payload)?)),
        "SS" | "NS" => {
            let set = payload
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(|v| v.as_str().map(str::to_owned).ok_or_else(invalid))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if tag == "SS" {
                AttributeValue::Ss(set)
            } else {
                AttributeValue::Ns(set)
            })
        }
        "B" => payload
            .as_str()
            .and_then(|b| base64::decode(b).ok())
            .map(|bytes| AttributeValue::B(Blob::new(bytes)))
            .ok_or_else(invalid),
        "BS" => {
            let set = payload
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(|v| {
                    v.as_str()
                        .and_then(|b| base64::decode(b).ok())
                        .map(Blob::new)
                        .ok_or_else(invalid)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AttributeValue::Bs(set))
        }
        other => Err(WireError::UnknownType(other.to_owned())),
    }
}

/// Parse an object of wrapped values into an item.
pub fn item_from_json(value: &Value) -> Result<Item, WireError> {
    let object = value
        .as_object()
        .ok_or_else(|| WireError::NotAWrapper(value.to_string()))?;

    let mut item = HashMap::with_capacity(object.len());
    for (key, wrapped) in object {
        item.insert(key.clone(), from_json(wrapped)?);
    }
    Ok(item)
}
