//! Flattening of stored disease records into the client-facing shape.

use std::collections::BTreeMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde::Serialize;

use crate::error::RecordError;
use crate::Item;

/// A single `{key: value}` treatment or product entry.
pub type Entry = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiResponse {
    pub name: String,

    pub description: String,

    #[serde(rename = "isDisease")]
    pub is_disease: bool,

    /// Treatments in stored order, one key per entry
    pub treatments: Vec<Entry>,

    /// Products in stored order, one key per entry
    pub products: Vec<Entry>,
}

impl ApiResponse {
    /// Build the response from a stored item. No partial output: the first
    /// missing or mistyped field fails the whole conversion.
    pub fn from_item(item: &Item) -> Result<Self, RecordError> {
        Ok(ApiResponse {
            name: string_field(item, "Name")?,
            description: string_field(item, "Description")?,
            is_disease: bool_field(item, "isDisease")?,
            treatments: entries(field(item, "Treatments")?, "Treatments")?,
            products: entries(field(item, "Products")?, "Products")?,
        })
    }
}

fn field<'a>(item: &'a Item, name: &'static str) -> Result<&'a AttributeValue, RecordError> {
    item.get(name).ok_or(RecordError::MissingField(name))
}

fn string_field(item: &Item, name: &'static str) -> Result<String, RecordError> {
    match field(item, name)? {
        AttributeValue::S(s) => Ok(s.clone()),
        _ => Err(RecordError::UnexpectedType {
            field: name,
            expected: "string",
        }),
    }
}

fn bool_field(item: &Item, name: &'static str) -> Result<bool, RecordError> {
    match field(item, name)? {
        AttributeValue::Bool(b) => Ok(*b),
        _ => Err(RecordError::UnexpectedType {
            field: name,
            expected: "boolean",
        }),
    }
}

/// Flatten a list of single-key map wrappers into `{key: value}` entries.
///
/// Entries are expected to hold exactly one key. Extra keys are ignored and
/// the smallest key is read, so the result does not depend on map order.
pub fn entries(value: &AttributeValue, name: &'static str) -> Result<Vec<Entry>, RecordError> {
    let list = match value {
        AttributeValue::L(list) => list,
        _ => {
            return Err(RecordError::UnexpectedType {
                field: name,
                expected: "list",
            })
        }
    };

    list.iter()
        .enumerate()
        .map(|(index, wrapped)| {
            let map = match wrapped {
                AttributeValue::M(map) => map,
                _ => {
                    return Err(RecordError::UnexpectedType {
                        field: name,
                        expected: "list of maps",
                    })
                }
            };

            let (key, value) = map
                .iter()
                .min_by(|(a, _), (b, _)| a.cmp(b))
                .ok_or(RecordError::EmptyEntry { field: name, index })?;

            let value = match value {
                AttributeValue::S(s) => s.clone(),
                _ => {
                    return Err(RecordError::UnexpectedType {
                        field: name,
                        expected: "list of string maps",
                    })
                }
            };

            let mut entry = Entry::new();
            entry.insert(key.clone(), value);
            Ok(entry)
        })
        .collect()
}
