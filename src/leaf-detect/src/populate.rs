//! Offline loader that fills the disease table from a directory of JSON
//! documents, one record per file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use aws_sdk_dynamodb::types::AttributeValue;
use log::info;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::collaborators::RecordStore;
use crate::error::PopulateError;
use crate::{Item, Timer};

/// A disease document as authored on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDocument {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Description")]
    pub description: String,

    /// `"true"` or `"false"`
    #[serde(rename = "isDisease")]
    pub is_disease: String,

    #[serde(rename = "Treatment")]
    pub treatment: Map<String, Value>,

    #[serde(rename = "Products")]
    pub products: Map<String, Value>,
}

/// Strict flag parsing: only `true`/`false` in any case are accepted.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Turn `{k1: v1, k2: v2}` into the stored list `[{k1: v1}, {k2: v2}]`,
/// keeping the document's key order.
fn entry_list(
    map: &Map<String, Value>,
    field: &'static str,
    path: &Path,
) -> Result<AttributeValue, PopulateError> {
    let mut list = Vec::with_capacity(map.len());

    for (key, value) in map {
        let value = value.as_str().ok_or_else(|| PopulateError::NonStringEntry {
            path: path.to_path_buf(),
            field,
            key: key.clone(),
        })?;

        let mut entry = HashMap::with_capacity(1);
        entry.insert(key.clone(), AttributeValue::S(value.to_owned()));
        list.push(AttributeValue::M(entry));
    }

    Ok(AttributeValue::L(list))
}

pub fn to_item(doc: &SourceDocument, path: &Path) -> Result<Item, PopulateError> {
    let is_disease = parse_flag(&doc.is_disease).ok_or_else(|| PopulateError::InvalidFlag {
        path: path.to_path_buf(),
        value: doc.is_disease.clone(),
    })?;

    let mut item = HashMap::new();
    item.insert("Name".to_owned(), AttributeValue::S(doc.name.clone()));
    item.insert(
        "Description".to_owned(),
        AttributeValue::S(doc.description.clone()),
    );
    item.insert("isDisease".to_owned(), AttributeValue::Bool(is_disease));
    item.insert(
        "Treatments".to_owned(),
        entry_list(&doc.treatment, "Treatment", path)?,
    );
    item.insert(
        "Products".to_owned(),
        entry_list(&doc.products, "Products", path)?,
    );

    Ok(item)
}

pub fn read_document(path: &Path) -> Result<SourceDocument, PopulateError> {
    let text = fs::read_to_string(path).map_err(|source| PopulateError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&text).map_err(|source| PopulateError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Regular files of `dir`, sorted by name.
pub fn source_files(dir: &Path) -> Result<Vec<PathBuf>, PopulateError> {
    let io_err = |source| PopulateError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    Ok(files)
}

/// Read and convert every document in `dir`. Stops at the first bad file.
pub fn load_items(dir: &Path) -> Result<Vec<(PathBuf, Item)>, PopulateError> {
    source_files(dir)?
        .into_iter()
        .map(|path| {
            let item = to_item(&read_document(&path)?, &path)?;
            Ok((path, item))
        })
        .collect()
}

/// Write one record per document in `dir`; returns how many were written.
pub async fn populate<S: RecordStore>(store: &S, dir: &Path) -> Result<usize, PopulateError> {
    let mut t = Timer::new_start(&format!("Populating from {}", dir.display()));

    let items = load_items(dir)?;
    let count = items.len();

    for (path, item) in items {
        info!("Uploading: {}", path.display());
        store
            .put_record(item)
            .await
            .map_err(|source| PopulateError::Store { path, source })?;
    }

    t.stop();

    Ok(count)
}
