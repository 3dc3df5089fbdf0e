use std::path::PathBuf;

use thiserror::Error;

/// Request body could not be turned into image bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("request has no body")]
    MissingBody,
    #[error("request body is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("request body is not padded base64: length {0} is not a multiple of 4")]
    MissingPadding(usize),
}

/// A collaborator call failed. The message is for logs only.
#[derive(Debug, Error)]
#[error("{service} error: {message}")]
pub struct ServiceError {
    pub service: &'static str,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError {
            service,
            message: message.into(),
        }
    }
}

/// A stored disease record does not have the expected shape.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("record is missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' is not a {expected} value")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("entry {index} of '{field}' has no key")]
    EmptyEntry { field: &'static str, index: usize },
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("expected a single-key type wrapper object, got: {0}")]
    NotAWrapper(String),
    #[error("unknown type wrapper '{0}'")]
    UnknownType(String),
    #[error("wrapper '{tag}' holds an invalid payload: {payload}")]
    InvalidPayload { tag: String, payload: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum PopulateError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{path}: isDisease must be \"true\" or \"false\", got '{value}'")]
    InvalidFlag { path: PathBuf, value: String },
    #[error("{path}: '{field}' entry '{key}' is not a string")]
    NonStringEntry {
        path: PathBuf,
        field: &'static str,
        key: String,
    },
    #[error("could not store {path}: {source}")]
    Store { path: PathBuf, source: ServiceError },
}

#[derive(Debug, Error)]
pub enum ServingError {
    #[error("Unsupported content type \"{0}\"")]
    UnsupportedContentType(String),
    #[error("could not create image from raw data: {0}")]
    Image(#[from] image::ImageError),
    #[error("{0}")]
    Upstream(String),
    #[error("could not reach model server: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed predictions: {0}")]
    Predictions(String),
    #[error("could not read labels file {path}: {source}")]
    Labels {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("labels file {path} has a blank line {line} before the last label")]
    BlankLabel { path: PathBuf, line: usize },
}

impl ServingError {
    /// HTTP status the adapter answers with for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServingError::UnsupportedContentType(_) => 415,
            ServingError::Image(_) => 400,
            ServingError::Labels { .. } | ServingError::BlankLabel { .. } => 500,
            _ => 502,
        }
    }
}

/// Failures the pipeline does not turn into a reply. They point at a data
/// integrity problem and are left to the hosting runtime.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("malformed disease record: {0}")]
    MalformedRecord(#[from] RecordError),
    #[error("could not encode response: {0}")]
    Encode(#[from] serde_json::Error),
}
