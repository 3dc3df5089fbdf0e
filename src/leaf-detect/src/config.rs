//! Process-start configuration read from the environment.

use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const TABLE_NAME_VAR: &str = "DYNAMODB_TABLE_NAME";
pub const ENDPOINT_NAME_VAR: &str = "SAGEMAKER_INFERENCE_ENDPOINT";

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

/// Identifiers the request handler needs. Never mutated after startup.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerConfig {
    pub table_name: String,
    pub endpoint_name: String,
}

impl HandlerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(HandlerConfig {
            table_name: required(TABLE_NAME_VAR)?,
            endpoint_name: required(ENDPOINT_NAME_VAR)?,
        })
    }
}

/// Settings of the inference container adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ServingConfig {
    /// Base URL of the TensorFlow Serving REST API
    pub tfs_url: String,

    /// Model name used in the predict path
    pub model: String,

    /// Class labels file, one label per line in model output order
    pub labels_path: PathBuf,

    /// Width and height images are resized to
    pub image_size: (u32, u32),

    pub listen_addr: String,
}

impl ServingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let image_size = optional("IMAGE_SIZE", "224x224");

        Ok(ServingConfig {
            tfs_url: optional("TFS_URL", "http://127.0.0.1:8501"),
            model: optional("TFS_MODEL", "model"),
            labels_path: PathBuf::from(required("LABELS_PATH")?),
            image_size: parse_size(&image_size).ok_or(ConfigError::Invalid {
                name: "IMAGE_SIZE",
                value: image_size.clone(),
            })?,
            listen_addr: optional("LISTEN_ADDR", "0.0.0.0:8080"),
        })
    }
}

/// Parse `WxH`, e.g. `224x224`.
pub fn parse_size(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once(|c: char| c == 'x' || c == 'X')?;
    let (w, h) = (w.parse().ok()?, h.parse().ok()?);

    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_image_size() {
        assert_eq!(parse_size("224x224"), Some((224, 224)));
        assert_eq!(parse_size(" 256X128 "), Some((256, 128)));
        assert_eq!(parse_size("224"), None);
        assert_eq!(parse_size("0x10"), None);
        assert_eq!(parse_size("ax10"), None);
    }
}
