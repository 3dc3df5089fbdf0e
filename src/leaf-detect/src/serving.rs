//! Pre- and post-processing around a TensorFlow Serving model, used by the
//! inference container in front of the model server.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use image::imageops::FilterType;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::aws::IMAGE_CONTENT_TYPE;
use crate::config::ServingConfig;
use crate::error::ServingError;
use crate::Timer;

/// Load class labels, one per line, in model output order.
///
/// Line `n` is class `n`. Trailing blank lines are dropped; a blank line
/// between labels is an error since it would shift every later class.
pub fn load_labels(path: &Path) -> Result<Vec<String>, ServingError> {
    let labels_err = |source| ServingError::Labels {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(labels_err)?;

    let mut labels = Vec::new();
    for line in BufReader::new(file).lines() {
        labels.push(line.map_err(labels_err)?.trim().to_owned());
    }

    while labels.last().map_or(false, |l| l.is_empty()) {
        labels.pop();
    }

    if let Some(index) = labels.iter().position(|l| l.is_empty()) {
        return Err(ServingError::BlankLabel {
            path: path.to_path_buf(),
            line: index + 1,
        });
    }

    Ok(labels)
}

/// Turn raw image bytes into a `{"instances": [..]}` request body of shape
/// `1 x height x width x 3` with channels scaled to `[0, 1]`.
pub fn preprocess(
    content_type: &str,
    data: &[u8],
    (width, height): (u32, u32),
) -> Result<Value, ServingError> {
    if content_type != IMAGE_CONTENT_TYPE {
        return Err(ServingError::UnsupportedContentType(
            content_type.to_owned(),
        ));
    }

    let mut t = Timer::new_start("Preprocessing image");

    let rgb = image::load_from_memory(data)?.to_rgb8();
    let resized = image::imageops::resize(&rgb, width, height, FilterType::Triangle);

    let rows: Vec<Vec<[f32; 3]>> = resized
        .rows()
        .map(|row| {
            row.map(|pixel| {
                let [r, g, b] = pixel.0;
                [r as f32 / 255f32, g as f32 / 255f32, b as f32 / 255f32]
            })
            .collect()
        })
        .collect();

    t.stop();

    Ok(json!({ "instances": [rows] }))
}

#[derive(Deserialize)]
struct Predictions {
    predictions: Vec<Vec<f32>>,
}

/// Map a model server response to the label of the most probable class.
pub fn postprocess(status: u16, body: &[u8], labels: &[String]) -> Result<String, ServingError> {
    if status != 200 {
        return Err(ServingError::Upstream(
            String::from_utf8_lossy(body).into_owned(),
        ));
    }

    let parsed: Predictions =
        serde_json::from_slice(body).map_err(|e| ServingError::Predictions(e.to_string()))?;

    let scores = parsed
        .predictions
        .first()
        .ok_or_else(|| ServingError::Predictions("empty predictions".to_owned()))?;

    // First index wins on ties.
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }

    let (index, score) =
        best.ok_or_else(|| ServingError::Predictions("empty probability vector".to_owned()))?;
    debug!("Best class {} with probability {}", index, score);

    labels.get(index).cloned().ok_or_else(|| {
        ServingError::Predictions(format!(
            "class index {} outside of {} labels",
            index,
            labels.len()
        ))
    })
}

/// Thin client for the TensorFlow Serving REST predict API.
pub struct TfServingClient {
    http: reqwest::Client,
    predict_url: String,
}

impl TfServingClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        TfServingClient {
            http: reqwest::Client::new(),
            predict_url: predict_url(base_url, model),
        }
    }

    pub async fn predict(&self, payload: &Value) -> Result<(u16, Vec<u8>), ServingError> {
        let mut t = Timer::new_start("Running model");

        let resp = self.http.post(&self.predict_url).json(payload).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();

        t.stop();

        Ok((status, body))
    }
}

pub fn predict_url(base_url: &str, model: &str) -> String {
    format!("{}/v1/models/{}:predict", base_url.trim_end_matches('/'), model)
}

/// Everything the container needs per request, built once at startup.
pub struct ModelAdapter {
    client: TfServingClient,
    labels: Vec<String>,
    image_size: (u32, u32),
}

impl ModelAdapter {
    pub fn new(config: &ServingConfig) -> Result<Self, ServingError> {
        let labels = load_labels(&config.labels_path)?;
        info!(
            "Loaded {} labels from {}",
            labels.len(),
            config.labels_path.display()
        );

        Ok(ModelAdapter {
            client: TfServingClient::new(&config.tfs_url, &config.model),
            labels,
            image_size: config.image_size,
        })
    }

    pub async fn invoke(&self, content_type: &str, data: &[u8]) -> Result<String, ServingError> {
        let payload = preprocess(content_type, data, self.image_size)?;
        let (status, body) = self.client.predict(&payload).await?;
        let label = postprocess(status, &body, &self.labels)?;

        info!("Prediction: {}", label);

        Ok(label)
    }
}
