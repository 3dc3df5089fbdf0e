//! Collaborators backed by Rekognition, SageMaker Runtime and DynamoDB.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_dynamodb::types::AttributeValue;
use log::{debug, error};

use crate::collaborators::{Classifier, LabelDetector, LabelSet, RecordStore};
use crate::error::ServiceError;
use crate::Item;

pub const IMAGE_CONTENT_TYPE: &str = "application/x-image";

/// Load region and credentials from the default provider chain.
pub async fn load_sdk_config() -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest()).load().await
}

pub struct RekognitionLabels {
    client: aws_sdk_rekognition::Client,
}

impl RekognitionLabels {
    pub fn new(config: &SdkConfig) -> Self {
        RekognitionLabels {
            client: aws_sdk_rekognition::Client::new(config),
        }
    }
}

#[async_trait]
impl LabelDetector for RekognitionLabels {
    async fn detect_labels(
        &self,
        image: &[u8],
        max_labels: i32,
    ) -> Result<LabelSet, ServiceError> {
        let image = aws_sdk_rekognition::types::Image::builder()
            .bytes(aws_sdk_rekognition::primitives::Blob::new(image))
            .build();

        let output = self
            .client
            .detect_labels()
            .image(image)
            .max_labels(max_labels)
            .send()
            .await
            .map_err(|e| {
                error!("Rekognition detect_labels failed: {:?}", e);
                ServiceError::new("rekognition", e.to_string())
            })?;

        let labels: LabelSet = output
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| label.name)
            .collect();

        debug!("Detected labels: {:?}", labels);

        Ok(labels)
    }
}

pub struct SageMakerEndpoint {
    client: aws_sdk_sagemakerruntime::Client,
    endpoint_name: String,
}

impl SageMakerEndpoint {
    pub fn new(config: &SdkConfig, endpoint_name: &str) -> Self {
        SageMakerEndpoint {
            client: aws_sdk_sagemakerruntime::Client::new(config),
            endpoint_name: endpoint_name.to_owned(),
        }
    }
}

#[async_trait]
impl Classifier for SageMakerEndpoint {
    async fn classify(&self, image: &[u8]) -> Result<String, ServiceError> {
        let output = self
            .client
            .invoke_endpoint()
            .endpoint_name(&self.endpoint_name)
            .content_type(IMAGE_CONTENT_TYPE)
            .body(aws_sdk_sagemakerruntime::primitives::Blob::new(image))
            .send()
            .await
            .map_err(|e| {
                error!("SageMaker invoke_endpoint failed: {:?}", e);
                ServiceError::new("sagemaker", e.to_string())
            })?;

        let body = output.body.map(|b| b.into_inner()).unwrap_or_default();

        String::from_utf8(body)
            .map_err(|e| ServiceError::new("sagemaker", format!("label is not UTF-8: {}", e)))
    }
}

#[derive(Clone)]
pub struct DynamoDbRecords {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoDbRecords {
    pub fn new(config: &SdkConfig, table: &str) -> Self {
        DynamoDbRecords {
            client: aws_sdk_dynamodb::Client::new(config),
            table: table.to_owned(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl RecordStore for DynamoDbRecords {
    async fn get_record(&self, name: &str) -> Result<Option<Item>, ServiceError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("Name", AttributeValue::S(name.to_owned()))
            .send()
            .await
            .map_err(|e| {
                error!("DynamoDB get_item on '{}' failed: {:?}", self.table, e);
                ServiceError::new("dynamodb", e.to_string())
            })?;

        Ok(result.item)
    }

    async fn put_record(&self, item: Item) -> Result<(), ServiceError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| {
                error!("DynamoDB put_item on '{}' failed: {:?}", self.table, e);
                ServiceError::new("dynamodb", e.to_string())
            })?;

        Ok(())
    }
}
