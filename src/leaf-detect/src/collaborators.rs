//! Narrow interfaces to the three external services the pipeline calls.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::Item;

/// Labels the image-labeling service attached to an image.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LabelSet(HashSet<String>);

impl LabelSet {
    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        LabelSet(iter.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
pub trait LabelDetector: Send + Sync {
    async fn detect_labels(&self, image: &[u8], max_labels: i32)
        -> Result<LabelSet, ServiceError>;
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Return the predicted class label for the image.
    async fn classify(&self, image: &[u8]) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Exact-match lookup on the `Name` key. `Ok(None)` when absent.
    async fn get_record(&self, name: &str) -> Result<Option<Item>, ServiceError>;

    async fn put_record(&self, item: Item) -> Result<(), ServiceError>;
}
