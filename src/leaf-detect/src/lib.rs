//! Plant-leaf disease detection: the request pipeline behind the HTTP
//! function, its AWS collaborators, the table loader and the inference
//! container's pre/post-processing.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

pub mod aws;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod populate;
pub mod record;
pub mod serving;
pub mod wire;

pub use collaborators::{Classifier, LabelDetector, LabelSet, RecordStore};
pub use error::{DecodeError, Fault, RecordError, ServiceError};
pub use pipeline::{InboundRequest, Orchestrator, Reply};
pub use record::ApiResponse;

/// A record-store item: attribute name to typed value.
pub type Item = HashMap<String, AttributeValue>;

/// Logs how long a named step took.
pub struct Timer {
    name: String,
    tstamp: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        Timer {
            name: name.to_owned(),
            tstamp: None,
            duration: None,
        }
    }

    pub fn new_start(name: &str) -> Self {
        let mut t = Timer::new(name);
        t.start();
        t
    }

    pub fn start(&mut self) {
        debug!("{}: starting", self.name);

        self.tstamp = Some(Utc::now());
        self.duration = None;
    }

    /// Stop the timer and return the elapsed milliseconds
    pub fn stop(&mut self) -> i64 {
        match self.tstamp.take() {
            None => debug!("{}: not running!", self.name),
            Some(tstamp) => {
                let d = Utc::now() - tstamp;

                self.duration = Some(d);
                info!("{} duration: {} msec", self.name, d.num_milliseconds());
            }
        }
        self.elapsed_ms()
    }

    /// Duration of the last completed run in milliseconds
    pub fn elapsed_ms(&self) -> i64 {
        self.duration.map_or(0, |d| d.num_milliseconds())
    }
}
