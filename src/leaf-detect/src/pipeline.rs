//! The request pipeline: decode, label check, inference, record lookup and
//! response assembly.

use std::collections::BTreeMap;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaborators::{Classifier, LabelDetector, LabelSet, RecordStore};
use crate::error::{DecodeError, Fault, ServiceError};
use crate::record::ApiResponse;
use crate::{Item, Timer};

pub const MAX_LABELS: i32 = 10;
pub const PLANT_LABELS: [&str; 2] = ["Leaf", "Plant"];

pub const NOT_A_PLANT_MESSAGE: &str =
    "Uploaded image is not a plant/leaf. Please use a different image.";
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Request could not be processed";
pub const BAD_REQUEST_MESSAGE: &str = "Request body is not a valid base64 encoded image";

pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Headers", "*"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "OPTIONS,POST,GET"),
];

/// Incoming trigger payload. `body` is base64 text of the image.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct InboundRequest {
    pub body: Option<String>,
}

impl InboundRequest {
    pub fn new(body: impl Into<String>) -> Self {
        InboundRequest {
            body: Some(body.into()),
        }
    }
}

/// HTTP-style reply: `{statusCode, headers, body}` where `body` is JSON text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Reply {
    fn new(status_code: u16, body: String) -> Self {
        Reply {
            status_code,
            headers: CORS_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        }
    }

    /// Reply whose body is a JSON-encoded string.
    pub fn message(status_code: u16, message: &str) -> Self {
        Reply::new(status_code, Value::String(message.to_owned()).to_string())
    }

    pub fn not_a_plant() -> Self {
        Reply::message(200, NOT_A_PLANT_MESSAGE)
    }

    pub fn upstream_failure() -> Self {
        Reply::message(502, UPSTREAM_FAILURE_MESSAGE)
    }

    pub fn bad_request() -> Self {
        Reply::message(400, BAD_REQUEST_MESSAGE)
    }

    pub fn classified(response: &ApiResponse) -> Result<Self, serde_json::Error> {
        Ok(Reply::new(200, serde_json::to_string(response)?))
    }
}

pub fn decode_image(request: &InboundRequest) -> Result<Vec<u8>, DecodeError> {
    let body = request.body.as_ref().ok_or(DecodeError::MissingBody)?;

    // Padding is mandatory; the decoder alone would accept "aGk".
    if body.len() % 4 != 0 {
        return Err(DecodeError::MissingPadding(body.len()));
    }
    Ok(base64::decode_config(body.as_bytes(), base64::STANDARD)?)
}

/// True when none of the plant labels was detected.
pub fn is_not_plant(labels: &LabelSet) -> bool {
    !PLANT_LABELS.iter().any(|l| labels.contains(l))
}

enum Outcome {
    NotAPlant,
    Found(Item),
}

/// Drives one request through the three collaborators. Holds no state
/// besides the collaborators themselves, so one instance serves every
/// invocation of the process.
pub struct Orchestrator<L, C, R> {
    labels: L,
    classifier: C,
    records: R,
}

impl<L, C, R> Orchestrator<L, C, R>
where
    L: LabelDetector,
    C: Classifier,
    R: RecordStore,
{
    pub fn new(labels: L, classifier: C, records: R) -> Self {
        Orchestrator {
            labels,
            classifier,
            records,
        }
    }

    pub async fn handle(&self, request: &InboundRequest) -> Result<Reply, Fault> {
        let mut t = Timer::new_start("Handling request");

        let image = match decode_image(request) {
            Ok(image) => image,
            Err(err) => {
                warn!("Rejecting request: {}", err);
                t.stop();
                return Ok(Reply::bad_request());
            }
        };
        debug!("Decoded {} image bytes", image.len());

        let reply = match self.run(&image).await {
            Ok(Outcome::NotAPlant) => Reply::not_a_plant(),
            Ok(Outcome::Found(item)) => Reply::classified(&ApiResponse::from_item(&item)?)?,
            Err(err) => {
                error!("Upstream failure: {}", err);
                Reply::upstream_failure()
            }
        };

        t.stop();

        Ok(reply)
    }

    async fn run(&self, image: &[u8]) -> Result<Outcome, ServiceError> {
        let mut t = Timer::new_start("Detecting labels");
        let labels = self.labels.detect_labels(image, MAX_LABELS).await?;
        t.stop();

        if is_not_plant(&labels) {
            info!("No plant labels among {} detected", labels.len());
            return Ok(Outcome::NotAPlant);
        }

        let mut t = Timer::new_start("Running inference");
        let label = self.classifier.classify(image).await?;
        t.stop();
        info!("Predicted label: {}", label);

        let mut t = Timer::new_start("Looking up record");
        let item = self.records.get_record(&label).await?;
        t.stop();

        item.map(Outcome::Found).ok_or_else(|| {
            ServiceError::new("record store", format!("no record named '{}'", label))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::wire::item_from_json;

    struct FakeLabels {
        result: Result<Vec<&'static str>, ()>,
        max_seen: Mutex<Option<i32>>,
    }

    #[async_trait]
    impl LabelDetector for FakeLabels {
        async fn detect_labels(&self, _: &[u8], max: i32) -> Result<LabelSet, ServiceError> {
            *self.max_seen.lock().unwrap() = Some(max);
            match &self.result {
                Ok(labels) => Ok(labels.iter().copied().collect()),
                Err(()) => Err(ServiceError::new("rekognition", "TestError")),
            }
        }
    }

    struct FakeClassifier {
        result: Result<&'static str, ()>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for FakeClassifier {
        async fn classify(&self, image: &[u8]) -> Result<String, ServiceError> {
            assert_eq!(image, b"This is a string message");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map(str::to_owned)
                .map_err(|_| ServiceError::new("sagemaker", "TestError"))
        }
    }

    struct FakeRecords {
        result: Result<Option<Item>, ()>,
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecordStore for FakeRecords {
        async fn get_record(&self, name: &str) -> Result<Option<Item>, ServiceError> {
            self.keys.lock().unwrap().push(name.to_owned());
            self.result
                .clone()
                .map_err(|_| ServiceError::new("dynamodb", "TestError"))
        }

        async fn put_record(&self, _: Item) -> Result<(), ServiceError> {
            unreachable!("the pipeline never writes")
        }
    }

    const IMAGE_B64: &str = "VGhpcyBpcyBhIHN0cmluZyBtZXNzYWdl";

    fn healthy_item() -> Item {
        item_from_json(&json!({
            "Name": {"S": "Tomato Healthy"},
            "Description": {"S": ""},
            "isDisease": {"BOOL": false},
            "Treatments": {"L": []},
            "Products": {"L": []},
        }))
        .unwrap()
    }

    fn orchestrator(
        labels: Result<Vec<&'static str>, ()>,
        classifier: Result<&'static str, ()>,
        records: Result<Option<Item>, ()>,
    ) -> Orchestrator<FakeLabels, FakeClassifier, FakeRecords> {
        Orchestrator::new(
            FakeLabels {
                result: labels,
                max_seen: Mutex::new(None),
            },
            FakeClassifier {
                result: classifier,
                calls: AtomicUsize::new(0),
            },
            FakeRecords {
                result: records,
                keys: Mutex::new(Vec::new()),
            },
        )
    }

    fn assert_cors(reply: &Reply) {
        assert_eq!(reply.headers["Access-Control-Allow-Headers"], "*");
        assert_eq!(reply.headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(
            reply.headers["Access-Control-Allow-Methods"],
            "OPTIONS,POST,GET"
        );
    }

    #[test]
    fn decodes_base64_body() {
        let image = decode_image(&InboundRequest::new(IMAGE_B64)).unwrap();
        assert_eq!(image, b"This is a string message");
    }

    #[test]
    fn decodes_empty_body() {
        assert!(decode_image(&InboundRequest::new("")).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_base64_body() {
        let request = InboundRequest::new("This is not a base64 encoded string");
        assert!(decode_image(&request).is_err());

        assert!(matches!(
            decode_image(&InboundRequest::new("ab!d")),
            Err(DecodeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn rejects_unpadded_body() {
        assert!(matches!(
            decode_image(&InboundRequest::new("aGk")),
            Err(DecodeError::MissingPadding(3))
        ));
        assert_eq!(decode_image(&InboundRequest::new("aGk=")).unwrap(), b"hi");
    }

    #[test]
    fn rejects_missing_body() {
        assert!(matches!(
            decode_image(&InboundRequest::default()),
            Err(DecodeError::MissingBody)
        ));
    }

    #[test]
    fn plant_label_check() {
        let check =
            |labels: &[&str]| is_not_plant(&labels.iter().copied().collect::<LabelSet>());

        assert!(check(&["Cat", "Dog", "Car"]));
        assert!(check(&[]));
        assert!(!check(&["Leaf"]));
        assert!(!check(&["Plant"]));
        assert!(!check(&["Leaf", "Plant"]));
        assert!(!check(&["Cat", "Leaf", "Dog", "Plant", "Car"]));
        // No normalisation: case matters.
        assert!(check(&["leaf", "PLANT"]));
    }

    #[test]
    fn not_a_plant_reply_shape() {
        let reply = Reply::not_a_plant();
        assert_eq!(reply.status_code, 200);
        assert_eq!(
            reply.body,
            "\"Uploaded image is not a plant/leaf. Please use a different image.\""
        );
        assert_cors(&reply);
    }

    #[tokio::test]
    async fn non_plant_image_short_circuits() {
        let orch = orchestrator(Ok(vec!["Cat", "Dog"]), Ok("unused"), Ok(None));

        let reply = orch.handle(&InboundRequest::new(IMAGE_B64)).await.unwrap();

        assert_eq!(reply, Reply::not_a_plant());
        assert_eq!(*orch.labels.max_seen.lock().unwrap(), Some(10));
        assert_eq!(orch.classifier.calls.load(Ordering::SeqCst), 0);
        assert!(orch.records.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn healthy_leaf_is_classified() {
        let orch = orchestrator(
            Ok(vec!["Leaf", "Plant"]),
            Ok("Tomato Healthy"),
            Ok(Some(healthy_item())),
        );

        let reply = orch.handle(&InboundRequest::new(IMAGE_B64)).await.unwrap();

        assert_eq!(reply.status_code, 200);
        assert_cors(&reply);
        assert_eq!(
            serde_json::from_str::<Value>(&reply.body).unwrap(),
            json!({
                "Name": "Tomato Healthy",
                "Description": "",
                "isDisease": false,
                "Treatments": [],
                "Products": [],
            })
        );
        assert_eq!(*orch.records.keys.lock().unwrap(), vec!["Tomato Healthy"]);
    }

    #[tokio::test]
    async fn label_service_error_is_bad_gateway() {
        let orch = orchestrator(Err(()), Ok("unused"), Ok(None));

        let reply = orch.handle(&InboundRequest::new(IMAGE_B64)).await.unwrap();

        assert_eq!(reply.status_code, 502);
        assert_eq!(reply.body, "\"Request could not be processed\"");
        assert_cors(&reply);
        assert_eq!(orch.classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inference_error_is_bad_gateway() {
        let orch = orchestrator(Ok(vec!["Plant"]), Err(()), Ok(None));

        let reply = orch.handle(&InboundRequest::new(IMAGE_B64)).await.unwrap();

        assert_eq!(reply, Reply::upstream_failure());
        assert!(orch.records.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_error_is_bad_gateway() {
        let orch = orchestrator(Ok(vec!["Leaf", "Plant"]), Ok("Tomato Healthy"), Err(()));

        let reply = orch.handle(&InboundRequest::new(IMAGE_B64)).await.unwrap();

        assert_eq!(reply, Reply::upstream_failure());
    }

    #[tokio::test]
    async fn absent_record_is_bad_gateway() {
        let orch = orchestrator(Ok(vec!["Leaf"]), Ok("Unknown Blight"), Ok(None));

        let reply = orch.handle(&InboundRequest::new(IMAGE_B64)).await.unwrap();

        assert_eq!(reply, Reply::upstream_failure());
        assert_eq!(*orch.records.keys.lock().unwrap(), vec!["Unknown Blight"]);
    }

    #[tokio::test]
    async fn undecodable_body_is_bad_request() {
        let orch = orchestrator(Ok(vec!["Leaf"]), Ok("unused"), Ok(None));

        let reply = orch
            .handle(&InboundRequest::new("This is not a base64 encoded string"))
            .await
            .unwrap();

        assert_eq!(reply.status_code, 400);
        assert_cors(&reply);
        assert!(orch.labels.max_seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_record_is_a_fault() {
        let mut item = healthy_item();
        item.remove("Products");
        let orch = orchestrator(Ok(vec!["Leaf"]), Ok("Tomato Healthy"), Ok(Some(item)));

        let result = orch.handle(&InboundRequest::new(IMAGE_B64)).await;

        assert!(matches!(result, Err(Fault::MalformedRecord(_))));
    }
}
