use lambda_http::{run, service_fn, Body, Error, Request, Response};

use leaf_detect::aws::{load_sdk_config, DynamoDbRecords, RekognitionLabels, SageMakerEndpoint};
use leaf_detect::config::HandlerConfig;
use leaf_detect::{InboundRequest, Orchestrator, Reply};
use log::debug;

type Handler = Orchestrator<RekognitionLabels, SageMakerEndpoint, DynamoDbRecords>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let config = HandlerConfig::from_env()?;
    let sdk_config = load_sdk_config().await;

    let orchestrator: Handler = Orchestrator::new(
        RekognitionLabels::new(&sdk_config),
        SageMakerEndpoint::new(&sdk_config, &config.endpoint_name),
        DynamoDbRecords::new(&sdk_config, &config.table_name),
    );

    debug!(
        "Clients ready for table '{}' and endpoint '{}'",
        config.table_name, config.endpoint_name
    );

    let orchestrator_ref = &orchestrator;

    debug!("Dispatching handler");
    run(service_fn(move |event: Request| async move {
        handle_request(event, orchestrator_ref).await
    }))
    .await
}

/// The body arrives as base64 text; API Gateway may hand it over as text or
/// as binary depending on the integration.
fn inbound(event: &Request) -> InboundRequest {
    match event.body() {
        Body::Empty => InboundRequest::default(),
        Body::Text(text) => InboundRequest::new(text.as_str()),
        Body::Binary(bytes) => InboundRequest::new(String::from_utf8_lossy(bytes)),
    }
}

async fn handle_request(event: Request, orchestrator: &Handler) -> Result<Response<Body>, Error> {
    debug!("Received request: {} {}", event.method(), event.uri());

    let reply = orchestrator.handle(&inbound(&event)).await?;

    into_response(reply)
}

fn into_response(reply: Reply) -> Result<Response<Body>, Error> {
    let mut builder = Response::builder().status(reply.status_code);
    for (name, value) in &reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    Ok(builder.body(Body::Text(reply.body))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_text_and_binary_bodies() {
        let text = Request::new(Body::Text("aGk=".to_owned()));
        assert_eq!(inbound(&text).body.as_deref(), Some("aGk="));

        let binary = Request::new(Body::Binary(b"aGk=".to_vec()));
        assert_eq!(inbound(&binary).body.as_deref(), Some("aGk="));

        assert!(inbound(&Request::new(Body::Empty)).body.is_none());
    }

    #[test]
    fn reply_becomes_response_with_cors_headers() {
        let response = into_response(Reply::upstream_failure()).unwrap();

        assert_eq!(response.status(), 502);
        assert_eq!(response.headers()["Access-Control-Allow-Origin"], "*");
        assert_eq!(
            response.headers()["Access-Control-Allow-Methods"],
            "OPTIONS,POST,GET"
        );
        match response.body() {
            Body::Text(text) => assert_eq!(text, "\"Request could not be processed\""),
            other => panic!("unexpected body {:?}", other),
        }
    }
}
