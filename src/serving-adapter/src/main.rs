use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use leaf_detect::config::ServingConfig;
use leaf_detect::serving::ModelAdapter;
use log::{error, info};

fn reply(status: StatusCode, content_type: &str, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// Content type of a successful reply: the caller's `Accept`, or plain text.
fn response_type(accept: Option<String>) -> String {
    accept
        .filter(|a| !a.is_empty() && a != "*/*")
        .unwrap_or_else(|| "text/plain".to_owned())
}

async fn invocations(req: Request<Body>, adapter: Arc<ModelAdapter>) -> Response<Body> {
    let (content_type, accept) = {
        let header = |name| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        (
            header(CONTENT_TYPE).unwrap_or_else(|| "Unknown".to_owned()),
            response_type(header(ACCEPT)),
        )
    };

    let raw = match body::to_bytes(req.into_body()).await {
        Ok(raw) => raw,
        Err(err) => {
            return reply(
                StatusCode::BAD_REQUEST,
                "text/plain",
                format!("Could not read request body: '{}'", err),
            )
        }
    };

    match adapter.invoke(&content_type, &raw).await {
        Ok(label) => reply(StatusCode::OK, &accept, label),
        Err(err) => {
            error!("Invocation failed: {}", err);
            let status =
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            reply(status, "text/plain", format!("Error: {}, {}", status.as_u16(), err))
        }
    }
}

async fn handle(
    req: Request<Body>,
    adapter: Arc<ModelAdapter>,
) -> Result<Response<Body>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/ping") => reply(StatusCode::OK, "text/plain", String::new()),
        (&Method::POST, "/invocations") => invocations(req, adapter).await,
        _ => reply(StatusCode::NOT_FOUND, "text/plain", "Not found".to_owned()),
    };

    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = ServingConfig::from_env()?;
    let adapter = Arc::new(ModelAdapter::new(&config)?);

    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let adapter = Arc::clone(&adapter);

        let service = service_fn(move |req| handle(req, adapter.clone()));

        async move { Ok::<_, Infallible>(service) }
    });

    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Listening on {}, forwarding to {}", addr, config.tfs_url);

    Server::bind(&addr).serve(make_service).await?;

    Ok(())
}
