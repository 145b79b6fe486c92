use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use oztf_network::{
    CoordinatorOptions, EndpointConfig, EndpointTable, HttpMethod, HttpTransport,
    RequestCoordinator, RequestError, Transport, TransportError,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: JsonValue,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body,
            delay: Duration::from_millis(0),
        }
    }

    fn envelope(code: &str, data: JsonValue) -> Self {
        Self::json(
            StatusCode::OK,
            json!({"meta": {"code": code, "message": "from mock"}, "data": data}),
        )
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct Received {
    method: Method,
    path: String,
    query: Option<String>,
    body: String,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    received: Arc<Mutex<Vec<Received>>>,
    hits: Arc<AtomicUsize>,
}

async fn api_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    body: String,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .received
        .lock()
        .expect("received mutex must not be poisoned")
        .push(Received {
            method,
            path: uri.path().to_owned(),
            query: uri.query().map(str::to_owned),
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, Json(response.body))
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn options(&self) -> CoordinatorOptions {
        CoordinatorOptions::default().with_base_url(&self.base_url)
    }

    fn transport(&self) -> HttpTransport {
        HttpTransport::new(&self.options()).expect("http client must build")
    }

    fn last_received(&self) -> Received {
        self.received
            .lock()
            .expect("received mutex must not be poisoned")
            .last()
            .cloned()
            .expect("server must have received a request")
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        received: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .fallback(api_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}/oztf/api/v1/"),
        hits: state.hits,
        received: state.received,
        task,
    }
}

fn segments(path: &[&str]) -> Vec<String> {
    path.iter().map(|segment| (*segment).to_owned()).collect()
}

#[tokio::test]
async fn post_sends_json_body_and_decodes_envelope() {
    let server = spawn_server(vec![MockResponse::envelope(
        "1024-S200",
        json!({"id": 1, "name": "Kit"}),
    )])
    .await;

    let envelope = server
        .transport()
        .send(HttpMethod::Post, &segments(&["staff", "info"]), &json!({"id": 1}))
        .await
        .expect("request must succeed");

    assert!(envelope.is_success());
    assert_eq!(envelope.meta.message, "from mock");
    assert_eq!(envelope.data["name"], "Kit");

    let received = server.last_received();
    assert_eq!(received.method, Method::POST);
    assert_eq!(received.path, "/oztf/api/v1/staff/info");
    let body: JsonValue = serde_json::from_str(&received.body).expect("body must be json");
    assert_eq!(body, json!({"id": 1}));
}

#[tokio::test]
async fn get_sends_params_as_query_string() {
    let server = spawn_server(vec![MockResponse::envelope("1024-S200", json!([]))]).await;

    server
        .transport()
        .send(
            HttpMethod::Get,
            &segments(&["feature", "list"]),
            &json!({"page": 2, "keyword": "nfc"}),
        )
        .await
        .expect("request must succeed");

    let received = server.last_received();
    assert_eq!(received.method, Method::GET);
    assert_eq!(received.path, "/oztf/api/v1/feature/list");
    let query = received.query.expect("query string must be present");
    assert!(query.contains("page=2"));
    assert!(query.contains("keyword=nfc"));
    assert!(received.body.is_empty());
}

#[tokio::test]
async fn non_success_status_is_reported_with_code() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({"error": "missing"}),
    )])
    .await;

    let err = server
        .transport()
        .send(HttpMethod::Post, &segments(&["nope"]), &json!({}))
        .await
        .expect_err("request must fail");

    assert_eq!(err, TransportError::Status { status: 404 });
}

#[tokio::test]
async fn request_timeout_is_a_missing_response() {
    let server = spawn_server(vec![MockResponse::envelope("1024-S200", json!(null))
        .with_delay(Duration::from_millis(150))])
    .await;
    let transport =
        HttpTransport::new(&server.options().with_timeout_ms(20)).expect("http client must build");

    let err = transport
        .send(HttpMethod::Post, &segments(&["initial"]), &json!({}))
        .await
        .expect_err("request must time out");

    assert_eq!(
        err,
        TransportError::NoResponse {
            code: Some("ETIMEDOUT".to_owned())
        }
    );
}

#[tokio::test]
async fn refused_connection_is_a_missing_response() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let options = CoordinatorOptions::default().with_base_url(format!("http://{address}/"));
    let err = HttpTransport::new(&options)
        .expect("http client must build")
        .send(HttpMethod::Post, &segments(&["initial"]), &json!({}))
        .await
        .expect_err("connection must be refused");

    assert_eq!(
        err,
        TransportError::NoResponse {
            code: Some("ECONNREFUSED".to_owned())
        }
    );
}

#[tokio::test]
async fn malformed_envelope_is_not_retryable() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!("plain text"),
    )])
    .await;

    let err = server
        .transport()
        .send(HttpMethod::Post, &segments(&["initial"]), &json!({}))
        .await
        .expect_err("decoding must fail");

    match err {
        TransportError::NotSent { message } => {
            assert!(message.contains("invalid response envelope"));
            assert!(!message.contains("plain text"));
        }
        other => panic!("expected decode failure, got {other:?}"),
    }
}

fn registry() -> EndpointTable {
    EndpointTable::new()
        .with(
            "staffInfo",
            EndpointConfig::new(HttpMethod::Post, ["staff", "info"]).with_retry(true),
        )
        .with(
            "projectAdd",
            EndpointConfig::new(HttpMethod::Post, ["project", "add"]),
        )
}

#[tokio::test]
async fn coordinator_retries_busy_envelope_over_http() {
    let server = spawn_server(vec![
        MockResponse::envelope("1024-D01", JsonValue::Null),
        MockResponse::envelope("1024-S200", json!({"id": 5})),
    ])
    .await;

    let mut options = server.options();
    options.retry_base_delay_ms = 5;
    let network = RequestCoordinator::builder()
        .options(options)
        .registry(registry())
        .transport(server.transport())
        .build();

    let data = network
        .call("staffInfo", json!({"id": 5}))
        .await
        .expect("request must succeed after retry");

    assert_eq!(data, json!({"id": 5}));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn coordinator_does_not_retry_http_status_errors() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": "boom"}),
    )])
    .await;

    let network = RequestCoordinator::builder()
        .options(server.options())
        .registry(registry())
        .build();
    assert!(network.is_ready());

    let err = network
        .call("staffInfo", json!({}))
        .await
        .expect_err("request must fail");

    assert_eq!(
        err,
        RequestError::Http {
            status: 500,
            message: "Internal Server Error".to_owned(),
        }
    );
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}
