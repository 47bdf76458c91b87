use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{OriginalUri, State},
    http::{HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{any, get},
};
use conduit::{
    ClientDirectory, GatewayService, HttpClientAdapter, HttpClientSource, HttpHandler,
    config::{
        CachePolicyConfig, GatewayConfig, RateLimitConfig, RouteDescriptor, RouteSecurity,
        SecuritySettings,
    },
    metrics,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

type Clients = Arc<Mutex<Vec<Value>>>;

#[derive(Clone)]
struct Upstream {
    clients: Clients,
    hits: Arc<AtomicUsize>,
}

async fn list_clients(State(upstream): State<Upstream>) -> Json<Value> {
    Json(Value::Array(upstream.clients.lock().unwrap().clone()))
}

async fn counted(State(upstream): State<Upstream>) -> Json<Value> {
    let hits = upstream.hits.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "hits": hits }))
}

async fn echo(method: Method, OriginalUri(uri): OriginalUri, headers: HeaderMap) -> Json<Value> {
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "client": headers.get("x-client-id").and_then(|v| v.to_str().ok()),
        "request_id": headers.get("x-request-id").and_then(|v| v.to_str().ok()),
    }))
}

async fn register(State(upstream): State<Upstream>, Json(body): Json<Value>) -> Response {
    upstream.clients.lock().unwrap().push(body);
    StatusCode::CREATED.into_response()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(2)).await;
    "late"
}

/// One upstream hosting both the client directory and the business endpoints.
async fn spawn_upstream(upstream: Upstream) -> SocketAddr {
    let app = Router::new()
        .route("/clients", get(list_clients))
        .route("/register", axum::routing::post(register))
        .route("/slow", get(slow))
        .route("/moved", get(|| async { Redirect::temporary("/elsewhere") }))
        .route("/api/v1/users/{id}", any(echo))
        .route("/open/{*rest}", any(echo))
        .route("/counted/{*rest}", get(counted))
        .with_state(upstream);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn route(name: &str, context: &[&str], methods: &[&str], target: &str) -> RouteDescriptor {
    RouteDescriptor {
        name: name.to_string(),
        context: context.iter().map(|c| c.to_string()).collect(),
        methods: methods.iter().map(|m| m.to_string()).collect(),
        target: target.to_string(),
        ..RouteDescriptor::default()
    }
}

fn routes(target: &str) -> Vec<RouteDescriptor> {
    let mut directory = route("auth-clients-service", &["/clients"], &["GET"], target);
    directory.internal = true;

    let mut users = route("users", &["/users/:id"], &["GET", "POST"], target);
    users.path_rewrite = vec![("^/users".to_string(), "/api/v1/users".to_string())];

    let mut secured = route("secured", &["/secure/:id"], &["GET"], target);
    secured.path_rewrite = vec![("^/secure".to_string(), "/api/v1/users".to_string())];
    secured.security = Some(RouteSecurity {
        scope: "users".to_string(),
    });

    let open = route("open", &["/open/:name"], &["GET"], target);

    let mut limited = route("limited", &["/limited/:name"], &["GET"], target);
    limited.path_rewrite = vec![("^/limited".to_string(), "/open".to_string())];
    limited.limits = Some(RateLimitConfig {
        by: conduit::config::RateLimitBy::Route,
        requests: 1,
        period: "1m".to_string(),
        message: "slow down".to_string(),
        on_missing_key: Default::default(),
    });

    let mut timed = route("slow", &["/slow"], &["GET"], target);
    timed.timeout = Some(100);

    let moved = route("moved", &["/moved"], &["GET"], target);

    let mut register = route("register", &["/register"], &["POST"], target);
    register.on_access_refresh_clients = true;

    let mut cached = route("cached", &["/cached/:name"], &["GET"], target);
    cached.path_rewrite = vec![("^/cached".to_string(), "/counted".to_string())];
    cached.cache = Some(CachePolicyConfig {
        ttl: "1m".to_string(),
        methods: vec!["GET".to_string()],
    });

    vec![
        directory, users, secured, open, limited, timed, moved, register, cached,
    ]
}

struct Harness {
    app: Router,
    directory: Arc<ClientDirectory>,
    clients: Clients,
    hits: Arc<AtomicUsize>,
}

async fn harness() -> Harness {
    let clients: Clients = Arc::new(Mutex::new(vec![json!({"_id": "client-a", "name": "A"})]));
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_upstream(Upstream {
        clients: Arc::clone(&clients),
        hits: Arc::clone(&hits),
    })
    .await;
    let target = format!("http://{addr}");

    let config = Arc::new(GatewayConfig {
        routes: routes(&target),
        security: SecuritySettings {
            jwt_secret: SECRET.to_string(),
            ..SecuritySettings::default()
        },
        ..GatewayConfig::default()
    });

    let source = Arc::new(HttpClientSource::from_config(&config).unwrap());
    let directory = Arc::new(ClientDirectory::new(source, Duration::from_secs(3600)));
    directory.start().await.unwrap();

    let gateway = Arc::new(
        GatewayService::new(
            Arc::clone(&config),
            Arc::clone(&directory),
            Arc::new(HttpClientAdapter::new().unwrap()),
        )
        .unwrap(),
    );
    let app = HttpHandler::new(gateway, metrics::init_metrics().unwrap()).router();

    Harness {
        app,
        directory,
        clients,
        hits,
    }
}

fn token(client: &str) -> String {
    encode(
        &Header::default(),
        &json!({"user_id": client}),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_rewrites_path_and_preserves_query() {
    let h = harness().await;

    let (status, headers, body) = send(&h.app, get_request("/api/v1/users/507f?x=1")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));
    let body = json_body(&body);
    assert_eq!(body["path"], "/api/v1/users/507f");
    assert_eq!(body["query"], "x=1");
    assert_eq!(body["method"], "GET");
}

#[tokio::test]
async fn test_unknown_internal_and_unprefixed_paths_are_404() {
    let h = harness().await;

    for uri in ["/api/v1/nothing-here", "/api/v1/clients", "/users/1"] {
        let (status, _, body) = send(&h.app, get_request(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(json_body(&body)["error"], "route_not_found");
    }

    // method not listed on the route
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/v1/users/1")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_secured_route_requires_authorization_header() {
    let h = harness().await;

    let (status, _, body) = send(&h.app, get_request("/api/v1/secure/1")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["message"], "missing authorization header");
}

#[tokio::test]
async fn test_secured_route_rejects_unknown_client() {
    let h = harness().await;

    let request = Request::builder()
        .uri("/api/v1/secure/1")
        .header("authorization", format!("Bearer {}", token("ghost")))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error"], "unauthorized");
}

#[tokio::test]
async fn test_secured_route_forwards_client_id() {
    let h = harness().await;

    let request = Request::builder()
        .uri("/api/v1/secure/9")
        .header("authorization", format!("Bearer {}", token("client-a")))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["client"], "client-a");
    assert_eq!(body["path"], "/api/v1/users/9");
}

#[tokio::test]
async fn test_refresh_makes_new_client_visible() {
    let h = harness().await;
    let request = || {
        Request::builder()
            .uri("/api/v1/secure/1")
            .header("authorization", format!("Bearer {}", token("client-b")))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, _) = send(&h.app, request()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    h.clients.lock().unwrap().push(json!({"_id": "client-b"}));
    assert_eq!(h.directory.refresh_now().await.unwrap(), 2);

    let (status, _, _) = send(&h.app, request()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_on_access_refresh_picks_up_registration() {
    let h = harness().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/register")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"_id":"client-new"}"#))
        .unwrap();
    let (status, _, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::CREATED);

    // the refresh runs in the background
    let mut visible = false;
    for _ in 0..50 {
        if h.directory.find("client-new").is_some() {
            visible = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(visible, "registered client never appeared in the directory");
}

#[tokio::test]
async fn test_redirect_is_relayed_not_followed() {
    let h = harness().await;

    let (status, headers, _) = send(&h.app, get_request("/api/v1/moved")).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers.get("location").unwrap(), "/elsewhere");
}

#[tokio::test]
async fn test_upstream_timeout_is_bare_500() {
    let h = harness().await;

    let (status, _, body) = send(&h.app, get_request("/api/v1/slow")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_route_rate_limit_answers_429() {
    let h = harness().await;

    let (status, _, _) = send(&h.app, get_request("/api/v1/limited/a")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&h.app, get_request("/api/v1/limited/b")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(&body)["message"], "slow down");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let h = harness().await;

    let request = Request::builder()
        .uri("/api/v1/open/x")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-request-id").unwrap(), "req-123");
}

#[tokio::test]
async fn test_health_reports_directory_state() {
    let h = harness().await;

    let (status, _, body) = send(&h.app, get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clients"]["loaded"], true);
    assert_eq!(body["clients"]["count"], 1);
    assert_eq!(body["routes"], 9);
}

#[tokio::test]
async fn test_metrics_endpoint_renders_prometheus_text() {
    let h = harness().await;
    send(&h.app, get_request("/api/v1/open/metrics")).await;

    let (status, headers, _) = send(&h.app, get_request("/metrics")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

#[tokio::test]
async fn test_unsecured_route_drops_caller_client_id() {
    let h = harness().await;

    let request = Request::builder()
        .uri("/api/v1/open/x")
        .header("x-client-id", "client-a")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json_body(&body)["client"].is_null());
}

#[tokio::test]
async fn test_rejected_request_id_is_replaced_consistently() {
    let h = harness().await;

    let request = Request::builder()
        .uri("/api/v1/open/x")
        .header("x-request-id", "a".repeat(200))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    let echoed = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_ne!(echoed, "a".repeat(200));
    assert_eq!(json_body(&body)["request_id"], echoed);
}

#[tokio::test]
async fn test_cache_hit_skips_upstream() {
    let h = harness().await;

    let (status, headers, first) = send(&h.app, get_request("/api/v1/cached/a")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("x-cache").is_none());

    let (status, headers, second) = send(&h.app, get_request("/api/v1/cached/a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-cache").unwrap(), "HIT");
    assert_eq!(first, second);
    assert_eq!(h.hits.load(Ordering::SeqCst), 1);

    send(&h.app, get_request("/api/v1/cached/b")).await;
    assert_eq!(h.hits.load(Ordering::SeqCst), 2);
}
