//! End-to-end proxy tests
//!
//! A small hyper server plays the Teslamate API on an ephemeral port; the
//! proxy is served on another and driven with reqwest.

use bytes::Bytes;
use car_profile_proxy::{Profile, ProxyServer, ProxySettings};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const FLEET: &str = r#"{"data":{"cars":[
    {"car_id":1,"name":"Blue",
     "car_details":{"model":"3","trim_badging":"LR"},
     "car_exterior":{"exterior_color":"DeepBlue"}},
    {"car_id":2,"name":"Grey",
     "car_details":{"model":"Y","trim_badging":null},
     "car_exterior":{"exterior_color":"MidnightSilver"}}
]}}"#;

const SINGLE: &str = r#"{"data":{
    "car":{"car_id":1,"car_details":{"model":"3"}},
    "status":{"state":"asleep","odometer":12345.6}
}}"#;

/// Upstream timeout used by the test proxies
const UPSTREAM_TIMEOUT: Duration = Duration::from_millis(500);

/// Fake Teslamate API
async fn teslamate(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().to_string();
    let uri = req.uri().to_string();
    let path = req.uri().path().to_string();
    let headers: serde_json::Map<String, Value> = req
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or(""))))
        .collect();
    let body = req
        .into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default();

    let json = "application/json";
    let (status, content_type, body) = match path.as_str() {
        "/api/v1/cars" => (
            StatusCode::OK,
            "application/json; charset=utf-8",
            Bytes::from_static(FLEET.as_bytes()),
        ),
        "/api/v1/cars/1/status" => (StatusCode::OK, json, Bytes::from_static(SINGLE.as_bytes())),
        "/api/v1/cars/2" => (StatusCode::OK, json, Bytes::from_static(b"{\"data\": oops")),
        "/api/v1/cars/3/image" => (StatusCode::OK, "image/png", Bytes::from_static(b"\x89PNG\r\n")),
        "/api/v1/cars/4/slow" => {
            tokio::time::sleep(UPSTREAM_TIMEOUT * 10).await;
            (StatusCode::OK, json, Bytes::from_static(SINGLE.as_bytes()))
        }
        "/api/v1/echo" => {
            let echo = json!({
                "method": method,
                "uri": uri,
                "headers": headers,
                "body": String::from_utf8_lossy(&body),
            });
            (StatusCode::OK, json, Bytes::from(echo.to_string()))
        }
        _ => (StatusCode::NOT_FOUND, json, Bytes::from_static(b"{\"error\":\"not found\"}")),
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert("content-type", content_type.parse().unwrap());
    response.headers_mut().insert("x-upstream", "teslamate".parse().unwrap());
    Ok(response)
}

async fn spawn_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(teslamate))
                    .await;
            });
        }
    });

    addr
}

async fn spawn_proxy(upstream_url: String, overrides: Value) -> SocketAddr {
    let settings = ProxySettings {
        upstream_url,
        host: "127.0.0.1".into(),
        port: 4001,
        upstream_timeout: UPSTREAM_TIMEOUT,
        profile: Profile::new("test", overrides.as_object().cloned().unwrap_or_default()),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(ProxyServer::new(settings).unwrap());
    tokio::spawn(server.serve(listener));

    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn performance() -> Value {
    json!({
        "car_details": {"trim_badging": "Performance"},
        "car_exterior": {"wheel_type": "Stiletto20", "spoiler_type": "Passive"}
    })
}

#[tokio::test]
async fn test_fleet_response_gets_profile() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(format!("http://{}", upstream), performance()).await;

    let response = client()
        .get(format!("http://{}/api/v1/cars", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert!(response.headers().get("x-upstream").is_none());

    let body: Value = response.json().await.unwrap();
    let cars = body["data"]["cars"].as_array().unwrap();
    assert_eq!(cars.len(), 2);
    assert_eq!(cars[0]["car_details"]["model"], "3");
    assert_eq!(cars[1]["car_details"]["model"], "Y");
    for car in cars {
        assert_eq!(car["car_details"]["trim_badging"], "Performance");
        assert_eq!(car["car_exterior"]["wheel_type"], "Stiletto20");
        assert_eq!(car["car_exterior"]["spoiler_type"], "Passive");
    }
    assert_eq!(cars[0]["car_exterior"]["exterior_color"], "DeepBlue");
    assert_eq!(cars[1]["name"], "Grey");
}

#[tokio::test]
async fn test_single_car_response_keeps_siblings() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(format!("http://{}", upstream), performance()).await;

    let body: Value = client()
        .get(format!("http://{}/api/v1/cars/1/status", proxy))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(
        body["data"]["car"]["car_details"],
        json!({"model": "3", "trim_badging": "Performance"})
    );
    assert_eq!(body["data"]["status"], json!({"state": "asleep", "odometer": 12345.6}));
}

#[tokio::test]
async fn test_malformed_json_is_passed_through() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(format!("http://{}", upstream), performance()).await;

    let response = client()
        .get(format!("http://{}/api/v1/cars/2", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-upstream"], "teslamate");
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"{\"data\": oops"));
}

#[tokio::test]
async fn test_non_json_car_endpoint_is_passed_through() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(format!("http://{}", upstream), performance()).await;

    let response = client()
        .get(format!("http://{}/api/v1/cars/3/image", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"\x89PNG\r\n"));
}

#[tokio::test]
async fn test_empty_profile_passes_car_responses_through() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(format!("http://{}", upstream), json!({})).await;

    let response = client()
        .get(format!("http://{}/api/v1/cars", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["x-upstream"], "teslamate");
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(FLEET.as_bytes()));
}

#[tokio::test]
async fn test_query_headers_and_body_are_forwarded() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(format!("http://{}", upstream), performance()).await;

    let response = client()
        .patch(format!("http://{}/api/v1/echo?page=2&show=10", proxy))
        .header("authorization", "Bearer secret")
        .header("keep-alive", "timeout=5")
        .header("x-client", "matedroid")
        .body("charge_limit=80")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-upstream"], "teslamate");

    let echo: Value = response.json().await.unwrap();
    assert_eq!(echo["method"], "PATCH");
    assert_eq!(echo["uri"], "/api/v1/echo?page=2&show=10");
    assert_eq!(echo["body"], "charge_limit=80");
    assert_eq!(echo["headers"]["authorization"], "Bearer secret");
    assert_eq!(echo["headers"]["x-client"], "matedroid");
    assert!(echo["headers"].get("keep-alive").is_none());
    // host is rewritten to the upstream
    assert_eq!(echo["headers"]["host"], upstream.to_string());
}

#[tokio::test]
async fn test_upstream_status_is_preserved() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(format!("http://{}", upstream), performance()).await;

    let response = client()
        .get(format!("http://{}/api/v1/unknown", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_connection_refused_is_bad_gateway() {
    // Grab a free port and release it so nothing is listening there
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let proxy = spawn_proxy(format!("http://{}", dead), performance()).await;

    let response = client()
        .get(format!("http://{}/api/v1/cars", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["content-type"], "application/json");

    let body: Value = response.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Upstream request failed: "), "{}", message);
}

#[tokio::test]
async fn test_upstream_timeout_is_bad_gateway() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(format!("http://{}", upstream), performance()).await;

    let started = std::time::Instant::now();
    let response = client()
        .get(format!("http://{}/api/v1/cars/4/slow", proxy))
        .send()
        .await
        .unwrap();

    assert!(started.elapsed() < UPSTREAM_TIMEOUT * 10);
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["content-type"], "application/json");

    let body: Value = response.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Upstream request failed: "), "{}", message);
}

#[tokio::test]
async fn test_unsupported_method() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(format!("http://{}", upstream), performance()).await;

    let response = client()
        .request(reqwest::Method::OPTIONS, format!("http://{}/api/v1/cars", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["allow"], "GET, POST, PUT, DELETE, PATCH");
}
