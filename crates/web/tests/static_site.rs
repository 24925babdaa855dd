//! End-to-end: router, dispatcher and static file handler together,
//! consumed through the transport-facing body.

use std::sync::Arc;

use http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;

use sluice_http::filter::{head_filter_fn, FilterAction, FilterChain, FilterPriority};
use sluice_http::filter::ResponseFilter;
use sluice_http::protocol::RequestInfo;
use sluice_web::{run_request, Router, StaticFileHandler};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn site() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("index.html"), "<h1>home</h1>").unwrap();
    std::fs::create_dir(root.path().join("assets")).unwrap();
    std::fs::write(root.path().join("assets/app.css"), "body { margin: 0 }").unwrap();
    root
}

fn static_router(root: &tempfile::TempDir) -> Router {
    Router::builder().route("/{*path}", StaticFileHandler::new(root.path())).build()
}

fn request(builder: http::request::Builder) -> RequestInfo {
    builder.body(()).unwrap().into()
}

fn get(path: &str) -> RequestInfo {
    request(Request::builder().method(Method::GET).uri(path))
}

#[tokio::test]
async fn serves_a_nested_asset_through_the_router() {
    init_tracing();
    let root = site();
    let router = static_router(&root);

    let output = run_request(get("/assets/app.css"), &router, Arc::new(FilterChain::empty()));
    let (head, body) = output.head().await.unwrap();
    let body = body.collect().await.unwrap().to_bytes();

    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(body.as_ref(), b"body { margin: 0 }");
    assert_eq!(head.headers().get(&header::CONTENT_TYPE).unwrap(), "text/css");
}

#[tokio::test]
async fn conditional_revalidation_round_trip() {
    init_tracing();
    let root = site();
    let router = static_router(&root);

    let output = run_request(get("/index.html"), &router, Arc::new(FilterChain::empty()));
    let (head, _) = output.head().await.unwrap();
    let etag = head.headers().get(&header::ETAG).unwrap().to_str().unwrap().to_owned();

    let revalidation = request(
        Request::builder()
            .method(Method::GET)
            .uri("/index.html")
            .header(header::IF_NONE_MATCH, &etag),
    );
    let output = run_request(revalidation, &router, Arc::new(FilterChain::empty()));
    let (head, body) = output.head().await.unwrap();
    let body = body.collect().await.unwrap().to_bytes();

    assert_eq!(head.status(), StatusCode::NOT_MODIFIED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn range_request_through_the_full_stack() {
    init_tracing();
    let root = site();
    let router = static_router(&root);

    let ranged = request(
        Request::builder()
            .method(Method::GET)
            .uri("/assets/app.css")
            .header(header::RANGE, "bytes=0-3"),
    );
    let output = run_request(ranged, &router, Arc::new(FilterChain::empty()));
    let (head, body) = output.head().await.unwrap();
    let body = body.collect().await.unwrap().to_bytes();

    assert_eq!(head.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body.as_ref(), b"body");
    assert_eq!(head.headers().get(&header::CONTENT_RANGE).unwrap(), "bytes 0-3/18");
}

#[tokio::test]
async fn filters_stamp_every_response_including_errors() {
    init_tracing();
    let root = site();
    let router = static_router(&root);
    let filters = Arc::new(FilterChain::from_registrations(vec![(
        Arc::new(head_filter_fn(|parts| {
            parts.set_header(header::SERVER, "sluice");
            FilterAction::Continue
        })) as Arc<dyn ResponseFilter>,
        FilterPriority::Low,
    )]));

    let output = run_request(get("/index.html"), &router, Arc::clone(&filters));
    let (head, _) = output.head().await.unwrap();
    assert_eq!(head.headers().get(&header::SERVER).unwrap(), "sluice");

    let output = run_request(get("/missing.html"), &router, filters);
    let (head, body) = output.head().await.unwrap();
    let body = body.collect().await.unwrap().to_bytes();
    assert_eq!(head.status(), StatusCode::NOT_FOUND);
    assert_eq!(head.headers().get(&header::SERVER).unwrap(), "sluice");
    assert_eq!(body.as_ref(), b"The file /missing.html was not found.");
}
