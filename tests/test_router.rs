use spindle::handler::Handler;
use spindle::http::request::{Method, Request, RequestBuilder};
use spindle::http::response::{Response, ResponseBody, StatusCode};
use spindle::router::Router;

async fn short(_req: Request) -> anyhow::Result<Response> {
    Ok(Response::ok("short"))
}

async fn long(_req: Request) -> anyhow::Result<Response> {
    Ok(Response::ok("long"))
}

fn get(path: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .path(path)
        .build()
        .unwrap()
}

fn body_text(response: &Response) -> &[u8] {
    match &response.body {
        ResponseBody::Bytes(b) => &b[..],
        _ => panic!("expected an in-memory body"),
    }
}

#[tokio::test]
async fn test_first_registered_prefix_wins() {
    let router = Router::new().route("/a", short).route("/ab", long);

    let response = router.call(get("/ab/x")).await.unwrap();

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(body_text(&response), b"short");
}

#[tokio::test]
async fn test_specific_prefix_registered_first() {
    let router = Router::new().route("/ab", long).route("/a", short);

    assert_eq!(body_text(&router.call(get("/ab/x")).await.unwrap()), b"long");
    assert_eq!(body_text(&router.call(get("/a/x")).await.unwrap()), b"short");
}

#[tokio::test]
async fn test_no_match_is_not_found() {
    let router = Router::new().route("/api", short);

    let response = router.call(get("/static/app.js")).await.unwrap();

    assert_eq!(response.status, StatusCode::NotFound);
}

#[tokio::test]
async fn test_empty_router_is_not_found() {
    let response = Router::new().call(get("/")).await.unwrap();

    assert_eq!(response.status, StatusCode::NotFound);
}

#[test]
fn test_find_reports_matched_prefix() {
    let mut router = Router::new();
    router.register("/", short).register("/api", long);

    assert_eq!(router.find("/api/users").map(|(prefix, _)| prefix), Some("/"));
    assert_eq!(router.prefixes().collect::<Vec<_>>(), vec!["/", "/api"]);
    assert!(router.find("relative").is_none());
}
