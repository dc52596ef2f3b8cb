use axum::{http::StatusCode, routing::get, Router};
use parl_adapters::{AdapterError, BillsAdapter, MpsAdapter, SourceAdapter};
use parl_storage::{FetchError, HttpClientConfig, HttpFetcher, Resource};
use tokio::net::TcpListener;

async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(HttpClientConfig::default()).expect("client")
}

#[tokio::test]
async fn bills_adapter_decodes_collection_in_order() {
    let base = spawn_upstream(Router::new().route(
        "/bills/",
        get(|| async {
            r#"{"objects": [
                {"session": "44-1", "legisinfo_id": 1, "name": {"en": "First"}, "number": "C-1"},
                {"session": "44-1", "legisinfo_id": 2, "name": {"en": "Second", "fr": "Deuxième"}, "number": "C-2"}
            ]}"#
        }),
    ))
    .await;

    let adapter = BillsAdapter::new(format!("{base}/bills/"));
    let bills = adapter.fetch(&fetcher()).await.expect("fetch");
    assert_eq!(bills.iter().map(|b| b.legisinfo_id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(bills[0].name.fr, "");
}

#[tokio::test]
async fn empty_collection_is_ok() {
    let base = spawn_upstream(Router::new().route("/politicians/", get(|| async { r#"{"objects": []}"# }))).await;
    let mps = MpsAdapter::new(format!("{base}/politicians/"))
        .fetch(&fetcher())
        .await
        .expect("fetch");
    assert!(mps.is_empty());
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let base = spawn_upstream(Router::new().route("/politicians/", get(|| async { "{\"objects\": [" }))).await;
    let err = MpsAdapter::new(format!("{base}/politicians/"))
        .fetch(&fetcher())
        .await
        .expect_err("truncated json");
    assert!(err.is_decode());
    assert_eq!(err.resource(), Resource::Mps);
}

#[tokio::test]
async fn server_error_is_a_fetch_error() {
    let base = spawn_upstream(Router::new().route(
        "/bills/",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "{\"objects\": []}") }),
    ))
    .await;
    let err = BillsAdapter::new(format!("{base}/bills/"))
        .fetch(&fetcher())
        .await
        .expect_err("500");
    assert!(matches!(
        err,
        AdapterError::Fetch(FetchError::HttpStatus { status: 500, .. })
    ));
    assert!(!err.is_decode());
}
