//! Local HTTP servers standing in for irclogs and Ollama in tests.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{StatusCode, Uri};
use axum::Router;

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Serve fixed bodies keyed by raw (still percent-encoded) request path.
/// Any other path is a 404.
pub async fn serve_pages(pages: Vec<(String, String)>) -> String {
    let pages: Arc<HashMap<String, String>> = Arc::new(pages.into_iter().collect());
    let app = Router::new().fallback(move |uri: Uri| {
        let pages = pages.clone();
        async move {
            match pages.get(uri.path()) {
                Some(body) => (StatusCode::OK, body.clone()),
                None => (StatusCode::NOT_FOUND, String::new()),
            }
        }
    });
    serve(app).await
}

/// Answer every request with `status` and an empty body.
pub async fn serve_status(status: u16) -> String {
    let status = StatusCode::from_u16(status).unwrap();
    let app = Router::new().fallback(move || async move { (status, String::new()) });
    serve(app).await
}
