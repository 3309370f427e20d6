//! Purpose: Provide the HTTP/JSON document service for pdfapp.
//! Exports: `ServeConfig`, `StoreConfig`, `serve`.
//! Role: Axum-based server for document CRUD, font listing and PDF rendering.
//! Invariants: Loopback-only unless explicitly allowed.
//! Invariants: Error envelopes are `{"error":{"kind","message","hint"?}}`; kinds map to fixed statuses.
//! Invariants: Store access and PDF rendering run on the blocking pool, one surface per request.
//! Invariants: A handler panic becomes a 500 error envelope; the worker keeps serving.

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Path as AxumPath, State};
use axum::http::{HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use pdfapp::api::{
    Document, DocumentId, DocumentStore, Error, ErrorKind, FileStore, LENGTH_PATTERN, MemoryStore,
    list_font_families,
};

#[derive(Clone, Debug)]
pub enum StoreConfig {
    Dir(PathBuf),
    Memory,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub store: StoreConfig,
    pub static_dir: Option<PathBuf>,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn DocumentStore>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let store: Arc<dyn DocumentStore> = match &config.store {
        StoreConfig::Dir(dir) => Arc::new(FileStore::open(dir)?),
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    };
    let app = router(AppState { store }, config.static_dir.clone())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, store = ?config.store, "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .route("/fonts/", get(fonts))
        .route("/defaults/", get(defaults))
        .route("/document/", get(list_documents).post(create_document))
        .route(
            "/document/:id/",
            get(get_document).put(put_document).delete(delete_document),
        )
        .route("/pdf/:id/", get(render_pdf))
        .fallback(fallback)
        .with_state(Arc::new(state));
    if let Some(dir) = static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }
    recover_panics(app)
}

fn recover_panics(app: Router) -> Router {
    app.layer(CatchPanicLayer::custom(panic_response))
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if let Some(dir) = &config.static_dir {
        if !dir.is_dir() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--static-dir is not a directory")
                .with_path(dir));
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

async fn fonts() -> Response {
    match run_blocking(list_font_families).await {
        Ok(mut names) => {
            names.sort();
            names.dedup();
            json_response(json!({ "fonts": names }))
        }
        Err(err) => error_response(err),
    }
}

async fn defaults() -> Response {
    json_response(json!({
        "document": Document::default(),
        "length_pattern": LENGTH_PATTERN,
    }))
}

async fn list_documents(State(state): State<Arc<AppState>>) -> Response {
    match with_store(&state, |store| store.list()).await {
        Ok(documents) => json_response(json!({ "documents": documents })),
        Err(err) => error_response(err),
    }
}

async fn create_document(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let doc = match parse_document(&body) {
        Ok(doc) => doc,
        Err(err) => return error_response(err),
    };
    match with_store(&state, move |store| store.add(doc)).await {
        Ok(doc) => {
            tracing::info!(id = ?doc.id, "created document");
            json_response_with_status(StatusCode::CREATED, &doc)
        }
        Err(err) => error_response(err),
    }
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(err) => return error_response(err),
    };
    match with_store(&state, move |store| store.fetch(id)).await {
        Ok(doc) => json_response_with_status(StatusCode::OK, &doc),
        Err(err) => error_response(err),
    }
}

async fn put_document(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(err) => return error_response(err),
    };
    let mut doc = match parse_document(&body) {
        Ok(doc) => doc,
        Err(err) => return error_response(err),
    };
    doc.id = Some(id);
    match with_store(&state, move |store| store.update(&doc).map(|()| doc)).await {
        Ok(doc) => json_response_with_status(StatusCode::OK, &doc),
        Err(err) => error_response(err),
    }
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(err) => return error_response(err),
    };
    match with_store(&state, move |store| store.delete(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn render_pdf(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(err) => return error_response(err),
    };
    let rendered = with_store(&state, move |store| {
        let doc = store.fetch(id)?;
        doc.render_pdf(Vec::new())
    })
    .await;
    match rendered {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/pdf"),
            );
            response
        }
        Err(err) => error_response(err),
    }
}

/// Runs a store operation on the blocking pool; `FileStore` takes file locks and fsyncs.
async fn with_store<T, F>(state: &AppState, work: F) -> Result<T, Error>
where
    F: FnOnce(&dyn DocumentStore) -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    run_blocking(move || work(store.as_ref())).await
}

/// GET without a trailing slash is redirected to the slashed route when one exists.
async fn fallback(method: Method, uri: Uri) -> Response {
    if method == Method::GET {
        if let Some(location) = slashed_route(uri.path()) {
            let location = match uri.query() {
                Some(query) => format!("{location}?{query}"),
                None => location,
            };
            if let Ok(value) = HeaderValue::from_str(&location) {
                return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, value)]).into_response();
            }
        }
    }
    error_response(
        Error::new(ErrorKind::NotFound).with_message(format!("no route for {}", uri.path())),
    )
}

fn slashed_route(path: &str) -> Option<String> {
    if path.ends_with('/') {
        return None;
    }
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let matches = match segments.as_slice() {
        ["fonts"] | ["defaults"] | ["document"] => true,
        ["document", id] | ["pdf", id] => !id.is_empty(),
        _ => false,
    };
    matches.then(|| format!("{path}/"))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("handler panicked");
    tracing::error!(panic = detail, "request handler panicked");
    error_response(Error::new(ErrorKind::Internal).with_message("internal server error"))
}

async fn run_blocking<T, F>(work: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("render task failed")
            .with_source(err)
    })?
}

fn parse_id(raw: &str) -> Result<DocumentId, Error> {
    raw.parse::<DocumentId>().map_err(|_| {
        Error::new(ErrorKind::NotFound).with_message(format!("document {raw} does not exist"))
    })
}

fn parse_document(body: &[u8]) -> Result<Document, Error> {
    serde_json::from_slice(body).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid document json: {err}"))
            .with_source(err)
    })
}

fn json_response(payload: serde_json::Value) -> Response {
    Json(payload).into_response()
}

fn json_response_with_status<T: Serialize>(status: StatusCode, payload: &T) -> Response {
    (status, Json(payload)).into_response()
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Native | ErrorKind::Corrupt | ErrorKind::Io | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(err.kind());
    if status.is_server_error() {
        tracing::warn!(error = %err, "request failed");
    }
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
        },
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::{
        AppState, ServeConfig, StoreConfig, healthz, router, parse_document, parse_id, recover_panics, serve,
        slashed_route, status_for, validate_config,
    };
    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::Response;
    use axum::routing::get;
    use fs2::FileExt;
    use pdfapp::api::{ErrorKind, FileStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn config(bind: &str) -> ServeConfig {
        ServeConfig {
            bind: bind.parse().expect("bind"),
            store: StoreConfig::Memory,
            static_dir: None,
            allow_non_loopback: false,
            max_body_bytes: 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn serve_rejects_non_loopback_bind() {
        let err = serve(config("0.0.0.0:0")).await.expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn loopback_config_is_accepted() {
        validate_config(&config("127.0.0.1:0")).expect("config ok");
        validate_config(&config("[::1]:0")).expect("config ok");
    }

    #[test]
    fn non_loopback_allowed_with_opt_in() {
        let config = ServeConfig {
            allow_non_loopback: true,
            ..config("0.0.0.0:0")
        };
        validate_config(&config).expect("config ok");
    }

    #[test]
    fn zero_body_limit_is_rejected() {
        let config = ServeConfig {
            max_body_bytes: 0,
            ..config("127.0.0.1:0")
        };
        let err = validate_config(&config).expect_err("zero limit");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn missing_static_dir_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = ServeConfig {
            static_dir: Some(temp.path().join("absent")),
            ..config("127.0.0.1:0")
        };
        let err = validate_config(&config).expect_err("missing dir");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.path().is_some());
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::Usage), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::Native), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::Corrupt), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ids_must_be_numeric() {
        assert_eq!(parse_id("12").expect("id"), 12);
        assert_eq!(parse_id("abc").expect_err("bad").kind(), ErrorKind::NotFound);
        assert_eq!(parse_id("-1").expect_err("bad").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn malformed_bodies_are_usage_errors() {
        assert_eq!(parse_document(b"{").expect_err("bad").kind(), ErrorKind::Usage);
        let doc = parse_document(br#"{"Text":"hi"}"#).expect("doc");
        assert_eq!(doc.text, "hi");
    }

    #[test]
    fn slashless_paths_map_to_known_routes() {
        assert_eq!(slashed_route("/document/1").as_deref(), Some("/document/1/"));
        assert_eq!(slashed_route("/pdf/3").as_deref(), Some("/pdf/3/"));
        assert_eq!(slashed_route("/fonts").as_deref(), Some("/fonts/"));
        assert_eq!(slashed_route("/document").as_deref(), Some("/document/"));
        assert_eq!(slashed_route("/document/1/"), None);
        assert_eq!(slashed_route("/document/1/extra"), None);
        assert_eq!(slashed_route("/nowhere"), None);
    }

    #[tokio::test]
    async fn handler_panics_become_error_envelopes() {
        async fn boom() -> Response {
            panic!("handler exploded")
        }

        let app = recover_panics(
            Router::new()
                .route("/boom", get(boom))
                .route("/healthz", get(healthz)),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let (status, body, after) = tokio::task::spawn_blocking(move || {
            let (status, body) = match ureq::get(&format!("http://{addr}/boom")).call() {
                Err(ureq::Error::Status(code, resp)) => (code, resp.into_string().expect("body")),
                other => panic!("expected an error status, got {:?}", other.map(|r| r.status())),
            };
            let after = ureq::get(&format!("http://{addr}/healthz"))
                .call()
                .expect("healthz")
                .status();
            (status, body, after)
        })
        .await
        .expect("join");

        assert_eq!(status, 500);
        let value: serde_json::Value = serde_json::from_str(&body).expect("json");
        assert_eq!(value["error"]["kind"], "Internal");
        assert_eq!(after, 200);
    }

    #[tokio::test]
    async fn locked_store_does_not_stall_other_requests() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("store");
        let lock = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(temp.path().join(".lock"))
            .expect("lock file");
        lock.lock_exclusive().expect("hold lock");

        let app = router(
            AppState {
                store: Arc::new(store),
            },
            None,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let (health, listed) = tokio::task::spawn_blocking(move || {
            let listing = std::thread::spawn(move || {
                ureq::get(&format!("http://{addr}/document/"))
                    .call()
                    .map(|resp| resp.status())
                    .map_err(|err| err.to_string())
            });
            std::thread::sleep(Duration::from_millis(100));
            let agent = ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(5))
                .build();
            let health = agent
                .get(&format!("http://{addr}/healthz"))
                .call()
                .expect("healthz while store is locked")
                .status();
            assert!(!listing.is_finished(), "listing should wait for the lock");
            drop(lock);
            (health, listing.join().expect("join"))
        })
        .await
        .expect("join");

        assert_eq!(health, 200);
        assert_eq!(listed, Ok(200));
    }
}
