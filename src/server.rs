//! HTTP tool dispatch
//!
//! A thin adapter in front of [`BookStore`]:
//!
//! - `GET /health` answers `ok`
//! - `POST /tools/{name}` takes a JSON argument object and answers JSON,
//!   except `get_book_archive`, which streams `application/zstd`
//!
//! The caller is identified by the `x-agent-id` header (default `system`).
//! When an API key is configured, `x-api-key` must match it.
//!
//! Errors are answered as `{"error": {"kind", "message", "retryable"}}` with
//! 400 for validation failures, 404 for missing paths, and 502 for backend
//! failures.

use crate::core::archive;
use crate::error::{BookshelfError, ErrorKind};
use crate::store::{BookStore, ReadResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures::{Future, TryStreamExt};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, Limited, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub type ResponseBody = UnsyncBoxBody<Bytes, BookshelfError>;

/// Largest accepted request body
pub const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Agent recorded when a request carries no `x-agent-id`
pub const DEFAULT_AGENT: &str = "system";

const API_KEY_HEADER: &str = "x-api-key";
const AGENT_HEADER: &str = "x-agent-id";

/// Why a request never reached the store
enum Reject {
    Unauthorized,
    UnknownTool(String),
    BadRequest(String),
    Store(BookshelfError),
}

impl From<BookshelfError> for Reject {
    fn from(err: BookshelfError) -> Self {
        Reject::Store(err)
    }
}

#[derive(Deserialize)]
struct BookArgs {
    book_id: String,
}

#[derive(Deserialize)]
struct PathArgs {
    book_id: String,
    path: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    book_id: String,
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct AssetArgs {
    book_id: String,
    asset_type: String,
    filename: String,
}

#[derive(Deserialize)]
struct UploadArgs {
    book_id: String,
    asset_type: String,
    filename: String,
    /// Standard base64
    content_base64: String,
}

#[derive(Deserialize)]
struct ListAssetsArgs {
    book_id: String,
    asset_type: Option<String>,
}

#[derive(Deserialize)]
struct GlobArgs {
    book_id: String,
    pattern: String,
}

#[derive(Deserialize)]
struct GrepArgs {
    book_id: String,
    pattern: String,
    glob: Option<String>,
    max_results: Option<usize>,
}

#[derive(Serialize)]
struct ContentBody {
    path: String,
    size: u64,
    file_hash: String,
    /// `utf-8` or `base64`
    encoding: &'static str,
    content: String,
}

impl From<ReadResult> for ContentBody {
    fn from(read: ReadResult) -> Self {
        let (encoding, content) = match std::str::from_utf8(&read.content) {
            Ok(text) => ("utf-8", text.to_string()),
            Err(_) => ("base64", BASE64.encode(&read.content)),
        };
        ContentBody {
            path: read.path,
            size: read.size,
            file_hash: read.file_hash,
            encoding,
            content,
        }
    }
}

#[derive(Serialize)]
struct AssetBody {
    path: String,
    content_type: String,
    size: u64,
    content_base64: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: String,
    retryable: bool,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

/// HTTP front end for one [`BookStore`]
pub struct Server {
    store: Arc<BookStore>,
    api_key: Option<String>,
}

impl Server {
    pub fn new(store: Arc<BookStore>, api_key: Option<String>) -> Self {
        Server { store, api_key }
    }

    pub fn store(&self) -> &Arc<BookStore> {
        &self.store
    }

    /// Answer one request. Never fails; errors become JSON responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<ResponseBody>, Infallible>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!("{} {}", method, path);

        let response = match (&method, path.as_str()) {
            (&Method::GET, "/health") => text(StatusCode::OK, "ok"),
            (&Method::POST, route) => match route.strip_prefix("/tools/") {
                Some(tool) => {
                    let tool = tool.to_string();
                    match self.call(&tool, req).await {
                        Ok(response) => response,
                        Err(reject) => reject_response(reject),
                    }
                }
                None => text(StatusCode::NOT_FOUND, "not found"),
            },
            _ => text(StatusCode::NOT_FOUND, "not found"),
        };
        Ok(response)
    }

    fn authorize<B>(&self, req: &Request<B>) -> Result<(), Reject> {
        let Some(expected) = &self.api_key else {
            return Ok(());
        };
        match req.headers().get(API_KEY_HEADER) {
            Some(given) if given.as_bytes() == expected.as_bytes() => Ok(()),
            _ => Err(Reject::Unauthorized),
        }
    }

    async fn call<B>(&self, tool: &str, req: Request<B>) -> Result<Response<ResponseBody>, Reject>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.authorize(&req)?;
        let agent = req
            .headers()
            .get(AGENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_AGENT)
            .to_string();

        let body = Limited::new(req.into_body(), MAX_REQUEST_BODY)
            .collect()
            .await
            .map_err(|e| Reject::BadRequest(format!("cannot read request body: {}", e)))?
            .to_bytes();

        let store = &self.store;
        let agent = agent.as_str();
        match tool {
            "list_books" => ok_json(&store.list_books(agent).await?),
            "read_content" => {
                let a: PathArgs = args(&body)?;
                let read = store.read_content(&a.book_id, &a.path, agent).await?;
                ok_json(&ContentBody::from(read))
            }
            "write_content" => {
                let a: WriteArgs = args(&body)?;
                ok_json(&store.write_content(&a.book_id, &a.path, a.content, agent).await?)
            }
            "delete_content" => {
                let a: PathArgs = args(&body)?;
                ok_json(&store.delete_content(&a.book_id, &a.path, agent).await?)
            }
            "read_summary" => {
                let a: PathArgs = args(&body)?;
                let read = store.read_summary(&a.book_id, &a.path, agent).await?;
                ok_json(&ContentBody::from(read))
            }
            "write_summary" => {
                let a: WriteArgs = args(&body)?;
                ok_json(&store.write_summary(&a.book_id, &a.path, a.content, agent).await?)
            }
            "delete_summary" => {
                let a: PathArgs = args(&body)?;
                ok_json(&store.delete_summary(&a.book_id, &a.path, agent).await?)
            }
            "upload_asset" => {
                let a: UploadArgs = args(&body)?;
                let data = BASE64
                    .decode(a.content_base64.as_bytes())
                    .map_err(|e| Reject::BadRequest(format!("content_base64: {}", e)))?;
                ok_json(
                    &store
                        .upload_asset(&a.book_id, &a.asset_type, &a.filename, data, agent)
                        .await?,
                )
            }
            "get_asset" => {
                let a: AssetArgs = args(&body)?;
                let asset = store
                    .get_asset(&a.book_id, &a.asset_type, &a.filename, agent)
                    .await?;
                ok_json(&AssetBody {
                    path: asset.path,
                    content_type: asset.content_type.to_string(),
                    size: asset.size,
                    content_base64: BASE64.encode(&asset.content),
                })
            }
            "list_assets" => {
                let a: ListAssetsArgs = args(&body)?;
                ok_json(
                    &store
                        .list_assets(&a.book_id, a.asset_type.as_deref(), agent)
                        .await?,
                )
            }
            "glob_search" => {
                let a: GlobArgs = args(&body)?;
                ok_json(&store.glob(&a.book_id, &a.pattern, agent).await?)
            }
            "grep_search" => {
                let a: GrepArgs = args(&body)?;
                ok_json(
                    &store
                        .grep(&a.book_id, &a.pattern, a.glob.as_deref(), a.max_results, agent)
                        .await?,
                )
            }
            "get_book_archive" => {
                let a: BookArgs = args(&body)?;
                let archive = store.get_book_archive(&a.book_id, agent).await?;
                let body = StreamBody::new(archive.stream.map_ok(Frame::data)).boxed_unsync();
                let mut response = Response::new(body);
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(archive::CONTENT_TYPE));
                if let Ok(value) =
                    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", archive.name))
                {
                    response.headers_mut().insert(CONTENT_DISPOSITION, value);
                }
                Ok(response)
            }
            "delete_book" => {
                let a: BookArgs = args(&body)?;
                ok_json(&store.delete_book(&a.book_id, agent).await?)
            }
            other => Err(Reject::UnknownTool(other.to_string())),
        }
    }

    /// Accept connections until `shutdown` resolves, then flush the journal
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        let http_server = ConnBuilder::new(TokioExecutor::new());
        info!("HTTP server running at http://{}", local_addr);

        tokio::pin!(shutdown);
        loop {
            // Accept connection or wait for shutdown
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, peer)) => {
                            let server = Arc::clone(&self);
                            let http_server = http_server.clone();
                            tokio::spawn(async move {
                                let service = service_fn(move |req| {
                                    let server = Arc::clone(&server);
                                    async move { server.handle(req).await }
                                });
                                let conn = http_server.serve_connection(TokioIo::new(socket), service);
                                if let Err(e) = conn.await {
                                    debug!("Connection error from {}: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.store.journal().flush().await;
        info!("Audit journal flushed");
        Ok(())
    }
}

fn args<T: DeserializeOwned>(body: &[u8]) -> Result<T, Reject> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| Reject::BadRequest(format!("invalid arguments: {}", e)))
}

fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn text(status: StatusCode, message: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(full(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({
                "error": {
                    "kind": ErrorKind::Backend.as_str(),
                    "message": e.to_string(),
                    "retryable": false,
                }
            })
            .to_string()
            .into_bytes(),
        ),
    };
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn ok_json<T: Serialize>(value: &T) -> Result<Response<ResponseBody>, Reject> {
    Ok(json(StatusCode::OK, value))
}

fn error_json(status: StatusCode, kind: &str, message: String, retryable: bool) -> Response<ResponseBody> {
    json(
        status,
        &ErrorEnvelope {
            error: ErrorBody {
                kind,
                message,
                retryable,
            },
        },
    )
}

fn reject_response(reject: Reject) -> Response<ResponseBody> {
    match reject {
        Reject::Unauthorized => error_json(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "missing or invalid x-api-key".to_string(),
            false,
        ),
        Reject::UnknownTool(tool) => error_json(
            StatusCode::NOT_FOUND,
            "UNKNOWN_TOOL",
            format!("unknown tool '{}'", tool),
            false,
        ),
        Reject::BadRequest(message) => error_json(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation.as_str(),
            message,
            false,
        ),
        Reject::Store(err) => {
            let kind = err.kind();
            let status = match kind {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Backend => StatusCode::BAD_GATEWAY,
                ErrorKind::AuditWriteFailure => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            };
            error_json(status, kind.as_str(), err.to_string(), kind.is_retryable())
        }
    }
}
