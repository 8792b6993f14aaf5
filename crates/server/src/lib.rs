//! Static file server for the reader's web assets.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Content type for a file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "txt" => TEXT_PLAIN,
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path resolves outside the web root.
    Forbidden,
    /// The path is not valid percent-encoded UTF-8.
    Malformed,
}

/// Maps a request path onto a file below `root`.
///
/// `/` means `/index.html`. The path is percent-decoded and normalized
/// lexically; anything that lands on or above `root` is forbidden.
pub fn resolve_request_path(root: &Path, raw_path: &str) -> Result<PathBuf, PathError> {
    let decoded = urlencoding::decode(raw_path).map_err(|_| PathError::Malformed)?;
    let decoded = if decoded == "/" {
        "/index.html"
    } else {
        &*decoded
    };

    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or(PathError::Malformed)?),
            Component::ParentDir => {
                parts.pop().ok_or(PathError::Forbidden)?;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return Err(PathError::Forbidden),
        }
    }
    if parts.is_empty() {
        return Err(PathError::Forbidden);
    }

    let mut path = root.to_path_buf();
    path.extend(parts);
    Ok(path)
}

fn text_response(status: StatusCode, body: &'static str) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// Serves one request path from `root`.
pub async fn serve_path(root: &Path, raw_path: &str) -> Response {
    let path = match resolve_request_path(root, raw_path) {
        Ok(path) => path,
        Err(PathError::Forbidden) => {
            tracing::warn!("forbidden path {raw_path:?}");
            return text_response(StatusCode::FORBIDDEN, "Forbidden");
        }
        Err(PathError::Malformed) => {
            tracing::warn!("malformed path {raw_path:?}");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            tracing::info!("GET {raw_path} -> {}", path.display());
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type_for(&path)),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                bytes,
            )
                .into_response()
        }
        Err(err) => {
            tracing::debug!("GET {raw_path}: {err}");
            text_response(StatusCode::NOT_FOUND, "Not found")
        }
    }
}

async fn static_handler(State(root): State<Arc<PathBuf>>, uri: Uri) -> Response {
    serve_path(&root, uri.path()).await
}

pub fn router(root: PathBuf) -> Router {
    Router::new()
        .fallback(static_handler)
        .with_state(Arc::new(root))
}

/// Serves `root` on `addr` until the process is stopped.
pub async fn serve(root: PathBuf, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!("POH Reader running at http://{addr} serving {}", root.display());
    axum::serve(listener, router(root))
        .await
        .context("static server stopped")
}
