//! Per-request handling: resolve against the bundle, stream the file.

use std::convert::Infallible;

use futures_util::TryStreamExt;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full, StreamBody};
use hyper::body::{Bytes, Frame, Incoming};
use hyper::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use hyper::{Method, Request, Response, StatusCode};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::content::BundleProvider;

pub(crate) type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Answer one request. Never fails: every problem maps to a status code.
pub(crate) async fn handle(
    provider: &BundleProvider,
    request: Request<Incoming>,
) -> Result<Response<ResponseBody>, Infallible> {
    let head_only = match *request.method() {
        Method::GET => false,
        Method::HEAD => true,
        _ => return Ok(status_response(StatusCode::METHOD_NOT_ALLOWED)),
    };

    let path = request.uri().path();
    let Some(asset) = provider.resolve(path).await else {
        warn!(path = %path, "asset not found");
        return Ok(status_response(StatusCode::NOT_FOUND));
    };

    let file = match tokio::fs::File::open(&asset.path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path, error = %e, "failed to open asset");
            return Ok(status_response(StatusCode::NOT_FOUND));
        }
    };
    let length = file.metadata().await.ok().map(|m| m.len());

    let body = if head_only {
        empty_body()
    } else {
        StreamBody::new(ReaderStream::new(file).map_ok(Frame::data)).boxed_unsync()
    };

    debug!(path = %path, mime = asset.mime, ?length, "serving asset");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, asset.mime)
        .header(CACHE_CONTROL, "no-cache")
        .header(X_CONTENT_TYPE_OPTIONS, "nosniff");
    if let Some(length) = length {
        builder = builder.header(CONTENT_LENGTH, length);
    }
    Ok(builder
        .body(body)
        .unwrap_or_else(|_| status_response(StatusCode::INTERNAL_SERVER_ERROR)))
}

fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn status_response(status: StatusCode) -> Response<ResponseBody> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let body = Full::new(Bytes::from(reason))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}
