//! Response builders shared by both transports

use std::convert::Infallible;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use serde_json::Value;

use cms_mcp_json_rpc_server::{JsonRpcError, JsonRpcErrorObject, RequestId};

use crate::protocol::SESSION_ID_HEADER;

/// Body type of every response the server produces
pub type McpBody = UnsyncBoxBody<Bytes, Infallible>;

pub fn full_body(bytes: impl Into<Bytes>) -> McpBody {
    Full::new(bytes.into()).boxed_unsync()
}

pub fn empty_body() -> McpBody {
    Empty::<Bytes>::new().boxed_unsync()
}

fn with_status(status: StatusCode, body: McpBody) -> Response<McpBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

pub fn json_response(status: StatusCode, value: &Value) -> Response<McpBody> {
    let mut response = with_status(status, full_body(value.to_string()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub fn text_response(status: StatusCode, message: impl Into<String>) -> Response<McpBody> {
    let mut response = with_status(status, full_body(message.into()));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// `202 Accepted` with no body
pub fn accepted() -> Response<McpBody> {
    with_status(StatusCode::ACCEPTED, empty_body())
}

pub fn no_content() -> Response<McpBody> {
    with_status(StatusCode::NO_CONTENT, empty_body())
}

pub fn ok_empty() -> Response<McpBody> {
    with_status(StatusCode::OK, empty_body())
}

/// A transport-level rejection. With a request id the body is a JSON-RPC error keyed by it;
/// without one the body is plain text.
pub fn transport_error(
    status: StatusCode,
    id: Option<RequestId>,
    error: JsonRpcErrorObject,
) -> Response<McpBody> {
    match id {
        Some(id) => {
            let envelope = JsonRpcError::new(Some(id), error);
            let value = serde_json::to_value(&envelope).unwrap_or(Value::Null);
            json_response(status, &value)
        }
        None => text_response(status, error.message),
    }
}

/// Wrap a byte stream as a `text/event-stream` response
pub fn sse_response<S>(stream: S) -> Response<McpBody>
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let frames = stream.map(|bytes| Ok::<_, Infallible>(Frame::data(bytes)));
    let mut response = with_status(StatusCode::OK, StreamBody::new(frames).boxed_unsync());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

pub fn set_session_header(response: &mut Response<McpBody>, session_id: &str) {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
}
