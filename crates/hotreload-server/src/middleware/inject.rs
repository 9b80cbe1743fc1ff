//! Live reload script injection.
//!
//! Appends the client script tag to HTML responses so pages connect to the
//! live reload endpoint without template changes.

use std::sync::Arc;

use axum::body::{Body, HttpBody};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Largest HTML body that will be buffered for injection.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Result of [`inject_script`].
#[derive(Debug, PartialEq, Eq)]
pub enum Injection {
    /// The fragment was inserted; contains the new body.
    Injected(Vec<u8>),
    /// The body is content-encoded and was left untouched.
    SkippedEncoded,
}

/// Insert `fragment` into an HTML body.
///
/// The fragment goes before the last `</body>` (case-insensitive), or at the
/// end when there is none. Bodies with a content encoding other than
/// `identity` cannot be edited safely and are skipped.
pub fn inject_script(body: &[u8], content_encoding: Option<&str>, fragment: &str) -> Injection {
    if content_encoding.is_some_and(|encoding| !encoding.trim().eq_ignore_ascii_case("identity")) {
        return Injection::SkippedEncoded;
    }

    let position = find_closing_body(body).unwrap_or(body.len());
    let mut injected = Vec::with_capacity(body.len() + fragment.len());
    injected.extend_from_slice(&body[..position]);
    injected.extend_from_slice(fragment.as_bytes());
    injected.extend_from_slice(&body[position..]);
    Injection::Injected(injected)
}

/// Byte offset of the last `</body>` tag.
fn find_closing_body(body: &[u8]) -> Option<usize> {
    const TAG: &[u8] = b"</body>";

    body.windows(TAG.len())
        .rposition(|window| window.eq_ignore_ascii_case(TAG))
}

/// Axum middleware injecting `fragment` into successful HTML responses.
pub(crate) async fn inject_live_reload(
    State(fragment): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Response {
    let is_head = request.method() == Method::HEAD;
    let response = next.run(request).await;

    if is_head || response.status() != StatusCode::OK || !is_html(&response) {
        return response;
    }
    let length = known_length(&response);
    if length > MAX_BODY_BYTES as u64 {
        tracing::warn!(
            length,
            "Live reload script not injected: response is too large to buffer"
        );
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to buffer HTML response for script injection");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let encoding = parts
        .headers
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok());

    match inject_script(&bytes, encoding, &fragment) {
        Injection::Injected(injected) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(injected))
        }
        Injection::SkippedEncoded => {
            tracing::warn!(
                encoding = encoding.unwrap_or_default(),
                "Live reload script not injected: response is content-encoded"
            );
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

/// Lower bound on the body size, from `Content-Length` or the body itself.
fn known_length(response: &Response) -> u64 {
    let declared: u64 = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);

    declared.max(response.body().size_hint().lower())
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    const FRAGMENT: &str = "<script src=\"/lr.js\"></script>";

    fn injected(body: &str, encoding: Option<&str>) -> String {
        match inject_script(body.as_bytes(), encoding, FRAGMENT) {
            Injection::Injected(bytes) => String::from_utf8(bytes).unwrap(),
            Injection::SkippedEncoded => panic!("injection skipped"),
        }
    }

    #[test]
    fn test_injects_before_closing_body() {
        assert_eq!(
            injected("<html><body><p>hi</p></body></html>", None),
            "<html><body><p>hi</p><script src=\"/lr.js\"></script></body></html>"
        );
    }

    #[test]
    fn test_closing_body_is_case_insensitive() {
        assert_eq!(
            injected("<BODY>x</BODY>", None),
            "<BODY>x<script src=\"/lr.js\"></script></BODY>"
        );
    }

    #[test]
    fn test_uses_last_closing_body() {
        let body = "<body><pre>&lt;/body&gt; </body></pre></body>";

        assert!(injected(body, None).ends_with("</pre><script src=\"/lr.js\"></script></body>"));
    }

    #[test]
    fn test_appends_without_closing_body() {
        assert_eq!(
            injected("<p>fragment</p>", None),
            "<p>fragment</p><script src=\"/lr.js\"></script>"
        );
    }

    #[test]
    fn test_identity_encoding_is_injected() {
        assert!(injected("<body></body>", Some("identity")).contains(FRAGMENT));
    }

    fn html_app(body: Vec<u8>) -> Router {
        Router::new()
            .route(
                "/",
                get(move || {
                    let body = body.clone();
                    async move { ([(header::CONTENT_TYPE, "text/html")], body) }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                Arc::<str>::from(FRAGMENT),
                inject_live_reload,
            ))
    }

    async fn fetch(app: Router) -> (StatusCode, usize, bool) {
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let injected = bytes.windows(FRAGMENT.len()).any(|w| w == FRAGMENT.as_bytes());
        (status, bytes.len(), injected)
    }

    #[tokio::test]
    async fn test_middleware_injects_html() {
        let body = b"<html><body>page</body></html>".to_vec();
        let expected_len = body.len() + FRAGMENT.len();

        assert_eq!(fetch(html_app(body)).await, (StatusCode::OK, expected_len, true));
    }

    #[tokio::test]
    async fn test_oversized_html_passes_through() {
        let body = vec![b'x'; MAX_BODY_BYTES + 1];

        assert_eq!(
            fetch(html_app(body)).await,
            (StatusCode::OK, MAX_BODY_BYTES + 1, false)
        );
    }

    #[test]
    fn test_encoded_body_is_skipped() {
        assert_eq!(
            inject_script(b"\x1f\x8b...", Some("gzip"), FRAGMENT),
            Injection::SkippedEncoded
        );
        assert_eq!(
            inject_script(b"...", Some("br"), FRAGMENT),
            Injection::SkippedEncoded
        );
    }
}
