//! HTTP 请求 span
//!
//! 每个请求一个 `http.request` span，附带租户头，便于按租户检索日志。

use axum::http::Request;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{MakeSpan, TraceLayer},
};
use tracing::{Span, info_span};

use crate::handlers::PROJECT_ID_HEADER;

pub type HttpTraceLayer = TraceLayer<SharedClassifier<ServerErrorsAsFailures>, HttpMakeSpan>;

pub fn http_trace_layer() -> HttpTraceLayer {
    TraceLayer::new_for_http().make_span_with(HttpMakeSpan)
}

#[derive(Clone, Debug, Default)]
pub struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let tenant = request
            .headers()
            .get(PROJECT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        info_span!(
            "http.request",
            method = %request.method(),
            uri = %request.uri().path(),
            version = ?request.version(),
            tenant = %tenant
        )
    }
}
