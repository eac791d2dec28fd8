//! Axum middleware running every application route through the optimizer

use crate::api::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    http::{header::CONTENT_LENGTH, HeaderValue},
    middleware::Next,
    response::Response,
};
use optimizer_lib::{models::QueryExecution, HandlerResponse, RequestInfo};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::warn;

/// Response extension a handler attaches to report executed queries
#[derive(Debug, Clone, Default)]
pub struct QueryReport(pub Vec<QueryExecution>);

/// Build the optimizer's view of an axum request
///
/// The endpoint uses the matched route template when available so that
/// `/users/1` and `/users/2` share statistics.
pub fn request_info(request: &Request) -> RequestInfo {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let mut info = RequestInfo::new(request.method().as_str(), path);
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            info.insert_header(name.as_str(), value);
        }
    }
    info
}

pub async fn optimize(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let info = request_info(&request);
    let stage = state.service.stage();

    let result = stage
        .process(&info, |context| async move {
            let mut request = request;
            request.extensions_mut().insert(context);

            let mut response = next.run(request).await;
            let status = response.status().as_u16();
            let size = response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            let queries = response
                .extensions_mut()
                .remove::<QueryReport>()
                .map(|report| report.0)
                .unwrap_or_default();

            Ok::<_, Infallible>(
                HandlerResponse::new(response, status)
                    .with_size(size)
                    .with_queries(queries),
            )
        })
        .await;

    let output = match result {
        Ok(output) => output,
        Err(never) => match never {},
    };

    let mut response = output.response.body;
    for (name, value) in output.headers.pairs() {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                response.headers_mut().insert(name, value);
            }
            Err(e) => warn!(header = name, error = %e, "Dropping invalid optimizer header"),
        }
    }
    response
}
