use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::errors::ColdVaultError;
use crate::manager::RetrievalOutcome;
use crate::models::record::INDEX_FILE_CONVENTION;
use crate::models::ArchiveRecord;

use super::AppState;

/// Client's declared willingness to wait, in seconds (`0` = any delay).
pub const ASYNC_ACCEPT_HEADER: &str = "x-dap-async-accept";
/// Sent with 400 when the client did not declare async acceptance.
pub const ASYNC_REQUIRED_HEADER: &str = "x-dap-async-required";
/// Sent with 202 when a retrieval has been queued.
pub const ASYNC_ACCEPTED_HEADER: &str = "x-dap-async-accepted";
/// Query-string equivalent of the accept header; wins when both are present
/// so result links can carry the declaration in the URL.
pub const ASYNC_QUERY_PARAM: &str = "async";

/// Metadata responses are synthesized from the archive record, never from
/// the payload, so they are always served immediately.
const METADATA_SUFFIXES: [&str; 4] = [".dds", ".das", ".ddx", ".dmr"];

/// The client's declared tolerance for deferred responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncTolerance {
    /// No usable declaration: async responses must be refused with 400.
    Undeclared,
    /// Willing to wait however long it takes.
    Any,
    /// Willing to wait at most this many seconds.
    Limited(i64),
}

/// Extract the tolerance from the request. A usable `async` query parameter
/// overrides the accept header; an unparsable query value falls back to the
/// header, and only when neither yields a value is the request undeclared.
pub fn parse_tolerance(params: &HashMap<String, String>, headers: &HeaderMap) -> AsyncTolerance {
    if let Some(value) = params.get(ASYNC_QUERY_PARAM) {
        if let Some(tolerance) = parse_declared_value(value) {
            return tolerance;
        }
    }

    headers
        .get(ASYNC_ACCEPT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_declared_value)
        .unwrap_or(AsyncTolerance::Undeclared)
}

fn parse_declared_value(value: &str) -> Option<AsyncTolerance> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("any") {
        return Some(AsyncTolerance::Any);
    }
    match value.parse::<i64>() {
        Ok(0) => Some(AsyncTolerance::Any),
        Ok(secs) if secs > 0 => Some(AsyncTolerance::Limited(secs)),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum NegotiationOutcome {
    Accept,
    /// The client never declared a tolerance.
    RequireAsync,
    /// The declared tolerance is shorter than the estimated wait.
    TooSlow,
}

/// Decide whether a deferred response is acceptable to this client.
pub fn negotiate(tolerance: AsyncTolerance, estimate_secs: i64) -> NegotiationOutcome {
    match tolerance {
        AsyncTolerance::Undeclared => NegotiationOutcome::RequireAsync,
        AsyncTolerance::Any => NegotiationOutcome::Accept,
        AsyncTolerance::Limited(secs) if secs >= estimate_secs => NegotiationOutcome::Accept,
        AsyncTolerance::Limited(_) => NegotiationOutcome::TooSlow,
    }
}

#[derive(Debug, Serialize)]
struct AcceptedResponse {
    status: &'static str,
    estimate_seconds: i64,
    cache_persist_seconds: i64,
    result_link: String,
}

#[derive(Debug, Serialize)]
struct PendingResponse {
    status: &'static str,
    estimate_seconds: i64,
}

/// Serve one DAP resource path, negotiating an asynchronous retrieval when
/// the payload is not in the cache.
pub async fn dap_request(
    State(state): State<Arc<AppState>>,
    UrlPath(path): UrlPath<String>,
    Query(params): Query<HashMap<String, String>>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Response {
    tracing::debug!("DAP request: {}", path);

    if let Some(base) = strip_metadata_suffix(&path) {
        return serve_metadata(&state, base, &path).await;
    }

    if path.ends_with(INDEX_FILE_CONVENTION) {
        if let Some(response) = serve_index(&state, &path).await {
            return response;
        }
    }

    let Some((_, record)) = state.registry.archive_record(&path).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("No such resource: {}", path),
        );
    };

    if record.is_cached() {
        return serve_cached_payload(&record).await;
    }

    let tolerance = parse_tolerance(&params, &headers);
    let default_delay = state.manager.retrieval_delay_secs();

    // The async-capability gates come first: a client that never declared a
    // tolerance gets 400 (and an impatient one 412) whether or not a
    // retrieval is already underway.
    match negotiate(tolerance, default_delay) {
        NegotiationOutcome::RequireAsync => {
            let mut response = error_response(
                StatusCode::BAD_REQUEST,
                "async_required",
                &format!(
                    "Resource is in cold storage; retrieval takes about {}s. \
                     Declare an acceptable delay with the '{}' query parameter \
                     or the {} header.",
                    default_delay, ASYNC_QUERY_PARAM, ASYNC_ACCEPT_HEADER
                ),
            );
            if let Ok(value) = default_delay.to_string().parse() {
                response
                    .headers_mut()
                    .insert(ASYNC_REQUIRED_HEADER, value);
            }
            response
        }
        NegotiationOutcome::TooSlow => error_response(
            StatusCode::PRECONDITION_FAILED,
            "time",
            &format!(
                "Declared tolerance is below the estimated retrieval time of {}s",
                default_delay
            ),
        ),
        NegotiationOutcome::Accept => {
            let key = format!("{}{}", record.vault, record.resource_id);
            if state.manager.already_requested(&key).await {
                respond_for_pending(&state, &record).await
            } else {
                let link = result_link(&path, raw_query.as_deref(), &params, tolerance);
                respond_for_new_retrieval(&state, &record, link).await
            }
        }
    }
}

/// A retrieval is already outstanding: serve the payload once it has landed
/// in the cache, otherwise report the remaining wait with 409.
async fn respond_for_pending(state: &AppState, record: &ArchiveRecord) -> Response {
    match state.manager.initiate_retrieval(record).await {
        Ok(RetrievalOutcome::Fetched) => serve_cached_payload(record).await,
        Ok(RetrievalOutcome::Pending(estimate)) => (
            StatusCode::CONFLICT,
            Json(PendingResponse {
                status: "pending",
                estimate_seconds: estimate,
            }),
        )
            .into_response(),
        Ok(RetrievalOutcome::Refused) => store_refused_response(),
        Err(e) => internal_error(&e),
    }
}

async fn respond_for_new_retrieval(
    state: &AppState,
    record: &ArchiveRecord,
    result_link: String,
) -> Response {
    match state.manager.initiate_retrieval(record).await {
        Ok(RetrievalOutcome::Refused) => store_refused_response(),
        Ok(RetrievalOutcome::Fetched) => serve_cached_payload(record).await,
        Ok(RetrievalOutcome::Pending(estimate)) => {
            let body = AcceptedResponse {
                status: "accepted",
                estimate_seconds: estimate,
                cache_persist_seconds: state.config.cache_persist_secs,
                result_link,
            };

            let mut response =
                (StatusCode::ACCEPTED, Json(body)).into_response();
            if let Ok(value) = estimate.to_string().parse() {
                response
                    .headers_mut()
                    .insert(ASYNC_ACCEPTED_HEADER, value);
            }
            response
        }
        Err(e) => internal_error(&e),
    }
}

fn store_refused_response() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "store_unavailable",
        "The archival store refused to start a retrieval job; retry later",
    )
}

/// Build the link a 202 client should poll: the original request URL with
/// the async declaration folded into its query string. A declaration that
/// arrived via header (or not at all in the query) is appended; one already
/// in the query is kept as the client wrote it.
fn result_link(
    path: &str,
    raw_query: Option<&str>,
    params: &HashMap<String, String>,
    tolerance: AsyncTolerance,
) -> String {
    let declared = match tolerance {
        AsyncTolerance::Limited(secs) => secs.to_string(),
        _ => "0".to_string(),
    };
    let query_declares = params
        .get(ASYNC_QUERY_PARAM)
        .is_some_and(|v| parse_declared_value(v).is_some());

    match raw_query {
        Some(query) if !query.is_empty() => {
            if query_declares {
                format!("/dap/{}?{}", path, query)
            } else {
                format!("/dap/{}?{}&{}={}", path, query, ASYNC_QUERY_PARAM, declared)
            }
        }
        _ => format!("/dap/{}?{}={}", path, ASYNC_QUERY_PARAM, declared),
    }
}

fn strip_metadata_suffix(path: &str) -> Option<&str> {
    METADATA_SUFFIXES
        .iter()
        .find(|suffix| path.ends_with(*suffix))
        .map(|suffix| &path[..path.len() - suffix.len()])
}

/// Serve a metadata document straight from the archive record. The record
/// caches these under the bare suffix name ("dds", "das", ...).
async fn serve_metadata(state: &AppState, base_path: &str, full_path: &str) -> Response {
    let Some((_, record)) = state.registry.archive_record(base_path).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("No such resource: {}", base_path),
        );
    };

    let suffix = &full_path[base_path.len() + 1..];
    let Some(content) = record.metadata.get(suffix) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("No {} metadata for resource: {}", suffix, base_path),
        );
    };

    let content_type = match suffix {
        "ddx" | "dmr" => "text/xml",
        _ => "text/plain",
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        content.clone(),
    )
        .into_response()
}

/// Index documents live in the vault mirror, never in cold storage.
async fn serve_index(state: &AppState, path: &str) -> Option<Response> {
    let vault_name = state.registry.resolve_vault_name(path).await?;
    let vault = state.registry.vault(&vault_name).await?;
    let resource_id = &path[vault_name.len()..];
    let index = vault.index_doc(resource_id).await?;

    Some(
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            index.content,
        )
            .into_response(),
    )
}

async fn serve_cached_payload(record: &ArchiveRecord) -> Response {
    let Some(cache_file) = record.cache_file.as_ref() else {
        return internal_error(&ColdVaultError::Validation(format!(
            "Archive record has no cache location: {}",
            record.combined_id()
        )));
    };

    let bytes = match tokio::fs::read(cache_file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(
                "Failed to read cached payload {}: {}",
                cache_file.display(),
                e
            );
            return internal_error(&e.into());
        }
    };

    let mime = mime_guess::from_path(&record.resource_id)
        .first_or_octet_stream()
        .to_string();

    let mut response =
        (StatusCode::OK, [(header::CONTENT_TYPE, mime)], bytes).into_response();
    if let Some(last_modified) = record.last_modified {
        if let Ok(value) = last_modified.to_rfc2822().parse() {
            response.headers_mut().insert(header::LAST_MODIFIED, value);
        }
    }
    response
}

fn internal_error(e: &ColdVaultError) -> Response {
    tracing::error!("DAP request failed: {}", e);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        &e.to_string(),
    )
}

pub(super) fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "message": message,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_headers() -> HeaderMap {
        HeaderMap::new()
    }

    fn headers_with_accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ASYNC_ACCEPT_HEADER, value.parse().unwrap());
        headers
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_tolerance_undeclared_without_header_or_param() {
        assert_eq!(
            parse_tolerance(&params(&[]), &no_headers()),
            AsyncTolerance::Undeclared
        );
    }

    #[test]
    fn test_tolerance_from_header() {
        assert_eq!(
            parse_tolerance(&params(&[]), &headers_with_accept("3600")),
            AsyncTolerance::Limited(3_600)
        );
    }

    #[test]
    fn test_tolerance_query_param_overrides_header() {
        assert_eq!(
            parse_tolerance(&params(&[("async", "120")]), &headers_with_accept("3600")),
            AsyncTolerance::Limited(120)
        );
    }

    #[test]
    fn test_tolerance_zero_and_any_mean_unbounded() {
        assert_eq!(
            parse_tolerance(&params(&[("async", "0")]), &no_headers()),
            AsyncTolerance::Any
        );
        assert_eq!(
            parse_tolerance(&params(&[("async", "any")]), &no_headers()),
            AsyncTolerance::Any
        );
        assert_eq!(
            parse_tolerance(&params(&[]), &headers_with_accept("ANY")),
            AsyncTolerance::Any
        );
    }

    #[test]
    fn test_tolerance_unparsable_query_falls_back_to_header() {
        assert_eq!(
            parse_tolerance(&params(&[("async", "soonish")]), &headers_with_accept("3600")),
            AsyncTolerance::Limited(3_600)
        );
        assert_eq!(
            parse_tolerance(&params(&[("async", "-5")]), &headers_with_accept("any")),
            AsyncTolerance::Any
        );
    }

    #[test]
    fn test_tolerance_garbage_counts_as_undeclared() {
        assert_eq!(
            parse_tolerance(&params(&[("async", "soonish")]), &no_headers()),
            AsyncTolerance::Undeclared
        );
        assert_eq!(
            parse_tolerance(&params(&[("async", "-5")]), &no_headers()),
            AsyncTolerance::Undeclared
        );
        assert_eq!(
            parse_tolerance(&params(&[]), &headers_with_accept("")),
            AsyncTolerance::Undeclared
        );
    }

    #[test]
    fn test_negotiate_undeclared_requires_async() {
        assert_eq!(
            negotiate(AsyncTolerance::Undeclared, 14_400),
            NegotiationOutcome::RequireAsync
        );
    }

    #[test]
    fn test_negotiate_any_accepts() {
        assert_eq!(
            negotiate(AsyncTolerance::Any, 14_400),
            NegotiationOutcome::Accept
        );
    }

    #[test]
    fn test_negotiate_limited_against_estimate() {
        assert_eq!(
            negotiate(AsyncTolerance::Limited(10), 14_400),
            NegotiationOutcome::TooSlow
        );
        assert_eq!(
            negotiate(AsyncTolerance::Limited(14_400), 14_400),
            NegotiationOutcome::Accept
        );
        assert_eq!(
            negotiate(AsyncTolerance::Limited(20_000), 14_400),
            NegotiationOutcome::Accept
        );
    }

    #[test]
    fn test_result_link_keeps_query_declaration_as_written() {
        assert_eq!(
            result_link(
                "noaa/data/sst.nc",
                Some("var=sst&async=any"),
                &params(&[("var", "sst"), ("async", "any")]),
                AsyncTolerance::Any,
            ),
            "/dap/noaa/data/sst.nc?var=sst&async=any"
        );
    }

    #[test]
    fn test_result_link_appends_header_declaration_to_query() {
        assert_eq!(
            result_link(
                "noaa/data/sst.nc",
                Some("var=sst"),
                &params(&[("var", "sst")]),
                AsyncTolerance::Limited(20_000),
            ),
            "/dap/noaa/data/sst.nc?var=sst&async=20000"
        );
    }

    #[test]
    fn test_result_link_without_query_declares_unbounded() {
        assert_eq!(
            result_link("noaa/data/sst.nc", None, &params(&[]), AsyncTolerance::Any),
            "/dap/noaa/data/sst.nc?async=0"
        );
    }

    #[test]
    fn test_strip_metadata_suffix() {
        assert_eq!(
            strip_metadata_suffix("noaa/data/sst.nc.dds"),
            Some("noaa/data/sst.nc")
        );
        assert_eq!(
            strip_metadata_suffix("noaa/data/sst.nc.dmr"),
            Some("noaa/data/sst.nc")
        );
        assert_eq!(strip_metadata_suffix("noaa/data/sst.nc"), None);
    }
}
