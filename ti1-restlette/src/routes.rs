use crate::listing::{
    Listing, CALLS, CALLS_FOR_JOURNEY, CALLS_FOR_JOURNEY_LIMIT, CALLS_FOR_JOURNEY_ORDER,
    JOURNEYS, JOURNEY_BY_ID,
};
use crate::pages;
use crate::{ApiError, JourneyCallsResponse, ListResponse, QueryParams};
use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use ti1_core::{project, OrderedRecord, QueryBuilder, QueryExecutor, Ti1Error};
use tracing::{debug, error};

const QUERY_FAILED: &str = "Database query failed";

#[derive(Clone)]
struct RestletteState {
    executor: Arc<dyn QueryExecutor>,
}

pub fn build_restlette_router(executor: Arc<dyn QueryExecutor>) -> Router {
    let state = RestletteState { executor };

    Router::new()
        .route("/", get(pages::home).fallback(method_not_allowed_handler))
        .route("/status", get(status_handler).fallback(method_not_allowed_handler))
        .route("/calls", get(calls_handler).fallback(method_not_allowed_handler))
        .route("/journey", get(journeys_handler).fallback(method_not_allowed_handler))
        .route("/journey/get", get(journeys_handler).fallback(method_not_allowed_handler))
        .route(
            "/journey/calls",
            get(journey_calls_handler).fallback(method_not_allowed_handler),
        )
        .fallback(not_found_handler)
        .with_state(state)
}

async fn status_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn not_found_handler() -> ApiError {
    ApiError::not_found("Not Found")
}

async fn method_not_allowed_handler() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

async fn calls_handler(
    State(state): State<RestletteState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ListResponse>, ApiError> {
    list(&state, &CALLS, QueryParams::parse(query.as_deref())).await
}

async fn journeys_handler(
    State(state): State<RestletteState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ListResponse>, ApiError> {
    list(&state, &JOURNEYS, QueryParams::parse(query.as_deref())).await
}

async fn list(
    state: &RestletteState,
    listing: &Listing,
    params: QueryParams,
) -> Result<Json<ListResponse>, ApiError> {
    let data = fetch(state, listing.build(&params), QUERY_FAILED, "Failed to scan rows").await?;
    Ok(Json(ListResponse {
        count: data.len(),
        data,
        params,
    }))
}

async fn journey_calls_handler(
    State(state): State<RestletteState>,
    RawQuery(query): RawQuery,
) -> Result<Json<JourneyCallsResponse>, ApiError> {
    let params = QueryParams::parse(query.as_deref());

    let raw_id = params.get("id");
    if raw_id.is_empty() {
        return Err(ApiError::bad_request("Missing required parameter: id"));
    }
    // A non-integer id answers 404 like an unknown one, not 400.
    let id: i64 = raw_id
        .parse()
        .map_err(|_| ApiError::not_found("Invalid id parameter: must be an integer"))?;

    let mut journey_query = QueryBuilder::new(JOURNEY_BY_ID);
    journey_query.add_equality("id", id);
    let journey = fetch(&state, journey_query, QUERY_FAILED, "Failed to scan journey")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Journey not found"))?;

    let mut calls_query = QueryBuilder::new(CALLS_FOR_JOURNEY);
    calls_query
        .add_equality("estimatedvehiclejourney", id)
        .order_by(CALLS_FOR_JOURNEY_ORDER)
        .add_limit(CALLS_FOR_JOURNEY_LIMIT.resolve(params.get("limit")));
    let calls = fetch(&state, calls_query, "Failed to query calls", "Failed to scan calls").await?;

    Ok(Json(JourneyCallsResponse {
        journey,
        count: calls.len(),
        calls,
        params,
    }))
}

/// Run `qb` and project its rows. Failures are logged in full and answered with
/// the given public message only.
async fn fetch(
    state: &RestletteState,
    qb: QueryBuilder,
    query_failed: &'static str,
    scan_failed: &'static str,
) -> Result<Vec<OrderedRecord>, ApiError> {
    let (sql, args) = qb.into_parts();
    debug!(%sql, args = args.len(), "dispatching query");

    let to_api_error = |err: Ti1Error| {
        error!(error = %err, %sql, "query failed");
        match err {
            Ti1Error::Scan(_) => ApiError::internal(scan_failed),
            _ => ApiError::internal(query_failed),
        }
    };

    let rows = state.executor.run(&sql, &args).await.map_err(to_api_error)?;
    project(rows).map_err(to_api_error)
}
