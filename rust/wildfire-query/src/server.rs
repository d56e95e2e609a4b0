use crate::{
    config::AppConfig,
    db,
    error::{Result, ServiceError},
    query::{Extent, PgSessions, QueryEngine, QueryRequest, QueryResponse, SessionSource},
    registry::{DatasetFamily, FieldKind},
    state::AppState,
};
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::connect_pool(&config).await?;
        let config = Arc::new(config);
        let query = QueryEngine::new(PgSessions::new(pool));
        let state = AppState::new(Arc::clone(&config), query);

        Ok(Self { config, state })
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "wildfire query service listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

pub fn router<S>(state: AppState<S>) -> Router
where
    S: SessionSource + Clone + 'static,
{
    Router::new()
        .route("/healthz", get(health))
        .route("/api/datasets", get(datasets))
        .route("/api/query", post(query::<S>))
        .route("/api/wcs/:layer", get(wcs_layer::<S>))
        .route("/api/additional/:layer", get(additional_layer::<S>))
        .route("/api/active-fires", get(active_fires::<S>))
        .route("/api/datasets/:family/:key/times", get(times::<S>))
        .route("/api/datasets/:family/:key/values/:field", get(values::<S>))
        .route("/api/datasets/:family/:key/extent/:field", get(extent::<S>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// JSON body whose rejections use the service error envelope.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ServiceError))]
struct JsonBody<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ServiceError))]
struct QueryParams<T>(T);

#[derive(Debug, Deserialize)]
struct SliceParams {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    sample: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    #[serde(default)]
    min_date: Option<String>,
    #[serde(default)]
    max_date: Option<String>,
    #[serde(default)]
    sample: Option<usize>,
}

#[derive(Serialize)]
struct DatasetSummary {
    family: DatasetFamily,
    key: &'static str,
    table: &'static str,
    time_column: &'static str,
    fields: Vec<FieldSummary>,
}

#[derive(Serialize)]
struct FieldSummary {
    name: &'static str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    categories: Option<Vec<&'static str>>,
}

#[derive(Serialize)]
struct TimesResponse {
    dataset: String,
    times: Vec<NaiveDateTime>,
}

#[derive(Serialize)]
struct ValuesResponse {
    field: String,
    values: Vec<String>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn datasets() -> Json<Vec<DatasetSummary>> {
    let listing = DatasetFamily::ALL
        .into_iter()
        .flat_map(|family| family.datasets().iter())
        .map(|dataset| {
            let descriptor = dataset.descriptor();
            DatasetSummary {
                family: descriptor.family,
                key: descriptor.key,
                table: descriptor.table,
                time_column: descriptor.time_column,
                fields: descriptor
                    .fields
                    .iter()
                    .map(|field| match field.kind {
                        FieldKind::Time => FieldSummary {
                            name: field.name,
                            kind: "time",
                            categories: None,
                        },
                        FieldKind::Numeric => FieldSummary {
                            name: field.name,
                            kind: "numeric",
                            categories: None,
                        },
                        FieldKind::Text { mapping } => FieldSummary {
                            name: field.name,
                            kind: "text",
                            categories: mapping
                                .map(|labels| labels.iter().map(|(label, _)| *label).collect()),
                        },
                    })
                    .collect(),
            }
        })
        .collect();
    Json(listing)
}

async fn query<S: SessionSource>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    enforce_api_key(&headers, &state.config)?;
    Ok(Json(state.query.execute(request).await?))
}

async fn wcs_layer<S: SessionSource>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(layer): Path<String>,
    QueryParams(params): QueryParams<SliceParams>,
) -> Result<Json<QueryResponse>> {
    enforce_api_key(&headers, &state.config)?;
    let response = state
        .query
        .wcs_layer(&layer, params.date.as_deref(), params.sample)
        .await?;
    Ok(Json(response))
}

async fn additional_layer<S: SessionSource>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(layer): Path<String>,
    QueryParams(params): QueryParams<SliceParams>,
) -> Result<Json<QueryResponse>> {
    enforce_api_key(&headers, &state.config)?;
    let response = state
        .query
        .additional_layer(&layer, params.date.as_deref(), params.sample)
        .await?;
    Ok(Json(response))
}

async fn active_fires<S: SessionSource>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    QueryParams(params): QueryParams<RangeParams>,
) -> Result<Json<QueryResponse>> {
    enforce_api_key(&headers, &state.config)?;
    let response = state
        .query
        .active_fires(
            params.min_date.as_deref(),
            params.max_date.as_deref(),
            params.sample,
        )
        .await?;
    Ok(Json(response))
}

async fn times<S: SessionSource>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path((family, key)): Path<(String, String)>,
) -> Result<Json<TimesResponse>> {
    enforce_api_key(&headers, &state.config)?;
    let family = DatasetFamily::parse(&family)?;
    let times = state.query.available_times(family, &key).await?;
    Ok(Json(TimesResponse {
        dataset: key,
        times,
    }))
}

async fn values<S: SessionSource>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path((family, key, field)): Path<(String, String, String)>,
) -> Result<Json<ValuesResponse>> {
    enforce_api_key(&headers, &state.config)?;
    let family = DatasetFamily::parse(&family)?;
    let values = state.query.distinct_values(family, &key, &field).await?;
    Ok(Json(ValuesResponse { field, values }))
}

async fn extent<S: SessionSource>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path((family, key, field)): Path<(String, String, String)>,
) -> Result<Json<Extent>> {
    enforce_api_key(&headers, &state.config)?;
    let family = DatasetFamily::parse(&family)?;
    Ok(Json(state.query.field_extent(family, &key, &field).await?))
}

fn enforce_api_key(headers: &HeaderMap, config: &AppConfig) -> Result<()> {
    if let Some(expected) = &config.api_key {
        let provided = headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected.as_str()) {
            return Err(ServiceError::Auth);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testing::{point_row, SpySessions};
    use axum::body::{self, Body};
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    const API_KEY: &str = "unit-test-key";

    fn app(spy: SpySessions) -> Router {
        let config = AppConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "postgres://localhost/wildfire".into(),
            max_pool_size: 1,
            pg_ssl_root_cert: None,
            pg_ssl_cert: None,
            pg_ssl_key: None,
            api_key: Some(API_KEY.into()),
        };
        router(AppState::new(Arc::new(config), QueryEngine::new(spy)))
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-api-key", API_KEY)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_key() {
        let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let (status, body) = call(app(SpySessions::default()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn wrong_key_is_rejected() {
        let spy = SpySessions::default();
        let request = Request::builder()
            .uri("/api/wcs/drought_code")
            .header("x-api-key", "nope")
            .body(Body::empty())
            .unwrap();

        let (status, body) = call(app(spy.clone()), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "authentication failed");
        assert_eq!(spy.acquired(), 0);
    }

    #[tokio::test]
    async fn unregistered_layer_is_a_bad_request() {
        let spy = SpySessions::default();
        let (status, body) = call(app(spy.clone()), get("/api/wcs/pg_shadow")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["retryable"], false);
        assert!(body["error"].as_str().unwrap().contains("pg_shadow"));
        assert_eq!(spy.acquired(), 0);
    }

    #[tokio::test]
    async fn layer_rows_carry_geojson() {
        let properties = serde_json::json!({
            "value": 41.0,
            "acquisition_date": "2024-06-01T00:00:00",
            "lon": -110.0,
            "lat": 55.0
        });
        let spy = SpySessions::with_rows(vec![point_row(properties, -110.0, 55.0)]);

        let (status, body) = call(app(spy), get("/api/wcs/wind_speed?date=2024-06-01")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(
            body["results"][0]["geometry"],
            serde_json::json!({"type": "Point", "coordinates": [-110.0, 55.0]})
        );
        assert_eq!(body["slice"]["source"], "requested");
    }

    #[tokio::test]
    async fn storage_outage_is_retryable() {
        let spy = SpySessions::default();
        spy.set(|state| state.unavailable = true);

        let (status, body) = call(app(spy), get("/api/active-fires?min_date=2024-01-01")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["retryable"], true);
    }

    fn post_query(payload: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/query")
            .header("x-api-key", API_KEY)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn query_endpoint_accepts_tagged_filters() {
        let spy = SpySessions::default();
        let payload = serde_json::json!({
            "family": "fire_record",
            "dataset": "fire_history",
            "filter": {"kind": "mapped_category", "field": "cause", "label": "Human"}
        });

        let (status, body) = call(app(spy.clone()), post_query(&payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"results": [], "count": 0}));
        assert_eq!(spy.statements().len(), 1);
    }

    #[tokio::test]
    async fn unknown_family_in_body_uses_the_error_envelope() {
        let spy = SpySessions::default();
        let payload = serde_json::json!({"family": "tiles", "dataset": "fire_history"});

        let (status, body) = call(app(spy.clone()), post_query(&payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            serde_json::json!({
                "error": "invalid identifier: unknown dataset family 'tiles'",
                "retryable": false
            })
        );
        assert_eq!(spy.acquired(), 0);
    }

    #[tokio::test]
    async fn malformed_body_uses_the_error_envelope() {
        let spy = SpySessions::default();
        let payload = serde_json::json!({
            "family": "hotspot",
            "dataset": "m3_hotspots",
            "sample": "ten"
        });

        let (status, body) = call(app(spy.clone()), post_query(&payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["retryable"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid filter value: malformed request body"));
        assert_eq!(spy.acquired(), 0);
    }

    #[tokio::test]
    async fn negative_sample_uses_the_error_envelope() {
        let spy = SpySessions::default();

        let (status, body) = call(app(spy.clone()), get("/api/wcs/drought_code?sample=-1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["retryable"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid filter value: malformed query string"));
        assert_eq!(spy.acquired(), 0);
    }

    #[tokio::test]
    async fn unknown_family_in_facet_path_is_rejected() {
        let (status, _) = call(
            app(SpySessions::default()),
            get("/api/datasets/satellite/m3_hotspots/times"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_covers_every_dataset() {
        let (status, body) = call(app(SpySessions::default()), get("/api/datasets")).await;
        assert_eq!(status, StatusCode::OK);

        let listing = body.as_array().unwrap();
        assert_eq!(listing.len(), 23);
        let history = listing
            .iter()
            .find(|entry| entry["key"] == "fire_history")
            .unwrap();
        let cause = history["fields"]
            .as_array()
            .unwrap()
            .iter()
            .find(|field| field["name"] == "cause")
            .unwrap();
        assert_eq!(
            cause["categories"],
            serde_json::json!(["Human", "Natural", "Unknown", "Prescribed"])
        );
    }
}
