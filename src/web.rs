use crate::{
    render::HitView,
    semantic::{QueryError, SearchRequest, SearchService, ServiceError, StoreError, StoreSummary},
};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Profile select value meaning "no filter".
const ALL_PROFILES: &str = "Alle";

#[derive(Clone)]
struct SharedState {
    service: Arc<SearchService>,
}

fn router(service: Arc<SearchService>) -> Router {
    let shared_state = Arc::new(SharedState { service });

    Router::new()
        .route("/", get(index))
        .route("/api/search", get(search))
        .route("/api/profiles", get(profiles))
        .route("/api/stats", get(stats))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .layer(tower_http::set_header::SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-store"),
        ))
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(service: Arc<SearchService>, listen: SocketAddr) -> anyhow::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Serve the feed until Ctrl+C. The service should already be initialized.
pub fn start_server(service: SearchService, listen: SocketAddr) -> anyhow::Result<()> {
    let service = Arc::new(service);
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(service, listen).await })
}

#[derive(Debug)]
struct HttpError(ServiceError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            ServiceError::Query(QueryError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Store(StoreError::Missing(_))
            | ServiceError::Query(QueryError::Store(StoreError::Missing(_))) => {
                log::error!("{}", self.0);
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<ServiceError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub profile: Option<String>,
    pub min_interactions: Option<u64>,
    pub top_k: Option<usize>,

    #[serde(default)]
    pub boost: bool,
}

impl SearchParams {
    fn into_request(self, default_top_k: usize) -> SearchRequest {
        let profile = self
            .profile
            .filter(|p| !p.trim().is_empty() && p.trim() != ALL_PROFILES);

        SearchRequest {
            query: self.q,
            profile,
            // the slider's 0 means no threshold
            min_interactions: self.min_interactions.filter(|min| *min > 0),
            top_k: self.top_k.unwrap_or(default_top_k),
            boost_interactions: self.boost,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<HitView>,
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("params: {params:?}");

    let service = state.service.clone();
    let request = params.into_request(service.default_top_k());

    tokio::task::block_in_place(move || {
        let hits = service.search(&request)?;
        let results = HitView::from_hits(&hits);
        Ok(Json(SearchResponse {
            query: request.query.trim().to_string(),
            count: results.len(),
            results,
        }))
    })
}

async fn profiles(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<Vec<String>>, HttpError> {
    let service = state.service.clone();
    tokio::task::block_in_place(move || Ok(Json(service.profiles()?)))
}

async fn stats(State(state): State<Arc<SharedState>>) -> Result<Json<StoreSummary>, HttpError> {
    let service = state.service.clone();
    tokio::task::block_in_place(move || Ok(Json(service.summary()?)))
}
