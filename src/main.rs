//! Flow Tracer - rebuilds layered money-flow hierarchies from uploaded
//! transaction spreadsheets.

mod config;
mod error;
mod flow;
mod schema;
mod sheet_parser;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use config::{ColumnProfile, ProfileStore, Settings, DEFAULT_PROFILE};
use error::ApiError;
use flow::{resolver::ColumnResolver, FlowTree, NestLimits};
use schema::{FlowGraph, FlowRecord, NodeDetail};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Maximum accepted upload size.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// A built flow kept for later retrieval.
struct StoredFlow {
    record: FlowRecord,
    tree: FlowTree,
}

/// Built flows by id. Once `capacity` is reached the oldest is evicted.
struct FlowStore {
    capacity: usize,
    order: VecDeque<String>,
    flows: HashMap<String, StoredFlow>,
}

impl FlowStore {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            flows: HashMap::new(),
        }
    }

    fn insert(&mut self, id: String, flow: StoredFlow) {
        while self.order.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.flows.remove(&oldest);
            info!("Evicted flow {}", oldest);
        }
        self.order.push_back(id.clone());
        self.flows.insert(id, flow);
    }

    fn get(&self, id: &str) -> Option<&StoredFlow> {
        self.flows.get(id)
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    flows: Arc<RwLock<FlowStore>>,
    profiles: Arc<ProfileStore>,
    settings: Arc<Settings>,
}

impl AppState {
    fn new(profiles: ProfileStore, settings: Settings) -> Self {
        Self {
            flows: Arc::new(RwLock::new(FlowStore::new(settings.max_stored_flows))),
            profiles: Arc::new(profiles),
            settings: Arc::new(settings),
        }
    }

    fn nest_limits(&self) -> NestLimits {
        NestLimits {
            max_depth: self.settings.max_depth,
            max_nodes: self.settings.max_nested_nodes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flow_tracer=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let profiles = ProfileStore::load_from_dir(&settings.profile_dir)?;
    info!("Loaded {} profiles: {:?}", profiles.list().len(), profiles.list());

    let bind_addr = settings.bind_addr.clone();
    let app = app(AppState::new(profiles, settings));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profiles", get(list_profiles))
        .route("/profiles/:name", get(get_profile))
        .route("/flows", post(upload_flow))
        .route("/flows/:id", get(get_flow))
        .route("/flows/:id/graph", get(get_flow_graph))
        .route("/flows/:id/nodes/:node_id", get(get_node))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn list_profiles(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.profiles.list())
}

async fn get_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ColumnProfile>, ApiError> {
    state.profiles.get(&name).map(Json).ok_or_else(|| ApiError::UnknownProfile {
        name,
        available: state.profiles.list(),
    })
}

#[derive(serde::Deserialize)]
struct UploadQuery {
    profile: Option<String>,
}

/// Upload a spreadsheet and build its money-flow hierarchy.
async fn upload_flow(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<FlowRecord>, ApiError> {
    let profile_name = query.profile.as_deref().unwrap_or(DEFAULT_PROFILE);
    let profile = state
        .profiles
        .get(profile_name)
        .ok_or_else(|| ApiError::UnknownProfile {
            name: profile_name.to_string(),
            available: state.profiles.list(),
        })?;

    let mut filename = String::new();
    let mut file_data = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("upload").to_string();
            file_data = field.bytes().await?.to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err(ApiError::MissingFile);
    }
    if !sheet_parser::is_supported(&filename) {
        return Err(ApiError::UnsupportedFileType(filename));
    }

    info!(
        "Received file: {} ({} bytes) with profile: {}",
        filename,
        file_data.len(),
        profile.name
    );

    let max_rows = state.settings.max_rows;
    let limits = state.nest_limits();
    let (record, tree) = tokio::task::spawn_blocking(move || {
        build_record(filename, file_data, profile, max_rows, limits)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Build task failed: {}", e)))??;

    info!(
        "Flow {} built: {} accounts, {} relationships, {} roots",
        record.id, record.stats.nodes, record.stats.relationships, record.stats.roots
    );

    state
        .flows
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(
            record.id.clone(),
            StoredFlow {
                record: record.clone(),
                tree,
            },
        );

    Ok(Json(record))
}

/// Parse, build and package one upload. Runs off the async runtime.
fn build_record(
    filename: String,
    data: Vec<u8>,
    profile: ColumnProfile,
    max_rows: usize,
    limits: NestLimits,
) -> Result<(FlowRecord, FlowTree), ApiError> {
    let sheet = sheet_parser::parse_file(&filename, &data).map_err(|e| {
        error!("Parsing {} failed: {:#}", filename, e);
        ApiError::Parse(e)
    })?;
    info!("Parsed {} rows from sheet \"{}\"", sheet.rows.len(), sheet.name);

    if sheet.rows.is_empty() {
        return Err(ApiError::EmptySheet);
    }
    if sheet.rows.len() > max_rows {
        return Err(ApiError::TooManyRows {
            rows: sheet.rows.len(),
            limit: max_rows,
        });
    }

    let resolver = ColumnResolver::compile(&profile);
    let tree = flow::build_tree(&sheet.rows, &resolver);
    let source_hash = format!("{:x}", Sha256::digest(&data));

    let record = FlowRecord::new(
        filename,
        source_hash,
        sheet.name,
        profile.name,
        tree.stats,
        tree.to_hierarchy(limits),
    );
    Ok((record, tree))
}

async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FlowRecord>, ApiError> {
    let flows = state.flows.read().unwrap_or_else(PoisonError::into_inner);
    flows
        .get(&id)
        .map(|stored| Json(stored.record.clone()))
        .ok_or(ApiError::FlowNotFound(id))
}

async fn get_flow_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FlowGraph>, ApiError> {
    let flows = state.flows.read().unwrap_or_else(PoisonError::into_inner);
    flows
        .get(&id)
        .map(|stored| Json(stored.tree.to_graph()))
        .ok_or(ApiError::FlowNotFound(id))
}

async fn get_node(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(String, String)>,
) -> Result<Json<NodeDetail>, ApiError> {
    let flows = state.flows.read().unwrap_or_else(PoisonError::into_inner);
    let stored = flows.get(&id).ok_or_else(|| ApiError::FlowNotFound(id.clone()))?;
    stored
        .tree
        .node_detail(&node_id)
        .map(Json)
        .ok_or(ApiError::NodeNotFound(node_id))
}
