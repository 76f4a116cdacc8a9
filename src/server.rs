use crate::chat::{chat_handler, ChatState, GroupLayer};
use crate::config::Config;
use crate::constants;
use crate::db::DatabaseManager;
use crate::handlers::{api_root, create, destroy, health, list, partial_update, retrieve, update};
use crate::schema::{Entity, ENTITIES};
use crate::storage::{SqliteStorage, Storage};
use axum::extract::FromRef;
use axum::http::Method;
use axum::routing::{get, MethodRouter};
use axum::{Extension, Router};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub chat: ChatState,
}

impl FromRef<AppState> for ChatState {
    fn from_ref(state: &AppState) -> Self {
        state.chat.clone()
    }
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, layer: Arc<GroupLayer>, group: impl Into<String>) -> Self {
        Self {
            storage,
            chat: ChatState {
                layer,
                group: group.into(),
            },
        }
    }
}

fn collection_routes(entity: &'static Entity) -> MethodRouter<AppState> {
    get(list).post(create).layer(Extension(entity))
}

fn item_routes(entity: &'static Entity) -> MethodRouter<AppState> {
    get(retrieve)
        .put(update)
        .patch(partial_update)
        .delete(destroy)
        .layer(Extension(entity))
}

/// Build the router: API root, one collection per entity, the chat socket and `/health`.
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);

    let root = format!("{}/", constants::API_PREFIX);
    let chat_path = format!("{}/", constants::CHAT_PATH);
    let mut router = Router::new()
        .route("/health", get(health))
        .route(constants::API_PREFIX, get(api_root))
        .route(&root, get(api_root))
        .route(constants::CHAT_PATH, get(chat_handler))
        .route(&chat_path, get(chat_handler));

    for &entity in ENTITIES {
        let collection = constants::collection_path(entity.name);
        let item = format!("{collection}:id");
        router = router
            .route(&collection, collection_routes(entity))
            .route(collection.trim_end_matches('/'), collection_routes(entity))
            .route(&format!("{item}/"), item_routes(entity))
            .route(&item, item_routes(entity));
    }

    router
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Open the database, run migrations and serve until the process is stopped.
pub async fn start_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(DatabaseManager::open(&config.database.path)?);
    db.run_migrations()?;

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(db));
    let layer = Arc::new(GroupLayer::new(config.chat.capacity));
    let app = create_server(AppState::new(storage, layer, config.chat.group.clone()));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("HTTP server running on http://{addr}");
    info!("REST collections under http://{addr}{}/", constants::API_PREFIX);
    info!("Chat socket at ws://{addr}{}/", constants::CHAT_PATH);

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
