//! Hive - 对话网关入口
//!
//! 初始化日志、加载配置、组装会话存储与编排器，启动 HTTP 服务。

use std::sync::Arc;

use hive::api::{build_router, AppState};
use hive::config::{load_config, AppConfig};
use hive::core::create_orchestrator;
use hive::memory::{InMemorySessionStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let store: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::new(cfg.chat.max_history_exchanges));
    let orchestrator = Arc::new(create_orchestrator(&cfg, Arc::clone(&store)));
    let state = Arc::new(AppState {
        orchestrator,
        store,
    });

    let app = build_router(state);

    let port = std::env::var("HIVE_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.server.port);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Hive gateway: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
