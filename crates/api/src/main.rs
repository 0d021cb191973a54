use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use supportchat_api::{
    completion::ChatCompletionClient,
    routes::create_router,
    websocket::{AutoReplier, ChatState},
    AppState, Config,
};
use supportchat_shared::{
    create_pool, run_migrations, MemoryMessageStore, MessageStore, PgMessageStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "supportchat_api=info,supportchat_shared=info,tower_http=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let store: Arc<dyn MessageStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            run_migrations(&pool).await.context("Failed to run migrations")?;
            tracing::info!("Using Postgres message store");
            Arc::new(PgMessageStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, messages are kept in memory only");
            Arc::new(MemoryMessageStore::new())
        }
    };

    let mut chat = ChatState::new(store);
    if config.auto_reply_enabled {
        let client = ChatCompletionClient::from_config(&config)
            .context("Failed to build completion client")?;
        tracing::info!(
            endpoint = %config.completion_url,
            model = %config.completion_model,
            "Auto-replies enabled"
        );
        chat = chat.with_auto_reply(AutoReplier::new(Arc::new(client)));
    } else {
        tracing::info!("Auto-replies disabled");
    }

    let bind_address = config.bind_address.clone();
    let app = create_router(AppState::new(config, chat));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Support chat relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
