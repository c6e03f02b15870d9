/// API сервер для преобразования признаков

use anyhow::Context;

use featurewise::config::ServerConfig;
use featurewise::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализация логирования
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    let addr = config.socket_addr()?;
    let app = server::router(&config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
