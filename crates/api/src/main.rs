use travelos_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    travelos_observability::init();

    let config = AppConfig::from_env()?;
    let app = travelos_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
