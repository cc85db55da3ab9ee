use anyhow::Result;
use tracing_subscriber::EnvFilter;

use image_warehouse::{
    config::Config,
    db::Db,
    storage::UploadStorage,
    web::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    if config.uses_default_secret() {
        tracing::warn!("SECRET_KEY is not set, using the development key");
    }

    UploadStorage::new(config.upload_root.clone()).ensure_root().await?;
    let db = Db::connect_and_migrate(&config.database_path).await?;
    tracing::info!(
        database = %config.database_path.display(),
        upload_root = %config.upload_root.display(),
        allow_global_downloads = config.allow_global_downloads,
        "storage ready"
    );

    let router = web::router(AppState::new(&config, db), config.max_upload_bytes);
    let tcp_listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("image warehouse listening on http://{}", config.bind_address);

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
