// Borrows one collection view through the connector, then shuts down
use connector_cache::cache::CacheError;
use connector_cache::connector::{AccessConfig, AccessMode, Connector, ConnectorConfig};
use connector_cache::connector::access_config::ReadSettings;

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] connector_cache::connector::ConfigError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // optional JSON config path as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => ConnectorConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => ConnectorConfig::default(),
    }
    .with_env_overrides()?;

    let connector = Connector::from_config(&config);
    connector.close_on_ctrl_c();

    let access = AccessConfig::from_connector(&config, AccessMode::Read(ReadSettings::default()));
    let namespace = connector
        .with_collection(&access, |collection| async move {
            Ok::<_, CacheError>(collection.namespace())
        })
        .await?;
    log::info!("Borrowed collection {} from {}", namespace, config.uri);

    let report = connector.close();
    log::info!(
        "Cache stats: {}",
        serde_json::to_string(&connector.cache().stats())?
    );
    if !report.is_clean() {
        for failure in &report.failures {
            log::error!("{}", failure);
        }
    }
    Ok(())
}
