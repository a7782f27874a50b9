//! Provider binary. Started by the engine; speaks the JSON-lines protocol of [`otc_provider::rpc`]
//! on stdin/stdout and logs to stderr.
//!
//! `OTC_PROVIDER_CONFIG` may name a TOML file with provider settings; `OS_*` variables
//! override it and the engine's `Configure` call overrides both.

use otc_framework::tracing::setup_tracing;
use otc_framework::ProviderConfig;
use otc_provider::provider::OtcProvider;
use otc_provider::rpc;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info};

const CONFIG_ENV: &str = "OTC_PROVIDER_CONFIG";

fn load_config() -> Result<ProviderConfig, String> {
    let mut config = match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => ProviderConfig::load(Path::new(&path)).map_err(|e| e.to_string())?,
        _ => ProviderConfig::default(),
    };
    config.apply_env().map_err(|e| e.to_string())?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = load_config().inspect_err(|e| error!(error = %e, "Failed to load provider config"))?;
    let provider = OtcProvider::new(config).map_err(|e| e.to_string())?;
    info!(
        resources = provider.registry().resource_names().count(),
        data_sources = provider.registry().data_source_names().count(),
        "Provider starting"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    rpc::serve(Arc::new(provider), stdin, tokio::io::stdout())
        .await
        .map_err(|e| e.to_string())?;

    info!("Provider stopped");
    Ok(())
}
