use clap::Parser;
use config::{Config, LogFormat};
use domain_controller::DomainController;
use futures::try_join;
use ingress_controller::IngressController;
use kube::Client as K8sClient;
use ngrokext::Client as NgrokClient;
use std::future::IntoFuture;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Runs `fut` until it finishes or `cancel` fires.
async fn until_cancelled<F>(fut: F, cancel: CancellationToken) -> anyhow::Result<()>
where
    F: IntoFuture<Output = anyhow::Result<()>>,
{
    tokio::select! {
        result = fut.into_future() => result,
        _ = cancel.cancelled() => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    let kubernetes_client = K8sClient::try_default().await?;
    let ngrok_client = NgrokClient::try_new(&config.api_url, &config.api_key)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
            cancel.cancel();
        }
    });

    let domain_controller = DomainController::try_new(kubernetes_client.clone(), ngrok_client)?;
    let ingress_controller = IngressController::try_new(
        kubernetes_client,
        config.driver_config(),
        config.sweep_interval(),
        cancel.clone(),
    )?;

    try_join!(
        until_cancelled(domain_controller, cancel.clone()),
        ingress_controller.into_future(),
    )?;

    Ok(())
}
