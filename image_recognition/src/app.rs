use crate::config::Config;
use crate::prediction::PredictionService;
use crate::server::HttpServer;

use image_prediction::{Classifier, OrtClassifier};
use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    // The model is loaded once, before the listener exists; failing here aborts startup.
    let classifier: Arc<dyn Classifier> = match OrtClassifier::new(&config.model) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            tracing::error!("Failed to load classifier: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let prediction_service =
        match PredictionService::with_labels_config(classifier, config.labels.as_ref()) {
            Ok(service) => Arc::new(service.with_max_image_side(config.server.max_image_side)),
            Err(e) => {
                tracing::error!("Failed to initialize prediction service: {:?}", e);
                return Err(Box::new(e));
            }
        };

    let server = HttpServer::new(prediction_service, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
