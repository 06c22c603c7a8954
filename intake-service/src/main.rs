use intake_service::{ServiceConfig, create_app, telemetry::init_tracing};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let app = create_app(&config).await?;
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let addr = listener.local_addr()?;

    info!(model = %config.model, "Medical Intake Service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Message endpoint: POST http://{}/intake/message", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
