use overseerr_provider::{init_logging, serve, OverseerrProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Overseerr provider");
    serve(OverseerrProvider::new(env!("CARGO_PKG_VERSION"))).await
}
