use std::error::Error;

use crate::{
    backend::SlotBackend, configuration::Configuration,
    configuration_handler::ConfigurationHandler, database_interface::DatabaseInterface,
    http::create_app, local_slots::LocalSlots, slot_manager::SlotManager,
    update_bus::UpdateBus,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod backend;
mod configuration;
mod configuration_handler;
mod database_interface;
mod error;
mod http;
mod live_updates;
mod local_slots;
mod registration_guard;
mod schema;
mod slot_manager;
#[cfg(test)]
mod testutils;
mod types;
mod update_bus;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("################");
    println!("# Slot Manager #");
    println!("################");

    let configuration = ConfigurationHandler::parse_arguments();

    if let Some(database_url) = configuration.database_url() {
        let backend = DatabaseInterface::new(&database_url, configuration.pool_size())?;
        info!("Successfully connected to database");
        serve(backend, &configuration).await
    } else {
        warn!("No database configured, slots are kept in memory only");
        serve(LocalSlots::default(), &configuration).await
    }
}

async fn serve<T: SlotBackend>(
    backend: T,
    configuration: &impl Configuration,
) -> Result<(), Box<dyn Error>> {
    let slot_manager = SlotManager::new(backend, UpdateBus::new());
    if configuration.seed_examples() {
        slot_manager.insert_example_slots().await?;
    }

    let bus = slot_manager.bus().clone();
    let app = create_app(slot_manager, configuration);
    let address = format!("0.0.0.0:{}", configuration.port());
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(%address, "Accepting connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let closed = bus.clear();
            info!(closed, "Closed live update streams");
        })
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
