//! LAN Audio Share backend
//!
//! Serves the control endpoint, advertises this node on the LAN and drives
//! local playback.
//!
//! Usage: `lan-audio-backend [config.toml]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_share::{
    audio::{list_output_devices, AudioEngine, CpalOutput},
    config::AppConfig,
    control::Dispatcher,
    discovery::{default_instance_name, Advertisement, Discovery, MdnsDiscovery, NoDiscovery},
    session::SessionManager,
    ui::WebServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN Audio Share backend");

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&PathBuf::from(&path))
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => AppConfig::load_default().context("Failed to load config")?,
    };

    println!("\n=== Output Devices ===");
    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    let engine = AudioEngine::new(Arc::new(CpalOutput::new()), &config.playback);
    let session = Arc::new(SessionManager::new(config.control.clone()));

    let discovery: Arc<dyn Discovery> = if config.discovery.enabled {
        match MdnsDiscovery::new() {
            Ok(mdns) => Arc::new(mdns),
            Err(e) => {
                tracing::warn!("{}, continuing without discovery", e);
                Arc::new(NoDiscovery)
            }
        }
    } else {
        Arc::new(NoDiscovery)
    };

    let dispatcher = Dispatcher::new(engine, session, discovery.clone(), config.discovery.clone());
    let server = WebServer::new(config.control.clone(), dispatcher);
    let listener = server
        .bind()
        .with_context(|| format!("Failed to bind control port {}", config.control.port))?;

    let ad = Advertisement {
        instance_name: config
            .discovery
            .instance_name
            .clone()
            .unwrap_or_else(default_instance_name),
        service_type: config.discovery.service_type.clone(),
        port: config.control.port,
        path_hint: config.control.path.clone(),
    };
    if let Err(e) = discovery.advertise(&ad) {
        tracing::warn!("{}", e);
    }

    server
        .serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
