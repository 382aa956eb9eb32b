use std::sync::Arc;

use anyhow::Context;
use log::info;

use astro_bridge::bridge::{light::DEFAULT_POLL_INTERVAL, HomeAssistant};
use astro_bridge::config::Settings;
use astro_bridge::driver::{FlattenerDriver, FocuserDriver};
use astro_bridge::properties::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = Settings::from_env().context("invalid configuration")?;
    info!(
        "Starting drivers: focuser on {} (range {}..{} step {}), flat panel entity {}",
        settings.focuser_port,
        settings.focuser_min,
        settings.focuser_max,
        settings.focuser_step,
        settings.ha_entity
    );

    let dispatcher = Arc::new(Dispatcher::new());

    let focuser = FocuserDriver::new(
        &settings.focuser_port,
        settings.focuser_min,
        settings.focuser_max,
    );
    focuser.register(&dispatcher);

    let backend = Arc::new(
        HomeAssistant::new(&settings.ha_host, &settings.ha_token, &settings.ha_entity)
            .context("failed to build Home Assistant client")?,
    );
    let flattener = FlattenerDriver::new(backend, DEFAULT_POLL_INTERVAL);
    flattener.register(&dispatcher);

    // Property writes from the control protocol enter through
    // `dispatcher.dispatch`; the server frontend wiring lives outside this
    // process core.
    info!("Drivers registered, running until interrupted");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutting down");
    focuser.shutdown().await;
    flattener.shutdown().await;
    Ok(())
}
