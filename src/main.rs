use clap::Parser;
use miette::{IntoDiagnostic, Result};
use pulsepay::application::discovery::InvoiceDiscovery;
use pulsepay::application::engine::TransactionEngine;
use pulsepay::config::Config;
use pulsepay::domain::ports::{BackendHandle, IntakeHandle};
use pulsepay::infrastructure::backend::HttpPaymentBackend;
use pulsepay::interfaces::http;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("pulsepay.log"))?;
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        registry.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    config.validate().into_diagnostic()?;
    init_tracing(&config).into_diagnostic()?;

    let backend: BackendHandle = Arc::new(HttpPaymentBackend::new(&config).into_diagnostic()?);

    #[cfg(feature = "hardware-rppal")]
    let intake: IntakeHandle = Arc::new(
        pulsepay::infrastructure::gpio::GpioIntake::new(config.enable_pin).into_diagnostic()?,
    );
    #[cfg(not(feature = "hardware-rppal"))]
    let intake: IntakeHandle = {
        tracing::warn!("built without hardware-rppal; intake line is a no-op");
        Arc::new(pulsepay::infrastructure::intake::DisconnectedIntake::new())
    };

    let engine = TransactionEngine::new(config.clone(), Arc::clone(&backend), intake);

    #[cfg(feature = "hardware-rppal")]
    let _pulses = pulsepay::infrastructure::gpio::PulseSource::attach(
        Arc::clone(&engine),
        config.pulse_pin,
    )
    .into_diagnostic()?;

    info!(device = %config.device_id, "bill acceptor bridge starting");

    let discovery = InvoiceDiscovery::new(Arc::clone(&engine), backend, config.clone());
    tokio::spawn(discovery.run());

    http::serve(engine, config.listen_port)
        .await
        .into_diagnostic()?;
    Ok(())
}
