//! Discovery walkthrough: a few outlets, one continuous resolver watching
//! them appear and be forgotten.
//!
//! Run with: cargo run --example discover

use std::time::Duration;

use pulselink::{
    ChannelFormat, ContinuousResolver, Engine, Outlet, OutletOptions, StreamDescriptor,
    StreamFilter, StreamProperty,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let engine = Engine::new();
    let resolver = ContinuousResolver::new(
        &engine,
        StreamFilter::property(StreamProperty::Type, "EEG"),
        Duration::from_secs(2),
    )?;

    let eeg = StreamDescriptor::new("amp-1", "EEG", 32, 512.0, ChannelFormat::Float32, "")?;
    let markers = StreamDescriptor::new("exp", "Markers", 1, 0.0, ChannelFormat::String, "")?;
    let mut eeg_outlet = Outlet::new(&engine, eeg, OutletOptions::default())?;
    let _marker_outlet = Outlet::new(&engine, markers, OutletOptions::default())?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("visible EEG streams while the amp is up:");
    for desc in resolver.results() {
        println!("  {}", desc);
    }

    eeg_outlet.destroy();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    println!(
        "after the amp went away (forget window elapsed): {} streams",
        resolver.results().len()
    );

    Ok(())
}
