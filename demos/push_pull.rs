//! Minimal publish/subscribe walkthrough: an 8-channel EEG outlet and an
//! inlet pulling from it.
//!
//! Run with: cargo run --example push_pull

use std::time::Duration;

use pulselink::{
    ChannelFormat, Engine, Inlet, InletOptions, Outlet, OutletOptions, Sample, StreamDescriptor,
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

    let desc = StreamDescriptor::new("BioSemi", "EEG", 8, 256.0, ChannelFormat::Float32, "")?;
    let outlet = Outlet::new(&engine, desc.clone(), OutletOptions::default())?;
    println!("providing stream: {}", outlet.info()?);

    let mut inlet = Inlet::new(&engine, &desc, InletOptions::default())?;
    inlet.open_stream(Duration::from_secs(5)).await?;

    for i in 0..10 {
        let sample = Sample::Float32((0..8).map(|ch| (i * 8 + ch) as f32).collect());
        outlet.push_sample(&sample)?;
    }

    while let Some((sample, timestamp)) = inlet.pull_sample(Duration::from_millis(100)).await? {
        println!("{:10.6}  {:?}", timestamp, sample);
    }

    Ok(())
}
