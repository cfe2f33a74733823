//! End-to-end push/pull and discovery scenarios over a bound outlet/inlet
//! pair.

use std::time::Duration;

use pulselink::{
    resolve_by_prop, ChannelFormat, ChunkTimestamps, ContinuousResolver, Engine, Inlet,
    InletOptions, Outlet, OutletOptions, Sample, StreamDescriptor, StreamFilter, StreamProperty,
};

fn descriptor(
    name: &str,
    stream_type: &str,
    channels: usize,
    srate: f64,
    format: ChannelFormat,
) -> StreamDescriptor {
    StreamDescriptor::new(name, stream_type, channels, srate, format, "").unwrap()
}

async fn bound_pair(desc: &StreamDescriptor) -> (Outlet, Inlet) {
    let engine = Engine::new();
    let outlet = Outlet::new(&engine, desc.clone(), OutletOptions::default()).unwrap();
    let mut inlet = Inlet::new(&engine, desc, InletOptions::default()).unwrap();
    inlet.open_stream(Duration::from_secs(5)).await.unwrap();
    (outlet, inlet)
}

#[tokio::test]
async fn eeg_sample_round_trip() {
    let desc = descriptor("T", "EEG", 4, 100.0, ChannelFormat::Float32);
    let engine = Engine::new();
    let outlet = Outlet::new(&engine, desc.clone(), OutletOptions::default()).unwrap();

    outlet
        .push_sample(&Sample::Float32(vec![1.0, 2.0, 3.0, 4.0]))
        .unwrap();

    let mut inlet = Inlet::new(&engine, &desc, InletOptions::default()).unwrap();
    inlet.open_stream(Duration::from_secs(5)).await.unwrap();
    let (sample, timestamp) = inlet
        .pull_sample(Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(sample, Sample::Float32(vec![1.0, 2.0, 3.0, 4.0]));
    assert!(timestamp > 0.0);
}

#[tokio::test]
async fn int32_chunk_round_trip_preserves_order_and_spacing() {
    let desc = descriptor("gaze", "Gaze", 2, 100.0, ChannelFormat::Int32);
    let (outlet, mut inlet) = bound_pair(&desc).await;

    let rows = vec![
        Sample::Int32(vec![1, 2]),
        Sample::Int32(vec![3, 4]),
        Sample::Int32(vec![5, 6]),
    ];
    outlet
        .push_chunk(&rows, ChunkTimestamps::PerSample(vec![10.0, 10.01, 10.02]))
        .unwrap();

    let (samples, stamps) = inlet.pull_chunk(Duration::from_secs(1), 10).await.unwrap();
    assert_eq!(samples, rows);
    assert_eq!(stamps.len(), 3);
    for pair in stamps.windows(2) {
        assert!((pair[1] - pair[0] - 0.01).abs() < 1e-9);
    }
}

#[tokio::test]
async fn rows_and_flat_chunks_are_equivalent() {
    let desc = descriptor("dual", "Test", 2, 0.0, ChannelFormat::Double64);
    let engine = Engine::new();
    let outlet = Outlet::new(&engine, desc.clone(), OutletOptions::default()).unwrap();

    let rows = vec![
        Sample::Double64(vec![1.0, 2.0]),
        Sample::Double64(vec![3.0, 4.0]),
    ];
    outlet
        .push_chunk(&rows, ChunkTimestamps::Single(5.0))
        .unwrap();
    outlet
        .push_flat_chunk(
            &Sample::Double64(vec![1.0, 2.0, 3.0, 4.0]),
            ChunkTimestamps::Single(6.0),
        )
        .unwrap();

    let mut inlet = Inlet::new(&engine, &desc, InletOptions::default()).unwrap();
    let (samples, _stamps) = inlet.pull_chunk(Duration::from_secs(1), 10).await.unwrap();
    assert_eq!(samples.len(), 4);
    assert_eq!(&samples[..2], &samples[2..]);
}

#[tokio::test]
async fn string_markers_round_trip_exactly() {
    let desc = descriptor("markers", "Markers", 1, 0.0, ChannelFormat::String);
    let (outlet, mut inlet) = bound_pair(&desc).await;

    outlet
        .push_sample(&Sample::String(vec!["stimulus-onset".into()]))
        .unwrap();
    let (sample, _ts) = inlet
        .pull_sample(Duration::from_secs(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sample, Sample::String(vec!["stimulus-onset".into()]));
}

#[tokio::test]
async fn all_numeric_formats_round_trip() {
    for (format, sample) in [
        (ChannelFormat::Float32, Sample::Float32(vec![1.5, -2.5])),
        (ChannelFormat::Double64, Sample::Double64(vec![1e-9, 3.0])),
        (ChannelFormat::Int8, Sample::Int8(vec![-128, 127])),
        (ChannelFormat::Int16, Sample::Int16(vec![-32768, 32767])),
        (ChannelFormat::Int32, Sample::Int32(vec![i32::MIN, i32::MAX])),
        (ChannelFormat::Int64, Sample::Int64(vec![i64::MIN, i64::MAX])),
    ] {
        let desc = descriptor("fmt", "Test", 2, 0.0, format);
        let (outlet, mut inlet) = bound_pair(&desc).await;
        outlet.push_sample(&sample).unwrap();
        let (pulled, _ts) = inlet
            .pull_sample(Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pulled, sample, "round trip failed for {}", format);
    }
}

#[tokio::test]
async fn consumer_presence_is_visible_to_the_outlet() {
    let desc = descriptor("pres", "Test", 1, 0.0, ChannelFormat::Float32);
    let engine = Engine::new();
    let outlet = Outlet::new(&engine, desc.clone(), OutletOptions::default()).unwrap();
    assert!(!outlet.have_consumers());

    let mut inlet = Inlet::new(&engine, &desc, InletOptions::default()).unwrap();
    inlet.open_stream(Duration::from_secs(1)).await.unwrap();
    assert!(outlet
        .wait_for_consumers(Duration::from_secs(1))
        .await
        .unwrap());
    assert!(outlet.have_consumers());

    inlet.close_stream();
    assert!(!outlet.have_consumers());
}

#[tokio::test]
async fn resolve_then_bind_by_resolved_descriptor() {
    let engine = Engine::new();
    let desc = descriptor("resolved", "EEG", 2, 100.0, ChannelFormat::Float32);
    let outlet = Outlet::new(&engine, desc, OutletOptions::default()).unwrap();
    outlet.push_sample(&Sample::Float32(vec![0.5, 0.25])).unwrap();

    let found = resolve_by_prop(
        &engine,
        StreamProperty::Name,
        "resolved",
        1,
        Duration::from_secs(1),
    )
    .await;
    assert_eq!(found.len(), 1);
    assert!(found[0].host.is_some());

    let mut inlet = Inlet::new(&engine, &found[0], InletOptions::default()).unwrap();
    let (sample, _ts) = inlet
        .pull_sample(Duration::from_secs(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sample, Sample::Float32(vec![0.5, 0.25]));
}

#[tokio::test]
async fn continuous_resolver_forgets_after_window() {
    let engine = Engine::new();
    let resolver = ContinuousResolver::new(
        &engine,
        StreamFilter::property(StreamProperty::Type, "EEG"),
        Duration::from_secs(1),
    )
    .unwrap();

    let mut outlet = Outlet::new(
        &engine,
        descriptor("fleeting", "EEG", 1, 0.0, ChannelFormat::Float32),
        OutletOptions::default(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(resolver.results().len(), 1);

    outlet.destroy();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(resolver.results().is_empty());
}
