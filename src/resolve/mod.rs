//! Stream discovery
//!
//! One-shot resolves that block up to a timeout and return whatever
//! matching descriptors were observed, and a filter type shared with the
//! continuously-updating resolver. Returned descriptors are independent
//! snapshots owned by the caller.

pub mod continuous;

pub use continuous::ContinuousResolver;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::descriptor::{StreamDescriptor, StreamProperty};
use crate::engine::{Engine, POLL_INTERVAL};
use crate::error::{Error, Result};

/// Predicate over a resolved descriptor
pub type Predicate = Arc<dyn Fn(&StreamDescriptor) -> bool + Send + Sync>;

/// What a resolver is looking for
#[derive(Clone, Default)]
pub struct StreamFilter {
    prop: Option<StreamProperty>,
    value: Option<String>,
    predicate: Option<Predicate>,
}

impl StreamFilter {
    /// Match every stream
    pub fn any() -> Self {
        Self::default()
    }

    /// Match streams whose property equals a value
    pub fn property(prop: StreamProperty, value: impl Into<String>) -> Self {
        Self {
            prop: Some(prop),
            value: Some(value.into()),
            predicate: None,
        }
    }

    /// Match streams satisfying a predicate
    pub fn predicate<F>(pred: F) -> Self
    where
        F: Fn(&StreamDescriptor) -> bool + Send + Sync + 'static,
    {
        Self {
            prop: None,
            value: None,
            predicate: Some(Arc::new(pred)),
        }
    }

    /// Set only the property half of a property filter
    pub fn with_prop(mut self, prop: StreamProperty) -> Self {
        self.prop = Some(prop);
        self
    }

    /// Set only the value half of a property filter
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Add a predicate to the filter
    pub fn with_predicate<F>(mut self, pred: F) -> Self
    where
        F: Fn(&StreamDescriptor) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(pred));
        self
    }

    /// Validate the combination and produce the matcher
    ///
    /// A property pair and a predicate together conflict, as does a
    /// property without a value or a value without a property.
    pub(crate) fn compile(&self) -> Result<CompiledFilter> {
        match (&self.prop, &self.value, &self.predicate) {
            (Some(_), Some(_), Some(_)) => Err(Error::Config(
                "resolver filter cannot combine a property pair with a predicate".into(),
            )),
            (Some(_), None, _) => Err(Error::Config(
                "resolver property filter is missing its value".into(),
            )),
            (None, Some(_), _) => Err(Error::Config(
                "resolver property filter is missing its property".into(),
            )),
            (Some(prop), Some(value), None) => Ok(CompiledFilter::Property(*prop, value.clone())),
            (None, None, Some(pred)) => Ok(CompiledFilter::Predicate(Arc::clone(pred))),
            (None, None, None) => Ok(CompiledFilter::Any),
        }
    }
}

impl std::fmt::Debug for StreamFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamFilter")
            .field("prop", &self.prop)
            .field("value", &self.value)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Validated, ready-to-match form of a filter
#[derive(Clone)]
pub(crate) enum CompiledFilter {
    Any,
    Property(StreamProperty, String),
    Predicate(Predicate),
}

impl CompiledFilter {
    pub(crate) fn matches(&self, desc: &StreamDescriptor) -> bool {
        match self {
            CompiledFilter::Any => true,
            CompiledFilter::Property(prop, value) => desc.matches_property(*prop, value),
            CompiledFilter::Predicate(pred) => pred(desc),
        }
    }
}

/// Discover every stream currently visible, observing for `wait`
///
/// Blocks for the full window so slow advertisers are caught, then
/// returns all distinct streams seen.
pub async fn resolve_streams(engine: &Engine, wait: Duration) -> Vec<StreamDescriptor> {
    collect(engine, &CompiledFilter::Any, usize::MAX, wait, true).await
}

/// Discover streams whose property equals a value
///
/// Returns as soon as `minimum` matches were observed, or whatever was
/// found when `timeout` elapsed — possibly fewer, possibly more if
/// several arrived together.
pub async fn resolve_by_prop(
    engine: &Engine,
    prop: StreamProperty,
    value: &str,
    minimum: usize,
    timeout: Duration,
) -> Vec<StreamDescriptor> {
    let filter = CompiledFilter::Property(prop, value.to_string());
    collect(engine, &filter, minimum, timeout, false).await
}

/// Discover streams satisfying a predicate
pub async fn resolve_by_pred<F>(
    engine: &Engine,
    pred: F,
    minimum: usize,
    timeout: Duration,
) -> Vec<StreamDescriptor>
where
    F: Fn(&StreamDescriptor) -> bool + Send + Sync + 'static,
{
    let filter = CompiledFilter::Predicate(Arc::new(pred));
    collect(engine, &filter, minimum, timeout, false).await
}

/// Poll the engine until enough matches were seen or the window closes
async fn collect(
    engine: &Engine,
    filter: &CompiledFilter,
    minimum: usize,
    window: Duration,
    full_window: bool,
) -> Vec<StreamDescriptor> {
    let deadline = Instant::now() + window;
    let mut found: Vec<StreamDescriptor> = Vec::new();

    loop {
        for desc in engine.bus().snapshot() {
            if filter.matches(&desc) && !found.iter().any(|d| d.uid() == desc.uid()) {
                found.push(desc);
            }
        }
        if !full_window && found.len() >= minimum {
            break;
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL.min(deadline - Instant::now())).await;
    }

    tracing::debug!(matches = found.len(), "Resolve window closed");
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ChannelFormat;
    use crate::outlet::{Outlet, OutletOptions};

    fn descriptor(name: &str, stream_type: &str) -> StreamDescriptor {
        StreamDescriptor::new(name, stream_type, 4, 100.0, ChannelFormat::Float32, "").unwrap()
    }

    #[test]
    fn test_filter_conflicts_rejected() {
        let both = StreamFilter::property(StreamProperty::Type, "EEG")
            .with_predicate(|_| true);
        assert!(matches!(both.compile(), Err(Error::Config(_))));

        let prop_only = StreamFilter::any().with_prop(StreamProperty::Name);
        assert!(matches!(prop_only.compile(), Err(Error::Config(_))));

        let value_only = StreamFilter::any().with_value("EEG");
        assert!(matches!(value_only.compile(), Err(Error::Config(_))));
    }

    #[test]
    fn test_filter_valid_combinations() {
        assert!(StreamFilter::any().compile().is_ok());
        assert!(StreamFilter::property(StreamProperty::Type, "EEG")
            .compile()
            .is_ok());
        assert!(StreamFilter::predicate(|d| d.channel_count > 2)
            .compile()
            .is_ok());
    }

    #[tokio::test]
    async fn test_resolve_all_sees_every_stream() {
        let engine = Engine::new();
        let _a = Outlet::new(&engine, descriptor("A", "EEG"), OutletOptions::default()).unwrap();
        let _b =
            Outlet::new(&engine, descriptor("B", "Markers"), OutletOptions::default()).unwrap();

        let found = resolve_streams(&engine, Duration::from_millis(60)).await;
        assert_eq!(found.len(), 2);
        // independent snapshots carry host-assigned fields
        assert!(found.iter().all(|d| d.host.is_some()));
    }

    #[tokio::test]
    async fn test_resolve_by_prop_filters() {
        let engine = Engine::new();
        let _a = Outlet::new(&engine, descriptor("A", "EEG"), OutletOptions::default()).unwrap();
        let _b =
            Outlet::new(&engine, descriptor("B", "Markers"), OutletOptions::default()).unwrap();

        let found = resolve_by_prop(
            &engine,
            StreamProperty::Type,
            "EEG",
            1,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "A");
    }

    #[tokio::test]
    async fn test_resolve_returns_early_once_minimum_met() {
        let engine = Engine::new();
        let _a = Outlet::new(&engine, descriptor("A", "EEG"), OutletOptions::default()).unwrap();

        let started = std::time::Instant::now();
        let found = resolve_by_prop(
            &engine,
            StreamProperty::Type,
            "EEG",
            1,
            Duration::from_secs(30),
        )
        .await;
        assert_eq!(found.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_resolve_may_return_fewer_than_minimum() {
        let engine = Engine::new();
        let found = resolve_by_pred(
            &engine,
            |d| d.stream_type == "Nonexistent",
            3,
            Duration::from_millis(60),
        )
        .await;
        assert!(found.is_empty());
    }
}
