//! Continuously-updating resolver
//!
//! Keeps a live registry of discovered streams in the background. Each
//! entry records when its stream was last seen advertising; entries going
//! stale beyond the configured forget-after window are evicted from query
//! results. Eviction is time-based, never capacity-based.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::descriptor::StreamDescriptor;
use crate::engine::{Engine, POLL_INTERVAL};
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;

use super::{CompiledFilter, StreamFilter};

/// Background resolver with a time-evicted result registry
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use pulselink::{ContinuousResolver, Engine, StreamFilter, StreamProperty};
///
/// # fn example() -> pulselink::Result<()> {
/// let engine = Engine::new();
/// let resolver = ContinuousResolver::new(
///     &engine,
///     StreamFilter::property(StreamProperty::Type, "EEG"),
///     Duration::from_secs(5),
/// )?;
///
/// // some time later, non-blocking:
/// for desc in resolver.results() {
///     println!("visible: {}", desc);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ContinuousResolver {
    registry: Arc<Mutex<HashMap<String, SeenStream>>>,
    forget_after: Duration,
    task: Option<tokio::task::JoinHandle<()>>,
    lifecycle: Lifecycle,
}

struct SeenStream {
    descriptor: StreamDescriptor,
    last_seen: Instant,
}

impl ContinuousResolver {
    /// Start background discovery with a filter and a forget-after window
    ///
    /// Fails with a configuration error on a conflicting or incomplete
    /// filter, or a zero forget-after window.
    pub fn new(engine: &Engine, filter: StreamFilter, forget_after: Duration) -> Result<Self> {
        if forget_after.is_zero() {
            return Err(Error::Config(
                "forget_after must be a positive duration".into(),
            ));
        }
        let compiled = filter.compile()?;

        let registry: Arc<Mutex<HashMap<String, SeenStream>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let task = Self::spawn_watcher(engine, compiled, Arc::clone(&registry));

        Ok(Self {
            registry,
            forget_after,
            task: Some(task),
            lifecycle: Lifecycle::new("continuous resolver"),
        })
    }

    /// Background task observing advertisements and refreshing last-seen
    fn spawn_watcher(
        engine: &Engine,
        filter: CompiledFilter,
        registry: Arc<Mutex<HashMap<String, SeenStream>>>,
    ) -> tokio::task::JoinHandle<()> {
        let bus = engine.bus().clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut seen = registry.lock().unwrap();
                for desc in bus.snapshot() {
                    if !filter.matches(&desc) {
                        continue;
                    }
                    let uid = desc.uid().to_string();
                    seen.entry(uid)
                        .and_modify(|entry| entry.last_seen = now)
                        .or_insert_with(|| {
                            tracing::debug!(stream = %desc, "Stream discovered");
                            SeenStream {
                                descriptor: desc,
                                last_seen: now,
                            }
                        });
                }
            }
        })
    }

    /// Snapshot of every stream seen advertising recently; never blocks
    ///
    /// Entries whose last advertisement is older than the forget-after
    /// window are evicted here before the snapshot is taken.
    pub fn results(&self) -> Vec<StreamDescriptor> {
        if self.lifecycle.is_destroyed() {
            return Vec::new();
        }
        let now = Instant::now();
        let mut seen = self.registry.lock().unwrap();
        seen.retain(|_, entry| {
            let fresh = now.duration_since(entry.last_seen) <= self.forget_after;
            if !fresh {
                tracing::debug!(stream = %entry.descriptor, "Stream forgotten (stale)");
            }
            fresh
        });
        seen.values().map(|entry| entry.descriptor.clone()).collect()
    }

    /// Stop background discovery
    ///
    /// Idempotent; further calls are no-ops. Dropping the resolver without
    /// calling this runs the same teardown exactly once.
    pub fn destroy(&mut self) {
        if self.lifecycle.begin_destroy() {
            if let Some(task) = self.task.take() {
                task.abort();
            }
            self.registry.lock().unwrap().clear();
        }
    }
}

impl Drop for ContinuousResolver {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::StreamProperty;
    use crate::format::ChannelFormat;
    use crate::outlet::{Outlet, OutletOptions};

    fn descriptor(name: &str, stream_type: &str) -> StreamDescriptor {
        StreamDescriptor::new(name, stream_type, 2, 100.0, ChannelFormat::Float32, "").unwrap()
    }

    #[tokio::test]
    async fn test_zero_forget_after_rejected() {
        let engine = Engine::new();
        let result = ContinuousResolver::new(&engine, StreamFilter::any(), Duration::ZERO);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_conflicting_filter_rejected() {
        let engine = Engine::new();
        let filter = StreamFilter::property(StreamProperty::Type, "EEG").with_predicate(|_| true);
        let result = ContinuousResolver::new(&engine, filter, Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_discovers_matching_streams_only() {
        let engine = Engine::new();
        let resolver = ContinuousResolver::new(
            &engine,
            StreamFilter::property(StreamProperty::Type, "EEG"),
            Duration::from_secs(5),
        )
        .unwrap();

        let _eeg = Outlet::new(&engine, descriptor("A", "EEG"), OutletOptions::default()).unwrap();
        let _markers =
            Outlet::new(&engine, descriptor("B", "Markers"), OutletOptions::default()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let results = resolver.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "A");
    }

    #[tokio::test]
    async fn test_stale_entries_evicted_after_forget_window() {
        let engine = Engine::new();
        let resolver = ContinuousResolver::new(
            &engine,
            StreamFilter::any(),
            Duration::from_millis(300),
        )
        .unwrap();

        let mut outlet =
            Outlet::new(&engine, descriptor("A", "EEG"), OutletOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(resolver.results().len(), 1);

        // the provider goes away; no further advertisements refresh it
        outlet.destroy();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(resolver.results().is_empty());
    }

    #[tokio::test]
    async fn test_entry_stays_fresh_while_advertised() {
        let engine = Engine::new();
        let resolver = ContinuousResolver::new(
            &engine,
            StreamFilter::any(),
            Duration::from_millis(200),
        )
        .unwrap();

        let _outlet =
            Outlet::new(&engine, descriptor("A", "EEG"), OutletOptions::default()).unwrap();
        // well past the forget window; advertisements keep refreshing it
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(resolver.results().len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_stops_discovery() {
        let engine = Engine::new();
        let mut resolver =
            ContinuousResolver::new(&engine, StreamFilter::any(), Duration::from_secs(5)).unwrap();
        resolver.destroy();
        resolver.destroy();

        let _outlet =
            Outlet::new(&engine, descriptor("A", "EEG"), OutletOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(resolver.results().is_empty());
    }
}
