use crate::decode::MetricName;
use agrolink_core::farm::FarmId;
use fxhash::FxHashMap;
use std::sync::Arc;

/// Point in time network status. Polled, not pushed.
pub trait Reachability: Send + Sync + 'static {
    fn is_reachable(&self) -> bool;
}

/// Treats the network as always up. The default when no reachability
/// collaborator is injected.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

impl Reachability for AlwaysReachable {
    fn is_reachable(&self) -> bool {
        true
    }
}

/// Optional persistence of last known good values, keyed by farm id.
/// When present, a stream created while offline starts from the
/// cached values instead of zeros.
pub trait LastGoodCache: Send + Sync + 'static {
    fn load(&self, farm: &FarmId) -> Option<FxHashMap<MetricName, f64>>;
    fn store(&self, farm: &FarmId, values: &FxHashMap<MetricName, f64>);
}

/// Wraps outbound subscribes with a reachability check. When offline
/// at subscribe time the stream still comes up, Stale and seeded from
/// the cache, so the dashboard always has something to render.
#[derive(Clone)]
pub struct ConnectivityGate {
    reachability: Arc<dyn Reachability>,
    cache: Option<Arc<dyn LastGoodCache>>,
}

impl Default for ConnectivityGate {
    fn default() -> Self {
        ConnectivityGate { reachability: Arc::new(AlwaysReachable), cache: None }
    }
}

impl ConnectivityGate {
    pub fn new(reachability: Arc<dyn Reachability>) -> Self {
        ConnectivityGate { reachability, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<dyn LastGoodCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn online(&self) -> bool {
        self.reachability.is_reachable()
    }

    /// Cached last known good values for `farm`, if any.
    pub fn seed(&self, farm: &FarmId) -> Option<FxHashMap<MetricName, f64>> {
        self.cache.as_ref().and_then(|c| c.load(farm))
    }

    /// Write through after a good update.
    pub fn record(&self, farm: &FarmId, values: &FxHashMap<MetricName, f64>) {
        if let Some(c) = &self.cache {
            c.store(farm, values)
        }
    }
}
