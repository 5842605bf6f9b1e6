use crate::{
    config::Config,
    decode::FarmKind,
    gate::ConnectivityGate,
    mailbox::{mailbox, Mailbox},
    stream::{
        CurrentCell, Event, FarmSnapshot, FarmState, StreamCtx, StreamId, SubId,
        Subscribers,
    },
    transport::Transport,
};
use agrolink_core::farm::FarmId;
use anyhow::Result;
use futures::channel::oneshot;
use fxhash::FxHashMap;
use log::info;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{
    collections::{hash_map::Entry, VecDeque},
    sync::{Arc, Weak},
};
use tokio::task;
use triomphe::Arc as TArc;

struct StreamHandle {
    id: StreamId,
    kind: FarmKind,
    subs: Subscribers,
    current: CurrentCell,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

struct HubInner {
    cfg: Config,
    transport: Arc<dyn Transport>,
    gate: ConnectivityGate,
    streams: FxHashMap<FarmId, StreamHandle>,
}

pub struct TelemetryHubBuilder {
    transport: Option<Arc<dyn Transport>>,
    cfg: Option<Config>,
    gate: Option<ConnectivityGate>,
}

impl TelemetryHubBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        TelemetryHubBuilder { transport: Some(transport), cfg: None, gate: None }
    }

    pub fn config(&mut self, cfg: Config) -> &mut Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn gate(&mut self, gate: ConnectivityGate) -> &mut Self {
        self.gate = Some(gate);
        self
    }

    pub fn build(&mut self) -> Result<TelemetryHub> {
        let transport = self
            .transport
            .take()
            .ok_or_else(|| anyhow!("transport is required, did you reuse the builder?"))?;
        let cfg = self.cfg.take().unwrap_or_default();
        let gate = self.gate.take().unwrap_or_default();
        Ok(TelemetryHub::with_gate(cfg, transport, gate))
    }
}

/// Process wide registry of farm streams. Any number of independent
/// consumers may subscribe to the same farm id; they share exactly
/// one farm stream and one transport subscription, created on the
/// first subscribe and torn down when the last subscriber leaves.
#[derive(Clone)]
pub struct TelemetryHub(Arc<Mutex<HubInner>>);

impl TelemetryHub {
    pub fn new(cfg: Config, transport: Arc<dyn Transport>) -> TelemetryHub {
        TelemetryHub::with_gate(cfg, transport, ConnectivityGate::default())
    }

    pub fn with_gate(
        cfg: Config,
        transport: Arc<dyn Transport>,
        gate: ConnectivityGate,
    ) -> TelemetryHub {
        TelemetryHub(Arc::new(Mutex::new(HubInner {
            cfg,
            transport,
            gate,
            streams: FxHashMap::default(),
        })))
    }

    /// Subscribe to the specified farm. If no stream exists for
    /// `farm` one is created and its transport subscription started;
    /// otherwise the existing stream is joined. It is safe to call
    /// this concurrently with other subscribes and unsubscribes for
    /// the same farm, there will never be more than one live
    /// transport subscription per farm id.
    pub fn subscribe(&self, farm: impl Into<FarmId>, kind: FarmKind) -> Result<Subscription> {
        let farm = farm.into();
        let mut t = self.0.lock();
        let t = &mut *t;
        let handle = match t.streams.entry(farm.clone()) {
            Entry::Occupied(e) => {
                let h = e.into_mut();
                if h.kind != kind {
                    bail!("{} is already subscribed as {:?}", farm, h.kind)
                }
                h
            }
            Entry::Vacant(e) => {
                let id = StreamId::new();
                let (stop_tx, stop_rx) = oneshot::channel();
                let subs: Subscribers = TArc::new(Mutex::new(SmallVec::new()));
                let initial = FarmState::new(farm.clone(), kind, t.cfg.window_capacity)
                    .snapshot();
                let current: CurrentCell =
                    TArc::new(Mutex::new(TArc::new(initial)));
                let ctx = StreamCtx {
                    id,
                    farm: farm.clone(),
                    kind,
                    cfg: t.cfg.clone(),
                    transport: t.transport.clone(),
                    gate: t.gate.clone(),
                    subs: subs.clone(),
                    current: current.clone(),
                };
                task::spawn(ctx.run(stop_rx));
                info!("created farm stream {:?} for {}", id, farm);
                e.insert(StreamHandle { id, kind, subs, current, stop: Some(stop_tx) })
            }
        };
        let id = SubId::new();
        let (tx, rx) = mailbox(t.cfg.mailbox_depth);
        handle.subs.lock().push((id, tx));
        Ok(Subscription {
            id,
            farm,
            hub: Arc::downgrade(&self.0),
            mailbox: rx,
            current: handle.current.clone(),
        })
    }

    /// Detach a subscription now instead of waiting for it to drop.
    pub fn unsubscribe(&self, sub: Subscription) {
        drop(sub)
    }

    /// The last known state of `farm` without waiting for the next
    /// push; None if nothing is subscribed to `farm`. A newly opened
    /// screen renders from this while the next event is in flight.
    pub fn current(&self, farm: &FarmId) -> Option<TArc<FarmSnapshot>> {
        let t = self.0.lock();
        t.streams.get(farm).map(|h| h.current.lock().clone())
    }

    pub fn is_subscribed(&self, farm: &FarmId) -> bool {
        self.0.lock().streams.contains_key(farm)
    }

    pub fn subscriber_count(&self, farm: &FarmId) -> usize {
        let t = self.0.lock();
        t.streams.get(farm).map(|h| h.subs.lock().len()).unwrap_or(0)
    }

    fn remove(inner: &Arc<Mutex<HubInner>>, farm: &FarmId, id: SubId) {
        let mut t = inner.lock();
        if let Entry::Occupied(e) = t.streams.entry(farm.clone()) {
            let last = {
                let mut subs = e.get().subs.lock();
                subs.retain(|(i, _)| *i != id);
                subs.is_empty()
            };
            if last {
                // dropping the handle inside the lock stops the task
                // and cancels the transport subscription, so a racing
                // subscribe either joins before this point or creates
                // a fresh stream after it
                let h = e.remove();
                info!("tore down farm stream {:?} for {}", h.id, farm);
            }
        }
    }
}

/// One consumer's registered interest in one farm. Events arrive in
/// the order the stream emitted them; a subscription that is not
/// drained loses its oldest undelivered events, never the newest.
/// Dropping it detaches immediately and tears the stream down if it
/// was the last one.
pub struct Subscription {
    id: SubId,
    farm: FarmId,
    hub: Weak<Mutex<HubInner>>,
    mailbox: Mailbox<Event>,
    current: CurrentCell,
}

impl Subscription {
    pub fn id(&self) -> SubId {
        self.id
    }

    pub fn farm(&self) -> &FarmId {
        &self.farm
    }

    /// The last known state, served from cache.
    pub fn snapshot(&self) -> TArc<FarmSnapshot> {
        self.current.lock().clone()
    }

    /// Receive everything delivered since the last call, in emission
    /// order. None once the stream has shut down.
    pub async fn next(&mut self) -> Option<VecDeque<Event>> {
        self.mailbox.recv().await
    }

    /// How many events were conflated away because this consumer fell
    /// behind.
    pub fn conflated(&self) -> u64 {
        self.mailbox.conflated()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // closing first guarantees no new deliveries start after drop
        // returns
        self.mailbox.close();
        if let Some(inner) = Weak::upgrade(&self.hub) {
            TelemetryHub::remove(&inner, &self.farm, self.id);
        }
    }
}
