use crate::{
    config::Config,
    decode::{self, FarmKind, MetricName, Validity},
    gate::ConnectivityGate,
    mailbox::MailboxSender,
    transport::{SubHandle, Transport, TransportError, TransportEvent},
};
use agrolink_core::{farm::FarmId, window::RollingWindow};
use chrono::{DateTime, Utc};
use futures::{channel::{mpsc, oneshot}, prelude::*, select_biased};
use fxhash::FxHashMap;
use log::{info, trace, warn};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{error, fmt, sync::Arc};
use tokio::time::{self, Instant};
use triomphe::Arc as TArc;

atomic_id!(SubId);
atomic_id!(StreamId);

// transport pushes buffered between the feed task and the stream task
const FEED_BUFFER: usize = 3;

/// Freshness of a farm's state.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// updated within the expected push cadence
    Fresh,
    /// a last known value exists but nothing fresh arrived within the
    /// expected cadence, or the feed holds no records yet
    Stale,
    /// the last record failed to decode, or the feed failed
    Errored,
}

/// Why a stream emitted `Event::Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// the last pushed record was not a structured object
    Decode,
    Transport(TransportError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Decode => write!(f, "malformed record"),
            StreamError::Transport(e) => write!(f, "transport: {}", e),
        }
    }
}

impl error::Error for StreamError {}

/// An immutable copy of a farm's state at one point in time.
/// Consumers only ever hold these, never references into live stream
/// state, so a renderer can walk the charts while the stream keeps
/// ingesting.
#[derive(Debug, Clone)]
pub struct FarmSnapshot {
    pub farm: FarmId,
    pub kind: FarmKind,
    pub status: Status,
    /// last known good value per metric; zeros until the first record
    pub last_good: FxHashMap<MetricName, f64>,
    /// which of `last_good` were actually measured, see [`Validity`]
    pub valid: Validity,
    /// ingestion time of the last good record
    pub last_update: Option<DateTime<Utc>>,
    pub decode_errors: u64,
    /// per metric window contents in arrival order, for charting
    pub charts: FxHashMap<MetricName, Vec<f64>>,
    /// chart x coordinate of the first element of each chart
    pub origins: FxHashMap<MetricName, u64>,
}

/// What subscribers receive from a farm stream.
#[derive(Debug, Clone)]
pub enum Event {
    /// state advanced; carries the snapshot after the change
    Changed(TArc<FarmSnapshot>),
    /// the stream hit an error; previous state is retained and still
    /// served by snapshots
    Failed(StreamError),
    /// the stream shut down, nothing further will be delivered
    Unsubscribed,
}

pub(crate) type Subscribers = TArc<Mutex<SmallVec<[(SubId, MailboxSender<Event>); 1]>>>;
pub(crate) type CurrentCell = TArc<Mutex<TArc<FarmSnapshot>>>;

/// Mutable per farm state. Owned exclusively by the stream task,
/// single writer; everything consumers see is a copy.
pub(crate) struct FarmState {
    farm: FarmId,
    kind: FarmKind,
    status: Status,
    last_good: FxHashMap<MetricName, f64>,
    valid: Validity,
    last_update: Option<DateTime<Utc>>,
    last_instant: Option<Instant>,
    decode_errors: u64,
    windows: FxHashMap<MetricName, RollingWindow<f64>>,
}

impl FarmState {
    pub(crate) fn new(farm: FarmId, kind: FarmKind, capacity: usize) -> Self {
        let last_good =
            kind.metrics().iter().map(|m| (*m, 0.0)).collect::<FxHashMap<_, _>>();
        let windows = kind
            .metrics()
            .iter()
            .map(|m| (*m, RollingWindow::new(capacity)))
            .collect::<FxHashMap<_, _>>();
        FarmState {
            farm,
            kind,
            status: Status::Stale,
            last_good,
            valid: Validity::empty(),
            last_update: None,
            last_instant: None,
            decode_errors: 0,
            windows,
        }
    }

    fn apply(&mut self, reading: &decode::SensorReading) {
        for (m, v) in &reading.metrics {
            if let Some(w) = self.windows.get_mut(m) {
                w.push(*v);
            }
            self.last_good.insert(*m, *v);
        }
        self.valid = reading.valid;
        self.last_update = Some(reading.observed_at);
        self.last_instant = Some(Instant::now());
        self.status = Status::Fresh;
    }

    fn clear(&mut self) {
        for v in self.last_good.values_mut() {
            *v = 0.0;
        }
        self.valid = Validity::empty();
        self.status = Status::Stale;
    }

    pub(crate) fn snapshot(&self) -> FarmSnapshot {
        let charts = self
            .windows
            .iter()
            .map(|(m, w)| (*m, w.snapshot()))
            .collect::<FxHashMap<_, _>>();
        let origins = self
            .windows
            .iter()
            .map(|(m, w)| (*m, w.first_position()))
            .collect::<FxHashMap<_, _>>();
        FarmSnapshot {
            farm: self.farm.clone(),
            kind: self.kind,
            status: self.status,
            last_good: self.last_good.clone(),
            valid: self.valid,
            last_update: self.last_update,
            decode_errors: self.decode_errors,
            charts,
            origins,
        }
    }
}

/// Everything a farm stream task needs. Built by the hub, consumed by
/// `run`.
pub(crate) struct StreamCtx {
    pub(crate) id: StreamId,
    pub(crate) farm: FarmId,
    pub(crate) kind: FarmKind,
    pub(crate) cfg: Config,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) gate: ConnectivityGate,
    pub(crate) subs: Subscribers,
    pub(crate) current: CurrentCell,
}

impl StreamCtx {
    /// The stream task. One per farm id, the single point of mutation
    /// for that farm's state. Decode and window pushes happen inline,
    /// fan-out never blocks on a slow consumer, so the task is always
    /// ready for the next push.
    pub(crate) async fn run(self, stop: oneshot::Receiver<()>) {
        let mut stop = stop.fuse();
        let mut state = FarmState::new(self.farm.clone(), self.kind, self.cfg.window_capacity);
        if let Some(seed) = self.gate.seed(&self.farm) {
            for (m, v) in seed {
                if state.last_good.contains_key(&m) {
                    state.last_good.insert(m, v);
                }
            }
        }
        self.publish(&state);
        let (tx_ev, mut rx_ev) = mpsc::channel(FEED_BUFFER);
        let mut handle: Option<Box<dyn SubHandle>> = None;
        if self.gate.online() {
            match self.transport.subscribe(&self.farm, tx_ev.clone()) {
                Ok(h) => handle = Some(h),
                Err(e) => warn!("{}: transport subscribe failed: {}", self.farm, e),
            }
        } else {
            info!("{}: offline at subscribe time, serving cached state", self.farm);
        }
        let mut tick = time::interval(self.cfg.housekeeping);
        loop {
            select_biased! {
                _ = stop => break,
                ev = rx_ev.next() => match ev {
                    Some(TransportEvent::Record(raw)) => self.on_record(&mut state, &raw),
                    Some(TransportEvent::Empty) => self.on_empty(&mut state),
                    Some(TransportEvent::Lost(e)) => self.on_lost(&mut state, e),
                    // all senders gone, the arm is disabled from here on
                    None => warn!("{}: feed channel closed", self.farm),
                },
                _ = tick.tick().fuse() => self.on_tick(&mut state, &mut handle, &tx_ev),
            }
        }
        drop(handle);
        for (_, tx) in self.subs.lock().iter() {
            tx.send(Event::Unsubscribed);
        }
        info!("farm stream {:?} for {} shut down", self.id, self.farm);
    }

    fn on_record(&self, state: &mut FarmState, raw: &[u8]) {
        match decode::decode(&self.farm, self.kind, raw, Utc::now()) {
            Err(_) => {
                // never corrupt history with a bad sample
                state.decode_errors += 1;
                state.status = Status::Errored;
                warn!("{}: malformed record dropped", self.farm);
                self.publish(state);
                self.notify(Event::Failed(StreamError::Decode));
            }
            Ok(reading) => {
                state.apply(&reading);
                self.gate.record(&self.farm, &state.last_good);
                let snap = self.publish(state);
                trace!("{}: applied {} metrics", self.farm, reading.metrics.len());
                self.notify(Event::Changed(snap));
            }
        }
    }

    fn on_empty(&self, state: &mut FarmState) {
        // brand new farm, feed exists but has no entries yet
        state.clear();
        let snap = self.publish(state);
        self.notify(Event::Changed(snap));
    }

    fn on_lost(&self, state: &mut FarmState, e: TransportError) {
        warn!("{}: feed lost: {}", self.farm, e);
        state.status = Status::Errored;
        self.publish(state);
        self.notify(Event::Failed(StreamError::Transport(e)));
    }

    fn on_tick(
        &self,
        state: &mut FarmState,
        handle: &mut Option<Box<dyn SubHandle>>,
        tx_ev: &mpsc::Sender<TransportEvent>,
    ) {
        if handle.is_none() && self.gate.online() {
            match self.transport.subscribe(&self.farm, tx_ev.clone()) {
                Ok(h) => {
                    info!("{}: transport subscription established", self.farm);
                    *handle = Some(h);
                }
                Err(e) => warn!("{}: transport subscribe failed: {}", self.farm, e),
            }
        }
        // absence of updates is itself a signal
        if state.status == Status::Fresh {
            let quiet = match state.last_instant {
                Some(t) => t.elapsed() > self.cfg.stale_after,
                None => true,
            };
            if quiet {
                state.status = Status::Stale;
                let snap = self.publish(state);
                self.notify(Event::Changed(snap));
            }
        }
        self.subs.lock().retain(|(id, tx)| {
            let live = !tx.is_closed();
            if !live {
                trace!("{}: pruned subscriber {:?}", self.farm, id);
            }
            live
        });
    }

    fn publish(&self, state: &FarmState) -> TArc<FarmSnapshot> {
        let snap = TArc::new(state.snapshot());
        *self.current.lock() = snap.clone();
        snap
    }

    fn notify(&self, ev: Event) {
        self.subs.lock().retain(|(id, tx)| {
            let ok = tx.send(ev.clone());
            if !ok {
                trace!("{}: subscriber {:?} detached", self.farm, id);
            }
            ok
        });
    }
}
