use agrolink_core::farm::FarmId;
use anyhow::Result;
use arcstr::ArcStr;
use bytes::Bytes;
use futures::channel::mpsc;
use std::{error, fmt};

/// A transport level failure of one feed attempt. Whether and when to
/// retry after one of these is the transport's decision, the core
/// keeps serving its cached state either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// the feed was cancelled by the remote side
    Cancelled,
    PermissionDenied,
    Other(ArcStr),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Cancelled => write!(f, "feed cancelled"),
            TransportError::PermissionDenied => write!(f, "permission denied"),
            TransportError::Other(m) => write!(f, "{}", m),
        }
    }
}

impl error::Error for TransportError {}

/// One push from a farm's remote feed. The backend keeps only the
/// latest record per farm, so `Record` carries at most one logical
/// record per push.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// the latest record under the farm's key, as an opaque byte blob
    Record(Bytes),
    /// the feed exists but holds no records yet
    Empty,
    /// this feed attempt failed
    Lost(TransportError),
}

/// Guard for one live feed. Dropping it cancels the feed.
pub trait SubHandle: Send + Sync + 'static {}

/// The remote push feed, injected into the telemetry hub. One call to
/// `subscribe` opens one logical feed delivering `TransportEvent`s to
/// `tx` until the returned handle is dropped. Implementations own all
/// reconnect and backoff policy.
pub trait Transport: Send + Sync + 'static {
    fn subscribe(
        &self,
        farm: &FarmId,
        tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn SubHandle>>;
}
