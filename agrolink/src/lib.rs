//! Agrolink is the realtime telemetry core of a farm monitoring
//! dashboard. It subscribes to a per farm "latest value" feed pushed
//! by a remote document store, decodes and validates every record,
//! maintains a bounded rolling history per metric, and fans
//! consistent, race free snapshots out to any number of independent
//! consumers, e.g. a summary screen watching four farms and a detail
//! screen watching one.
//!
//! Malformed payloads, transient backend errors and offline periods
//! never crash the core or corrupt history; every failure degrades to
//! serving the last known state.
//!
//! ```no_run
//! use agrolink::{
//!     config::Config,
//!     decode::FarmKind,
//!     farm::FarmId,
//!     hub::TelemetryHub,
//!     stream::Event,
//!     transport::{SubHandle, Transport, TransportEvent},
//! };
//! use anyhow::Result;
//! use futures::channel::mpsc;
//! use std::sync::Arc;
//!
//! // a client for the backing document store
//! struct Feed;
//! struct Guard;
//! impl SubHandle for Guard {}
//!
//! impl Transport for Feed {
//!     fn subscribe(
//!         &self,
//!         farm: &FarmId,
//!         tx: mpsc::Sender<TransportEvent>,
//!     ) -> Result<Box<dyn SubHandle>> {
//!         // hand tx to the store's push callback for farm
//!         Ok(Box::new(Guard))
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let hub = TelemetryHub::new(Config::default(), Arc::new(Feed));
//! let mut sub = hub.subscribe("AgroFarm", FarmKind::Crop)?;
//! // render instantly from cache, then follow the feed
//! println!("{:?}", sub.snapshot().last_good);
//! while let Some(mut batch) = sub.next().await {
//!     for ev in batch.drain(..) {
//!         match ev {
//!             Event::Changed(snap) => println!("{:?}", snap.last_good),
//!             Event::Failed(e) => eprintln!("feed error: {}", e),
//!             Event::Unsubscribed => return Ok(()),
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Subscriptions to the same farm id share one farm stream and one
//! transport subscription. The stream is created when the first
//! subscriber arrives and torn down when the last one leaves.
#![recursion_limit = "1024"]
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate agrolink_core;

pub use agrolink_core::{farm, window};

pub mod config;
pub mod decode;
pub mod gate;
pub mod hub;
mod mailbox;
pub mod stream;
pub mod transport;
