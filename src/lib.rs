//! Broadcast SI/PSI table demultiplexing core.
//!
//! One [`adapter::Adapter`] per physical receiver owns a dispatch
//! thread that blocks on the demux device, validates incoming sections
//! and feeds them to the decoder for the subscription that produced
//! them. Hardware filter slots are scarce, so subscriptions time-share
//! them round-robin: after each well-formed section a bound table
//! rotates out if anything is queued.
//!
//! Decoded table content never lands in this crate; it is pushed into
//! the embedding application through the [`model`] traits (service
//! catalog, EPG store, elementary-stream parser, string decoder).

pub mod adapter;
pub mod clock;
pub mod constants;
pub mod demux;
pub mod model;
pub mod psi;
pub mod registry;
pub mod testing;

mod dispatch;
mod scheduler;

pub use adapter::{Adapter, AdapterState, Standard};
pub use clock::{Clock, SystemClock};
pub use demux::{DemuxDevice, FilterHandle, FilterParams, ReadyEvent};
pub use model::{EpgSink, Hooks, Service, ServiceModel, ServiceRef, StreamParser};
pub use registry::{SubKey, SubscriptionInfo, TableDecoder};
