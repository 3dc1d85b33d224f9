//! Section validation and per-table decoders.

pub mod bytes;
pub mod section;

pub mod cat;
pub mod eit;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod vct;

use crate::clock::Clock;
use crate::demux::DemuxDevice;
use crate::model::Hooks;
use crate::registry::TunedStream;

/// What a decoder made of one validated section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeResult {
    /// Consumed; bumps the subscription's section count.
    Handled,
    /// Valid but not addressed to "now" (current/next indicator clear).
    Ignored,
    /// Wrong table id, short body, or references nothing we know.
    NotApplicable,
}

/// Everything a decoder may touch, borrowed under the adapter lock.
/// Decoders must not block: that lock is shared with tuning and
/// registration.
pub(crate) struct DecodeCtx<'a, D: DemuxDevice> {
    pub dev: &'a D,
    pub path: &'a str,
    pub stream: &'a mut TunedStream,
    pub hooks: &'a mut Hooks,
    pub autodiscovery: bool,
    pub clock: &'a dyn Clock,
}
