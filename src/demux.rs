//! Hardware section-filter abstraction.
//!
//! A device owns a small fixed pool of filter slots. Each bound slot
//! isolates sections matching one PID (plus an optional match on the
//! first section byte, i.e. the table id) and raises a readiness event
//! tagged with the owning subscription's [`SubKey`].

use std::io;

use bytes::Bytes;

use crate::registry::SubKey;

/// Opaque handle to one programmed filter slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterHandle(pub u32);

/// What to program into a filter slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterParams {
    pub pid: u16,
    /// Optional (value, mask) match on byte 0 of the section.
    pub byte0: Option<(u8, u8)>,
    /// Ask the hardware to CRC-check. Not trusted: the dispatch path
    /// re-checks in software when the subscription requires it.
    pub check_crc: bool,
    pub immediate_start: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ReadyEvent {
    pub key: SubKey,
    pub handle: FilterHandle,
}

pub trait DemuxDevice: Send + Sync + 'static {
    /// Acquire and program a free filter slot. Fails when the pool is
    /// exhausted or the device rejects the parameters; the caller then
    /// queues the subscription instead.
    fn open_filter(
        &self,
        path: &str,
        params: &FilterParams,
        key: SubKey,
    ) -> io::Result<FilterHandle>;

    /// Release a slot back to the pool and drop its readiness interest.
    fn close_filter(&self, handle: FilterHandle);

    /// Block until at least one bound filter has a section ready.
    /// `Ok(0)` is a spurious wakeup; `Err` means the device is gone and
    /// the dispatch thread should exit.
    fn wait(&self, out: &mut Vec<ReadyEvent>) -> io::Result<usize>;

    /// Read one complete section from a ready slot, at most
    /// [`MAX_SECTION_SIZE`](crate::constants::MAX_SECTION_SIZE) bytes.
    fn read_section(&self, handle: FilterHandle) -> io::Result<Bytes>;
}
