//! Single-threaded dispatch loop, one per adapter.
//!
//! Blocks in the device's readiness wait, reads one section per ready
//! filter, and resolves it to its subscription under the adapter-wide
//! lock. Everything downstream of that lock must be non-blocking.

use std::sync::{Arc, Mutex};

use crate::adapter::AdapterState;
use crate::clock::Clock;
use crate::constants::{
    MIN_SECTION_HEADER, TABLE_CHECK_CRC, TABLE_INC_HEADER, TABLE_QUICKREQ, TUNE_GRACE_US,
};
use crate::demux::DemuxDevice;
use crate::model::Hooks;
use crate::psi;
use crate::psi::{DecodeCtx, DecodeResult};
use crate::registry::{SubKey, TableDecoder, TunedStream};
use crate::scheduler;

pub(crate) fn run<D: DemuxDevice>(
    dev: Arc<D>,
    path: String,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<AdapterState>>,
) {
    let mut events = Vec::with_capacity(8);
    loop {
        events.clear();
        match dev.wait(&mut events) {
            Ok(_) => {}
            Err(e) => {
                log::warn!("\"{path}\" table dispatch stopping: {e}");
                return;
            }
        }
        for ev in events.drain(..) {
            let Ok(sec) = dev.read_section(ev.handle) else {
                continue;
            };
            if sec.len() < MIN_SECTION_HEADER {
                continue;
            }
            let mut st = state.lock().unwrap();
            handle_section(&*dev, &path, &mut st, &*clock, ev.key, &sec);
        }
    }
}

/// Process one raw section under the adapter lock. Sections that fail
/// validation, miss the grace window or match nothing vanish silently;
/// broadcast noise is expected.
pub(crate) fn handle_section<D: DemuxDevice>(
    dev: &D,
    path: &str,
    st: &mut AdapterState,
    clock: &dyn Clock,
    key: SubKey,
    sec: &[u8],
) {
    let AdapterState { current, scanning_muxes, autodiscovery, hooks } = st;
    let Some(stream) = current.as_mut() else {
        return;
    };
    // Some tuners report lock before the front end actually has it,
    // delivering garbage or stale sections right after the tune.
    if clock.mono_us().saturating_sub(stream.table_start_us) < TUNE_GRACE_US {
        return;
    }
    let Some(sub) = stream.subs.get(key) else {
        return;
    };
    let flags = sub.flags;
    let decoder = sub.decoder.clone();

    let Some(valid) = psi::section::validate(
        sec,
        flags & TABLE_CHECK_CRC != 0,
        flags & TABLE_INC_HEADER != 0,
    ) else {
        // malformed or CRC-failing reads never rotate
        return;
    };

    let result = {
        let mut ctx = DecodeCtx {
            dev,
            path,
            stream: &mut *stream,
            hooks: &mut *hooks,
            autodiscovery: *autodiscovery,
            clock,
        };
        match &decoder {
            TableDecoder::Pat => psi::pat::decode(&mut ctx, valid.payload),
            TableDecoder::Cat => psi::cat::decode(&mut ctx, valid.payload),
            TableDecoder::Sdt => psi::sdt::decode(&mut ctx, valid.payload),
            TableDecoder::Eit => psi::eit::decode(&mut ctx, valid.payload, valid.table_id),
            TableDecoder::Nit => psi::nit::decode(&mut ctx, valid.payload, valid.table_id),
            TableDecoder::Vct => psi::vct::decode(&mut ctx, valid.payload, valid.table_id),
            TableDecoder::Pmt { service } => psi::pmt::decode(&mut ctx, service, valid.payload),
            // hook point for downstream conditional-access handling
            TableDecoder::CaStream { .. } => DecodeResult::Handled,
        }
    };

    if result == DecodeResult::Handled {
        if let Some(sub) = stream.subs.get_mut(key) {
            sub.count += 1;
        }
    }
    if flags & TABLE_QUICKREQ != 0 {
        fastswitch(path, stream, scanning_muxes, hooks);
    }

    // one validated section per turn, then rotate if anyone is waiting
    if !stream.pending.is_empty() {
        scheduler::release(dev, stream, key);
        scheduler::admit_next(dev, path, stream);
    }
}

/// Fast-completion: initial scan is done once every quick-request table
/// on the stream has produced at least one section.
fn fastswitch(path: &str, stream: &mut TunedStream, scanning_muxes: &mut u32, hooks: &mut Hooks) {
    if !stream.initial_scan {
        return;
    }
    for (_, sub) in stream.subs.iter() {
        if sub.flags & TABLE_QUICKREQ != 0 && sub.count == 0 {
            return;
        }
    }
    stream.initial_scan = false;
    *scanning_muxes = scanning_muxes.saturating_sub(1);
    log::info!(
        "\"{path}\" initial scan completed (transport id {:?})",
        stream.transport_id
    );
    hooks.model.initial_scan_complete();
}
