//! Filter resource scheduler.
//!
//! Hardware filter slots are few and fixed while subscriptions are not,
//! so slots are time-shared: a subscription that cannot get one queues,
//! and the dispatch loop rotates a bound subscription out after each
//! well-formed section whenever anyone is waiting. Eventual fairness,
//! not bounded latency.

use crate::demux::DemuxDevice;
use crate::registry::{FilterState, SubKey, TunedStream};

/// Try to acquire and program a filter slot for `key`. On failure the
/// subscription goes to the tail of the pending queue.
pub(crate) fn bind<D: DemuxDevice>(dev: &D, path: &str, stream: &mut TunedStream, key: SubKey) {
    stream.pending.retain(|k| *k != key);
    let Some(sub) = stream.subs.get_mut(key) else {
        return;
    };
    debug_assert_eq!(sub.state, FilterState::Pending);
    match dev.open_filter(path, &sub.fparams, key) {
        Ok(handle) => {
            log::debug!("table \"{}\" pid 0x{:04x} bound to filter {}", sub.name, sub.pid, handle.0);
            sub.state = FilterState::Bound(handle);
        }
        Err(e) => {
            log::debug!("table \"{}\" pid 0x{:04x} queued: {e}", sub.name, sub.pid);
            stream.pending.push_back(key);
        }
    }
}

/// Release the filter slot held by `key` and append the subscription to
/// the pending queue.
pub(crate) fn release<D: DemuxDevice>(dev: &D, stream: &mut TunedStream, key: SubKey) {
    let Some(sub) = stream.subs.get_mut(key) else {
        return;
    };
    if let FilterState::Bound(handle) = sub.state {
        dev.close_filter(handle);
    }
    sub.state = FilterState::Pending;
    stream.pending.push_back(key);
}

/// Admit the head of the pending queue, if any.
pub(crate) fn admit_next<D: DemuxDevice>(dev: &D, path: &str, stream: &mut TunedStream) {
    if let Some(key) = stream.pending.front().copied() {
        bind(dev, path, stream, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TableDecoder;
    use crate::testing::MockDevice;

    const PATH: &str = "/dev/dvb/adapter0/demux0";

    fn stream_with_tables(dev: &MockDevice, pids: &[u16]) -> TunedStream {
        let mut stream = TunedStream::new(0, false);
        for &pid in pids {
            stream.add_table(dev, PATH, TableDecoder::Sdt, &format!("t{pid}"), 0, pid, None);
        }
        stream
    }

    fn bound_and_pending(stream: &TunedStream) -> (Vec<u16>, Vec<u16>) {
        let mut bound = Vec::new();
        for (_, s) in stream.subs.iter() {
            if matches!(s.state, FilterState::Bound(_)) {
                bound.push(s.pid);
            }
        }
        let pending = stream
            .pending
            .iter()
            .map(|k| stream.subs.get(*k).unwrap().pid)
            .collect();
        (bound, pending)
    }

    #[test]
    fn exhausted_pool_queues_at_tail() {
        let dev = MockDevice::new(2);
        let stream = stream_with_tables(&dev, &[0x10, 0x11, 0x12, 0x13]);
        let (bound, pending) = bound_and_pending(&stream);
        assert_eq!(bound, vec![0x10, 0x11]);
        assert_eq!(pending, vec![0x12, 0x13]);
    }

    #[test]
    fn every_subscription_is_bound_or_pending_never_both() {
        let dev = MockDevice::new(1);
        let mut stream = stream_with_tables(&dev, &[1, 2, 3]);
        for _ in 0..5 {
            let (bound, pending) = bound_and_pending(&stream);
            assert_eq!(bound.len() + pending.len(), stream.subscription_count());
            for pid in &bound {
                assert!(!pending.contains(pid));
            }
            // rotate
            let key = stream
                .subs
                .iter()
                .find(|(_, s)| matches!(s.state, FilterState::Bound(_)))
                .map(|(k, _)| k)
                .unwrap();
            release(&dev, &mut stream, key);
            admit_next(&dev, PATH, &mut stream);
        }
    }

    #[test]
    fn release_admits_exactly_one_pending() {
        let dev = MockDevice::new(1);
        let mut stream = stream_with_tables(&dev, &[1, 2, 3]);
        let (bound, pending) = bound_and_pending(&stream);
        assert_eq!(bound, vec![1]);
        assert_eq!(pending, vec![2, 3]);

        let key = stream.subs.iter().find(|(_, s)| s.pid == 1).map(|(k, _)| k).unwrap();
        release(&dev, &mut stream, key);
        admit_next(&dev, PATH, &mut stream);

        // round-robin: 2 bound, released 1 at the tail
        let (bound, pending) = bound_and_pending(&stream);
        assert_eq!(bound, vec![2]);
        assert_eq!(pending, vec![3, 1]);
        assert_eq!(dev.filter_count(), 1);
    }
}
