//! Table subscription registry.
//!
//! One [`TunedStream`] per currently tuned multiplex holds an arena of
//! active subscriptions plus the FIFO of subscriptions waiting for a
//! filter slot. Readiness events carry the arena key, so resolving an
//! event back to its subscription never scans by raw handle value.

use std::collections::VecDeque;

use serde::Serialize;

use crate::constants::TABLE_CHECK_CRC;
use crate::demux::{DemuxDevice, FilterHandle, FilterParams};
use crate::model::ServiceRef;
use crate::scheduler;

/// Generational arena key for one subscription. Stays invalid after the
/// subscription is destroyed even if the slot index is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubKey {
    index: u32,
    generation: u32,
}

/// The closed set of table decoders. Dispatch is one exhaustive match,
/// so adding a table kind cannot be forgotten anywhere.
#[derive(Clone)]
pub enum TableDecoder {
    Pat,
    Cat,
    Sdt,
    Eit,
    Nit,
    Vct,
    Pmt { service: ServiceRef },
    /// Placeholder for downstream conditional-access handling.
    CaStream { ca_system_id: u16 },
}

/// A subscription is bound to a filter slot or queued, never both and
/// never neither.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterState {
    Bound(FilterHandle),
    Pending,
}

pub struct TableSubscription {
    /// Diagnostic name only.
    pub name: String,
    pub pid: u16,
    pub flags: u8,
    pub decoder: TableDecoder,
    /// Sections accepted so far; drives fast-completion.
    pub count: u32,
    pub fparams: FilterParams,
    pub state: FilterState,
}

struct Slot {
    generation: u32,
    sub: Option<TableSubscription>,
}

/// Arena of subscriptions indexed by [`SubKey`].
#[derive(Default)]
pub struct SubscriptionSet {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl SubscriptionSet {
    pub fn insert(&mut self, sub: TableSubscription) -> SubKey {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.sub = Some(sub);
                SubKey { index, generation: slot.generation }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { generation: 0, sub: Some(sub) });
                SubKey { index, generation: 0 }
            }
        }
    }

    pub fn remove(&mut self, key: SubKey) -> Option<TableSubscription> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let sub = slot.sub.take()?;
        slot.generation += 1;
        self.free.push(key.index);
        Some(sub)
    }

    pub fn get(&self, key: SubKey) -> Option<&TableSubscription> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.sub.as_ref()
    }

    pub fn get_mut(&mut self, key: SubKey) -> Option<&mut TableSubscription> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.sub.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubKey, &TableSubscription)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let sub = slot.sub.as_ref()?;
            Some((SubKey { index: i as u32, generation: slot.generation }, sub))
        })
    }

    pub fn keys(&self) -> Vec<SubKey> {
        self.iter().map(|(k, _)| k).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.sub.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Diagnostics snapshot of one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub name: String,
    pub pid: u16,
    pub bound: bool,
    pub sections: u32,
}

/// Per-multiplex table-collection context.
pub struct TunedStream {
    /// Declared by the PAT; unknown until the first one decodes.
    pub transport_id: Option<u16>,
    pub network_name: Option<String>,
    /// Monotonic stamp of when table collection began for this tuning.
    pub table_start_us: u64,
    pub initial_scan: bool,
    pub(crate) subs: SubscriptionSet,
    pub(crate) pending: VecDeque<SubKey>,
}

impl TunedStream {
    pub fn new(now_us: u64, initial_scan: bool) -> Self {
        Self {
            transport_id: None,
            network_name: None,
            table_start_us: now_us,
            initial_scan,
            subs: SubscriptionSet::default(),
            pending: VecDeque::new(),
        }
    }

    /// Register a table subscription. A PID already subscribed on this
    /// stream makes this a silent no-op: first registration wins.
    pub(crate) fn add_table<D: DemuxDevice>(
        &mut self,
        dev: &D,
        path: &str,
        decoder: TableDecoder,
        name: &str,
        flags: u8,
        pid: u16,
        byte0: Option<(u8, u8)>,
    ) {
        if self.subs.iter().any(|(_, s)| s.pid == pid) {
            return;
        }
        let fparams = FilterParams {
            pid,
            byte0,
            check_crc: flags & TABLE_CHECK_CRC != 0,
            immediate_start: true,
        };
        let key = self.subs.insert(TableSubscription {
            name: name.to_owned(),
            pid,
            flags,
            decoder,
            count: 0,
            fparams,
            state: FilterState::Pending,
        });
        self.pending.push_back(key);
        scheduler::bind(dev, path, self, key);
    }

    /// Destroy every subscription, releasing bound filter slots. Used on
    /// re-tune and shutdown.
    pub(crate) fn flush_all<D: DemuxDevice>(&mut self, dev: &D) {
        for key in self.subs.keys() {
            if let Some(sub) = self.subs.remove(key) {
                if let FilterState::Bound(handle) = sub.state {
                    dev.close_filter(handle);
                }
            }
        }
        self.pending.clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        self.subs
            .iter()
            .map(|(_, s)| SubscriptionInfo {
                name: s.name.clone(),
                pid: s.pid,
                bound: matches!(s.state, FilterState::Bound(_)),
                sections: s.count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{TABLE_QUICKREQ, TID_PAT};
    use crate::testing::MockDevice;

    fn sub(pid: u16) -> TableSubscription {
        TableSubscription {
            name: format!("t{pid}"),
            pid,
            flags: 0,
            decoder: TableDecoder::Pat,
            count: 0,
            fparams: FilterParams {
                pid,
                byte0: None,
                check_crc: false,
                immediate_start: true,
            },
            state: FilterState::Pending,
        }
    }

    #[test]
    fn arena_keys_survive_slot_reuse() {
        let mut set = SubscriptionSet::default();
        let a = set.insert(sub(1));
        let b = set.insert(sub(2));
        assert_eq!(set.len(), 2);

        set.remove(a).unwrap();
        assert!(set.get(a).is_none());

        // slot reused, stale key must stay dead
        let c = set.insert(sub(3));
        assert!(set.get(a).is_none());
        assert_eq!(set.get(c).unwrap().pid, 3);
        assert_eq!(set.get(b).unwrap().pid, 2);
    }

    #[test]
    fn duplicate_pid_registration_is_a_noop() {
        let dev = MockDevice::new(4);
        let mut stream = TunedStream::new(0, false);
        stream.add_table(&dev, "/dev/demux0", TableDecoder::Pat, "pat", TABLE_QUICKREQ, 0, Some((TID_PAT, 0xFF)));
        let before: Vec<_> = stream.snapshot();
        assert_eq!(before.len(), 1);
        assert!(before[0].bound);

        // second registration for PID 0: discarded, original untouched
        stream.add_table(&dev, "/dev/demux0", TableDecoder::Sdt, "imposter", 0, 0, None);
        let after = stream.snapshot();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].name, "pat");
        assert!(after[0].bound);
        assert_eq!(dev.filter_count(), 1);
    }

    #[test]
    fn flush_all_releases_bound_filters() {
        let dev = MockDevice::new(1);
        let mut stream = TunedStream::new(0, false);
        stream.add_table(&dev, "/dev/demux0", TableDecoder::Pat, "pat", 0, 0, None);
        stream.add_table(&dev, "/dev/demux0", TableDecoder::Cat, "cat", 0, 1, None);
        assert_eq!(stream.subscription_count(), 2);
        assert_eq!(stream.pending_count(), 1);

        stream.flush_all(&dev);
        assert_eq!(stream.subscription_count(), 0);
        assert_eq!(stream.pending_count(), 0);
        assert_eq!(dev.filter_count(), 0);
    }
}
