//! Per-device adapter context: the shared lock, the dispatch thread and
//! the default table sets installed on each tune.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::{Context, Result};

use crate::clock::Clock;
use crate::constants::{
    PID_ATSC_VCT, PID_CAT, PID_EIT, PID_NIT, PID_PAT, PID_SDT, TABLE_CHECK_CRC, TABLE_QUICKREQ,
    TID_CAT, TID_NIT_ACTUAL, TID_PAT, TID_SDT_ACTUAL, TID_VCT_CABLE, TID_VCT_TERRESTRIAL,
};
use crate::demux::DemuxDevice;
use crate::dispatch;
use crate::model::Hooks;
use crate::registry::{SubscriptionInfo, TableDecoder, TunedStream};

/// Broadcast family of the tuned frontend; selects the default table
/// subscriptions per tune.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Standard {
    DvbS,
    DvbC,
    DvbT,
    AtscTerrestrial,
    AtscCable,
}

/// Everything mutated under the adapter-wide lock: the current stream,
/// its subscriptions, the scan counter and all collaborator state.
pub struct AdapterState {
    pub current: Option<TunedStream>,
    /// Tuned streams on this device still completing their initial scan.
    pub scanning_muxes: u32,
    pub autodiscovery: bool,
    pub hooks: Hooks,
}

/// One physical receiver device.
pub struct Adapter<D: DemuxDevice> {
    dev: Arc<D>,
    demux_path: String,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<AdapterState>>,
}

impl<D: DemuxDevice> Adapter<D> {
    pub fn new(
        dev: D,
        demux_path: impl Into<String>,
        clock: Arc<dyn Clock>,
        hooks: Hooks,
        autodiscovery: bool,
    ) -> Self {
        Self {
            dev: Arc::new(dev),
            demux_path: demux_path.into(),
            clock,
            state: Arc::new(Mutex::new(AdapterState {
                current: None,
                scanning_muxes: 0,
                autodiscovery,
                hooks,
            })),
        }
    }

    /// Spawn the dispatch thread. It runs until the device's wait fails.
    pub fn start(&self) -> Result<thread::JoinHandle<()>> {
        let dev = Arc::clone(&self.dev);
        let path = self.demux_path.clone();
        let clock = Arc::clone(&self.clock);
        let state = Arc::clone(&self.state);
        thread::Builder::new()
            .name("si-tables".into())
            .spawn(move || dispatch::run(dev, path, clock, state))
            .with_context(|| format!("spawning table dispatch for \"{}\"", self.demux_path))
    }

    /// A new multiplex became current: tear down the previous stream's
    /// tables and install the default subscription set.
    pub fn tune(&self, standard: Standard, initial_scan: bool) {
        let mut st = self.state.lock().unwrap();
        if let Some(mut old) = st.current.take() {
            old.flush_all(&*self.dev);
            if old.initial_scan {
                st.scanning_muxes = st.scanning_muxes.saturating_sub(1);
            }
        }
        if initial_scan {
            st.scanning_muxes += 1;
        }

        let mut stream = TunedStream::new(self.clock.mono_us(), initial_scan);
        let dev = &*self.dev;
        let path = self.demux_path.as_str();

        stream.add_table(
            dev,
            path,
            TableDecoder::Pat,
            "pat",
            TABLE_CHECK_CRC | TABLE_QUICKREQ,
            PID_PAT,
            Some((TID_PAT, 0xFF)),
        );
        stream.add_table(
            dev,
            path,
            TableDecoder::Cat,
            "cat",
            TABLE_CHECK_CRC,
            PID_CAT,
            Some((TID_CAT, 0xFF)),
        );
        match standard {
            Standard::DvbS | Standard::DvbC | Standard::DvbT => {
                stream.add_table(
                    dev,
                    path,
                    TableDecoder::Nit,
                    "nit",
                    TABLE_CHECK_CRC | TABLE_QUICKREQ,
                    PID_NIT,
                    Some((TID_NIT_ACTUAL, 0xFF)),
                );
                stream.add_table(
                    dev,
                    path,
                    TableDecoder::Sdt,
                    "sdt",
                    TABLE_CHECK_CRC | TABLE_QUICKREQ,
                    PID_SDT,
                    Some((TID_SDT_ACTUAL, 0xFF)),
                );
                // all EIT table ids are interesting, no byte-0 filter
                stream.add_table(
                    dev,
                    path,
                    TableDecoder::Eit,
                    "eit",
                    TABLE_CHECK_CRC,
                    PID_EIT,
                    None,
                );
            }
            Standard::AtscTerrestrial | Standard::AtscCable => {
                let tid = match standard {
                    Standard::AtscTerrestrial => TID_VCT_TERRESTRIAL,
                    _ => TID_VCT_CABLE,
                };
                stream.add_table(
                    dev,
                    path,
                    TableDecoder::Vct,
                    "vct",
                    TABLE_CHECK_CRC | TABLE_QUICKREQ,
                    PID_ATSC_VCT,
                    Some((tid, 0xFF)),
                );
            }
        }
        st.current = Some(stream);
    }

    /// Tear down all table subscriptions on the current stream.
    pub fn close_current(&self) {
        let mut st = self.state.lock().unwrap();
        if let Some(mut old) = st.current.take() {
            old.flush_all(&*self.dev);
            if old.initial_scan {
                st.scanning_muxes = st.scanning_muxes.saturating_sub(1);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        let st = self.state.lock().unwrap();
        st.current.as_ref().map(TunedStream::snapshot).unwrap_or_default()
    }

    pub fn scan_in_progress(&self) -> bool {
        let st = self.state.lock().unwrap();
        st.current.as_ref().is_some_and(|s| s.initial_scan)
    }

    pub fn scanning_muxes(&self) -> u32 {
        self.state.lock().unwrap().scanning_muxes
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn lock_state(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hooks, MockClock, MockDevice, MockEpg, MockEs, MockModel};

    fn adapter(capacity: usize) -> (Adapter<MockDevice>, MockModel) {
        let model = MockModel::with_transports(&[]);
        let (epg, es) = (MockEpg::default(), MockEs::default());
        let h = hooks(&model, &epg, &es);
        let clock = Arc::new(MockClock::new(0));
        (
            Adapter::new(MockDevice::new(capacity), "/dev/dvb/adapter0/demux0", clock, h, false),
            model,
        )
    }

    #[test]
    fn dvb_tune_installs_default_tables() {
        let (adapter, _) = adapter(8);
        adapter.tune(Standard::DvbT, true);

        let mut names: Vec<String> = adapter.snapshot().into_iter().map(|s| s.name).collect();
        names.sort();
        assert_eq!(names, ["cat", "eit", "nit", "pat", "sdt"]);
        assert!(adapter.scan_in_progress());
        assert_eq!(adapter.scanning_muxes(), 1);
    }

    #[test]
    fn atsc_tune_installs_vct_set() {
        let (adapter, _) = adapter(8);
        adapter.tune(Standard::AtscTerrestrial, false);
        let mut names: Vec<String> = adapter.snapshot().into_iter().map(|s| s.name).collect();
        names.sort();
        assert_eq!(names, ["cat", "pat", "vct"]);
        assert!(!adapter.scan_in_progress());
    }

    #[test]
    fn retune_releases_previous_filters() {
        let (adapter, _) = adapter(8);
        adapter.tune(Standard::DvbC, true);
        assert_eq!(adapter.device().filter_count(), 5);
        adapter.tune(Standard::AtscCable, true);
        assert_eq!(adapter.device().filter_count(), 3);
        // the aborted scan no longer counts
        assert_eq!(adapter.scanning_muxes(), 1);
        adapter.close_current();
        assert_eq!(adapter.device().filter_count(), 0);
        assert_eq!(adapter.scanning_muxes(), 0);
        assert!(adapter.snapshot().is_empty());
    }

    #[test]
    fn snapshot_serializes() {
        let (adapter, _) = adapter(8);
        adapter.tune(Standard::DvbS, false);
        let json = serde_json::to_string(&adapter.snapshot()).unwrap();
        assert!(json.contains("\"pid\":"));
        assert!(json.contains("pat"));
    }
}
