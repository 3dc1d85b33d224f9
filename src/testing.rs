//! Test support: a mock demux device with a bounded filter pool, a
//! simulated clock, mock collaborators and wire-format section builders.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::constants::{DESC_SERVICE, DESC_SHORT_EVENT};
use crate::demux::{DemuxDevice, FilterHandle, FilterParams, ReadyEvent};
use crate::model::{
    DvbStringDecoder, EpgEventId, EpgSink, Hooks, MuxConf, Service, ServiceLookupError,
    ServiceModel, ServiceRef, StreamParser,
};
use crate::psi::DecodeCtx;
use crate::registry::{SubKey, TunedStream};

/// Wall-clock origin of [`MockClock`], as a unix timestamp.
pub const WALL_BASE: i64 = 1_700_000_000;

/// Simulated clock; monotonic time advances only on request, wall time
/// follows it from [`WALL_BASE`].
pub struct MockClock {
    mono: AtomicU64,
}

impl MockClock {
    pub fn new(start_us: u64) -> Self {
        Self { mono: AtomicU64::new(start_us) }
    }

    pub fn advance_us(&self, us: u64) {
        self.mono.fetch_add(us, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn mono_us(&self) -> u64 {
        self.mono.load(Ordering::SeqCst)
    }

    fn wall(&self) -> DateTime<Utc> {
        let secs = WALL_BASE + (self.mono_us() / 1_000_000) as i64;
        DateTime::from_timestamp(secs, 0).expect("in range")
    }
}

struct FixedClock;

static FIXED_CLOCK: FixedClock = FixedClock;

impl Clock for FixedClock {
    fn mono_us(&self) -> u64 {
        0
    }

    fn wall(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(WALL_BASE, 0).expect("in range")
    }
}

// ───────────────────────── mock demux device ─────────────────────────

struct BoundFilter {
    params: FilterParams,
    key: SubKey,
    queue: VecDeque<Bytes>,
}

struct DevInner {
    capacity: usize,
    next_handle: u32,
    filters: HashMap<u32, BoundFilter>,
    ready: VecDeque<ReadyEvent>,
    sections_read: usize,
    closed: bool,
}

/// In-memory [`DemuxDevice`] with a fixed number of filter slots.
pub struct MockDevice {
    inner: Mutex<DevInner>,
    cv: Condvar,
}

impl MockDevice {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(DevInner {
                capacity,
                next_handle: 0,
                filters: HashMap::new(),
                ready: VecDeque::new(),
                sections_read: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Deliver one section to whatever filter matches `pid` (and its
    /// byte-0 mask, like the hardware would). Returns false when no
    /// bound filter matched.
    pub fn feed(&self, pid: u16, section: &[u8]) -> bool {
        let mut g = self.inner.lock().unwrap();
        let matching: Vec<u32> = g
            .filters
            .iter()
            .filter(|(_, f)| {
                f.params.pid == pid
                    && match f.params.byte0 {
                        Some((v, m)) => section.first().is_some_and(|b| b & m == v & m),
                        None => true,
                    }
            })
            .map(|(h, _)| *h)
            .collect();
        for h in &matching {
            let key = g.filters[h].key;
            g.filters.get_mut(h).unwrap().queue.push_back(Bytes::copy_from_slice(section));
            g.ready.push_back(ReadyEvent { key, handle: FilterHandle(*h) });
        }
        drop(g);
        self.cv.notify_all();
        !matching.is_empty()
    }

    pub fn filter_count(&self) -> usize {
        self.inner.lock().unwrap().filters.len()
    }

    /// Sections handed out so far. The dispatch loop reads and handles
    /// events one at a time, so read N+1 implies event N is fully
    /// processed.
    pub fn sections_read(&self) -> usize {
        self.inner.lock().unwrap().sections_read
    }

    pub fn bound_pids(&self) -> Vec<u16> {
        let mut pids: Vec<u16> =
            self.inner.lock().unwrap().filters.values().map(|f| f.params.pid).collect();
        pids.sort_unstable();
        pids
    }

    /// Make `wait` fail so a dispatch thread exits.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.cv.notify_all();
    }
}

impl DemuxDevice for MockDevice {
    fn open_filter(&self, _path: &str, params: &FilterParams, key: SubKey) -> io::Result<FilterHandle> {
        let mut g = self.inner.lock().unwrap();
        if g.filters.len() >= g.capacity {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "filter pool exhausted"));
        }
        let h = g.next_handle;
        g.next_handle += 1;
        g.filters.insert(h, BoundFilter { params: params.clone(), key, queue: VecDeque::new() });
        Ok(FilterHandle(h))
    }

    fn close_filter(&self, handle: FilterHandle) {
        let mut g = self.inner.lock().unwrap();
        g.filters.remove(&handle.0);
        g.ready.retain(|e| e.handle != handle);
    }

    fn wait(&self, out: &mut Vec<ReadyEvent>) -> io::Result<usize> {
        let mut g = self.inner.lock().unwrap();
        loop {
            if !g.ready.is_empty() {
                out.extend(g.ready.drain(..));
                return Ok(out.len());
            }
            if g.closed {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device closed"));
            }
            g = self.cv.wait(g).unwrap();
        }
    }

    fn read_section(&self, handle: FilterHandle) -> io::Result<Bytes> {
        let mut g = self.inner.lock().unwrap();
        g.sections_read += 1;
        g.filters
            .get_mut(&handle.0)
            .and_then(|f| f.queue.pop_front())
            .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no section ready"))
    }
}

// ───────────────────────── mock collaborators ─────────────────────────

#[derive(Default)]
struct ModelState {
    transports: HashSet<u16>,
    services: HashMap<(u16, u16), ServiceRef>,
    created_muxes: Vec<(MuxConf, u16)>,
    persisted: Vec<Service>,
    tsid_changes: Vec<(Option<u16>, u16)>,
    network_names: Vec<String>,
    scan_completions: u32,
}

/// Recording service/mux catalog.
#[derive(Clone, Default)]
pub struct MockModel(Arc<Mutex<ModelState>>);

impl MockModel {
    pub fn with_transports(transports: &[u16]) -> Self {
        let m = Self::default();
        m.0.lock().unwrap().transports.extend(transports.iter().copied());
        m
    }

    pub fn add_service(&self, transport_id: u16, service_id: u16, pmt_pid: u16) -> ServiceRef {
        let svc: ServiceRef = Arc::new(Mutex::new(Service::new(service_id, pmt_pid)));
        let mut st = self.0.lock().unwrap();
        st.transports.insert(transport_id);
        st.services.insert((transport_id, service_id), svc.clone());
        svc
    }

    pub fn created_muxes(&self) -> Vec<(MuxConf, u16)> {
        self.0.lock().unwrap().created_muxes.clone()
    }

    pub fn persisted(&self) -> Vec<Service> {
        self.0.lock().unwrap().persisted.clone()
    }

    pub fn tsid_changes(&self) -> Vec<(Option<u16>, u16)> {
        self.0.lock().unwrap().tsid_changes.clone()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.0.lock().unwrap().network_names.clone()
    }

    pub fn scan_completions(&self) -> u32 {
        self.0.lock().unwrap().scan_completions
    }
}

impl ServiceModel for MockModel {
    fn find_service(
        &mut self,
        transport_id: u16,
        service_id: u16,
        pmt_pid: Option<u16>,
    ) -> Result<ServiceRef, ServiceLookupError> {
        let mut st = self.0.lock().unwrap();
        if let Some(svc) = st.services.get(&(transport_id, service_id)) {
            return Ok(svc.clone());
        }
        match pmt_pid {
            Some(pid) => {
                let svc: ServiceRef = Arc::new(Mutex::new(Service::new(service_id, pid)));
                st.transports.insert(transport_id);
                st.services.insert((transport_id, service_id), svc.clone());
                Ok(svc)
            }
            None if st.transports.contains(&transport_id) => {
                Err(ServiceLookupError::UnknownService { transport_id, service_id })
            }
            None => Err(ServiceLookupError::UnknownTransport(transport_id)),
        }
    }

    fn create_mux(&mut self, conf: MuxConf, transport_id: u16) {
        self.0.lock().unwrap().created_muxes.push((conf, transport_id));
    }

    fn transport_id_changed(&mut self, old: Option<u16>, new: u16) {
        let mut st = self.0.lock().unwrap();
        st.transports.insert(new);
        st.tsid_changes.push((old, new));
    }

    fn network_name_changed(&mut self, name: &str) {
        self.0.lock().unwrap().network_names.push(name.to_owned());
    }

    fn persist_service(&mut self, svc: &Service) {
        self.0.lock().unwrap().persisted.push(svc.clone());
    }

    fn initial_scan_complete(&mut self) {
        self.0.lock().unwrap().scan_completions += 1;
    }
}

#[derive(Clone, Debug)]
pub struct CreatedEvent {
    pub id: EpgEventId,
    pub service_id: u16,
    pub event_id: u16,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

#[derive(Default)]
struct EpgState {
    next_id: u64,
    created: Vec<CreatedEvent>,
    titles: HashMap<u64, String>,
    descriptions: HashMap<u64, String>,
    genres: HashMap<u64, u8>,
}

/// Recording programme-guide sink; duplicate (service, event id) pairs
/// are rejected as a real store would.
#[derive(Clone, Default)]
pub struct MockEpg(Arc<Mutex<EpgState>>);

impl MockEpg {
    pub fn created(&self) -> Vec<CreatedEvent> {
        self.0.lock().unwrap().created.clone()
    }

    pub fn title_of(&self, id: EpgEventId) -> Option<String> {
        self.0.lock().unwrap().titles.get(&id.0).cloned()
    }

    pub fn description_of(&self, id: EpgEventId) -> Option<String> {
        self.0.lock().unwrap().descriptions.get(&id.0).cloned()
    }

    pub fn content_type_of(&self, id: EpgEventId) -> Option<u8> {
        self.0.lock().unwrap().genres.get(&id.0).copied()
    }
}

impl EpgSink for MockEpg {
    fn event_create(
        &mut self,
        svc: &Service,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        event_id: u16,
    ) -> Option<EpgEventId> {
        let mut st = self.0.lock().unwrap();
        if st.created.iter().any(|e| e.service_id == svc.service_id && e.event_id == event_id) {
            return None;
        }
        let id = EpgEventId(st.next_id);
        st.next_id += 1;
        st.created.push(CreatedEvent { id, service_id: svc.service_id, event_id, start, stop });
        Some(id)
    }

    fn set_title(&mut self, ev: EpgEventId, title: &str) {
        self.0.lock().unwrap().titles.insert(ev.0, title.to_owned());
    }

    fn set_description(&mut self, ev: EpgEventId, description: &str) {
        self.0.lock().unwrap().descriptions.insert(ev.0, description.to_owned());
    }

    fn set_content_type(&mut self, ev: EpgEventId, dvb_code: u8) {
        self.0.lock().unwrap().genres.insert(ev.0, dvb_code);
    }
}

/// Recording elementary-stream parser.
#[derive(Clone, Default)]
pub struct MockEs(Arc<Mutex<Vec<(u16, Vec<u8>)>>>);

impl MockEs {
    pub fn sections(&self) -> Vec<(u16, Vec<u8>)> {
        self.0.lock().unwrap().clone()
    }
}

impl StreamParser for MockEs {
    fn parse_pmt(&mut self, svc: &mut Service, section: &[u8]) {
        self.0.lock().unwrap().push((svc.service_id, section.to_vec()));
    }
}

pub fn hooks(model: &MockModel, epg: &MockEpg, es: &MockEs) -> Hooks {
    Hooks {
        model: Box::new(model.clone()),
        epg: Box::new(epg.clone()),
        strings: Box::new(DvbStringDecoder),
        es: Box::new(es.clone()),
    }
}

pub(crate) fn decode_ctx<'a, D: DemuxDevice>(
    dev: &'a D,
    stream: &'a mut TunedStream,
    hooks: &'a mut Hooks,
    autodiscovery: bool,
) -> DecodeCtx<'a, D> {
    DecodeCtx {
        dev,
        path: "/dev/dvb/adapter0/demux0",
        stream,
        hooks,
        autodiscovery,
        clock: &FIXED_CLOCK,
    }
}

pub(crate) fn decode_ctx_with_clock<'a, D: DemuxDevice>(
    dev: &'a D,
    stream: &'a mut TunedStream,
    hooks: &'a mut Hooks,
    autodiscovery: bool,
    clock: &'a dyn Clock,
) -> DecodeCtx<'a, D> {
    DecodeCtx {
        dev,
        path: "/dev/dvb/adapter0/demux0",
        stream,
        hooks,
        autodiscovery,
        clock,
    }
}

// ───────────────────────── section builders ─────────────────────────

/// Wrap a table body in the generic 3-byte header and append the
/// trailing CRC-32.
pub fn seal_section(table_id: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len() + 4;
    let mut sec = vec![table_id, 0xB0 | ((len >> 8) as u8 & 0x0F), (len & 0xFF) as u8];
    sec.extend_from_slice(body);
    let crc = crate::psi::section::CRC_MPEG.checksum(&sec);
    sec.extend_from_slice(&crc.to_be_bytes());
    sec
}

/// Extended section header: id, version/current-next, section numbers.
pub fn ext_header(id: u16, version: u8, current: bool) -> [u8; 5] {
    let b2 = 0xC0 | ((version & 0x1F) << 1) | current as u8;
    [(id >> 8) as u8, id as u8, b2, 0, 0]
}

pub fn pat_body(tsid: u16, current: bool, programs: &[(u16, u16)]) -> Vec<u8> {
    let mut v = ext_header(tsid, 0, current).to_vec();
    for &(service, pmt_pid) in programs {
        v.extend_from_slice(&service.to_be_bytes());
        v.push(0xE0 | ((pmt_pid >> 8) as u8 & 0x1F));
        v.push(pmt_pid as u8);
    }
    v
}

pub fn sdt_body(
    tsid: u16,
    current: bool,
    service_id: u16,
    service_type: u8,
    scrambled: bool,
    provider: &str,
    name: &str,
) -> Vec<u8> {
    let mut v = ext_header(tsid, 0, current).to_vec();
    v.extend_from_slice(&[0x00, 0x01, 0xFF]); // original network id + reserved

    let mut desc = vec![service_type, provider.len() as u8];
    desc.extend_from_slice(provider.as_bytes());
    desc.push(name.len() as u8);
    desc.extend_from_slice(name.as_bytes());
    let dllen = desc.len() + 2;

    v.extend_from_slice(&service_id.to_be_bytes());
    v.push(0xFC);
    v.push(0x80 | ((scrambled as u8) << 4) | ((dllen >> 8) as u8 & 0x0F));
    v.push((dllen & 0xFF) as u8);
    v.push(DESC_SERVICE);
    v.push(desc.len() as u8);
    v.extend_from_slice(&desc);
    v
}

pub fn eit_body(service_id: u16, tsid: u16, current: bool, events: &[u8]) -> Vec<u8> {
    let mut v = ext_header(service_id, 0, current).to_vec();
    v.extend_from_slice(&tsid.to_be_bytes());
    v.extend_from_slice(&[0x00, 0x01]); // original network id
    v.push(0x00); // segment last section
    v.push(0x50); // last table id
    v.extend_from_slice(events);
    v
}

fn to_bcd(v: u32) -> u8 {
    (((v / 10) << 4) | (v % 10)) as u8
}

/// One EIT event entry with start given as a unix timestamp.
pub fn eit_event(event_id: u16, start_unix: i64, duration_secs: u32, descriptors: &[u8]) -> Vec<u8> {
    let days = start_unix.div_euclid(86_400);
    let rem = start_unix.rem_euclid(86_400) as u32;
    let mjd = (days + 40_587) as u16;
    let mut v = event_id.to_be_bytes().to_vec();
    v.extend_from_slice(&mjd.to_be_bytes());
    v.extend_from_slice(&[to_bcd(rem / 3600), to_bcd(rem % 3600 / 60), to_bcd(rem % 60)]);
    v.extend_from_slice(&[
        to_bcd(duration_secs / 3600),
        to_bcd(duration_secs % 3600 / 60),
        to_bcd(duration_secs % 60),
    ]);
    v.push(0xF0 | ((descriptors.len() >> 8) as u8 & 0x0F));
    v.push(descriptors.len() as u8);
    v.extend_from_slice(descriptors);
    v
}

pub fn short_event_descriptor(title: &str, text: &str) -> Vec<u8> {
    let mut body = b"eng".to_vec();
    body.push(title.len() as u8);
    body.extend_from_slice(title.as_bytes());
    body.push(text.len() as u8);
    body.extend_from_slice(text.as_bytes());
    let mut v = vec![DESC_SHORT_EVENT, body.len() as u8];
    v.extend_from_slice(&body);
    v
}

pub fn nit_body(current: bool, network_descriptors: &[u8], transports: &[(u16, &[u8])]) -> Vec<u8> {
    let mut v = ext_header(1, 0, current).to_vec();
    v.push(0xF0 | ((network_descriptors.len() >> 8) as u8 & 0x0F));
    v.push(network_descriptors.len() as u8);
    v.extend_from_slice(network_descriptors);

    let tsl: usize = transports.iter().map(|(_, d)| 6 + d.len()).sum();
    v.push(0xF0 | ((tsl >> 8) as u8 & 0x0F));
    v.push(tsl as u8);
    for &(tsid, d) in transports {
        v.extend_from_slice(&tsid.to_be_bytes());
        v.extend_from_slice(&[0x00, 0x01]); // original network id
        v.push(0xF0 | ((d.len() >> 8) as u8 & 0x0F));
        v.push(d.len() as u8);
        v.extend_from_slice(d);
    }
    v
}

/// One 32-byte VCT channel record with no trailing descriptors.
pub fn vct_channel(name: &str, tsid: u16, service_id: u16, atsc_service_type: u8) -> Vec<u8> {
    let mut rec = vec![0u8; 32];
    for (i, u) in name.encode_utf16().take(7).enumerate() {
        rec[i * 2] = (u >> 8) as u8;
        rec[i * 2 + 1] = u as u8;
    }
    rec[22..24].copy_from_slice(&tsid.to_be_bytes());
    rec[24..26].copy_from_slice(&service_id.to_be_bytes());
    rec[27] = 0xC0 | (atsc_service_type & 0x3F);
    rec[30] = 0xFC; // reserved bits, zero descriptor length
    rec
}

pub fn vct_body(channels: &[Vec<u8>]) -> Vec<u8> {
    let mut v = ext_header(0, 0, true).to_vec();
    v.push(0x00); // protocol version
    v.push(channels.len() as u8);
    for ch in channels {
        v.extend_from_slice(ch);
    }
    v
}
