//! Collaborator seams: the broadcast model (services, muxes), the EPG
//! store, the elementary-stream parser and the DVB character decoder.
//!
//! This core only produces mutation calls against these traits; it has
//! no persisted format of its own.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// One logical service (programme) on a transport stream. Concurrently
/// touched by unrelated subsystems, hence the mutex in [`ServiceRef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub service_id: u16,
    pub pmt_pid: u16,
    pub service_type: u8,
    pub provider: String,
    pub name: String,
    pub scrambled: bool,
}

impl Service {
    pub fn new(service_id: u16, pmt_pid: u16) -> Self {
        Self {
            service_id,
            pmt_pid,
            service_type: 0,
            provider: String::new(),
            name: String::new(),
            scrambled: false,
        }
    }
}

pub type ServiceRef = Arc<Mutex<Service>>;

#[derive(Debug, Error)]
pub enum ServiceLookupError {
    #[error("no stream with transport id {0}")]
    UnknownTransport(u16),
    #[error("no service {service_id} on transport {transport_id}")]
    UnknownService { transport_id: u16, service_id: u16 },
}

/// Modulation scheme announced by a delivery descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Modulation {
    Auto,
    Qpsk,
    Psk8,
    Qam16,
    Qam32,
    Qam64,
    Qam128,
    Qam256,
}

/// Inner FEC code rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fec {
    Auto,
    F1_2,
    F2_3,
    F3_4,
    F3_5,
    F4_5,
    F5_6,
    F7_8,
    F8_9,
    F9_10,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Polarisation {
    Horizontal,
    Vertical,
    CircularLeft,
    CircularRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rolloff {
    R35,
    R25,
    R20,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliverySystem {
    DvbS,
    DvbS2,
    Cable,
}

/// Tuning parameters for a mux discovered through NIT delivery
/// descriptors. Frequency and symbol rate keep the wire multipliers
/// (Hz for cable, 10 kHz steps for satellite; symbol rate in 100 Sym/s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MuxConf {
    pub delivery: DeliverySystem,
    pub frequency: u32,
    pub symbol_rate: u32,
    pub modulation: Modulation,
    pub fec_inner: Fec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polarisation: Option<Polarisation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolloff: Option<Rolloff>,
}

/// Service/transport/mux catalog owned by the embedding application.
pub trait ServiceModel: Send {
    /// Lookup a service by (transport id, service id). With a `pmt_pid`
    /// the model may create the service if it has none on record.
    fn find_service(
        &mut self,
        transport_id: u16,
        service_id: u16,
        pmt_pid: Option<u16>,
    ) -> Result<ServiceRef, ServiceLookupError>;

    /// Autodiscovered mux from a NIT delivery descriptor.
    fn create_mux(&mut self, conf: MuxConf, transport_id: u16);

    /// The current stream announced a (new) transport id in its PAT.
    fn transport_id_changed(&mut self, old: Option<u16>, new: u16);

    /// The current stream's network name changed (NIT).
    fn network_name_changed(&mut self, name: &str);

    /// Persist hook, invoked after any service field changed.
    fn persist_service(&mut self, svc: &Service);

    /// Initial table collection finished for the current mux; the next
    /// queued mux scan may proceed.
    fn initial_scan_complete(&mut self);
}

/// Token for one tracked EPG event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpgEventId(pub u64);

/// Programme-guide store.
pub trait EpgSink: Send {
    /// Returns `None` when the event should not be tracked (duplicate,
    /// blacklisted channel, ...); the decoder then skips its descriptors.
    fn event_create(
        &mut self,
        svc: &Service,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        event_id: u16,
    ) -> Option<EpgEventId>;

    fn set_title(&mut self, ev: EpgEventId, title: &str);
    fn set_description(&mut self, ev: EpgEventId, description: &str);
    fn set_content_type(&mut self, ev: EpgEventId, dvb_code: u8);
}

/// Length-bounded, character-table-aware byte-string decoder used by all
/// descriptor parsers.
pub trait StringDecoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> String;
}

/// Default decoder for DVB-SI text fields (EN 300 468 annex A selector
/// bytes). Unknown tables fall back to a Latin superset.
pub struct DvbStringDecoder;

impl DvbStringDecoder {
    fn table(selector: u8) -> &'static encoding_rs::Encoding {
        match selector {
            0x01 => encoding_rs::ISO_8859_5,
            0x02 => encoding_rs::ISO_8859_6,
            0x03 => encoding_rs::ISO_8859_7,
            0x04 => encoding_rs::ISO_8859_8,
            0x05 => encoding_rs::WINDOWS_1254, // ISO 8859-9 superset
            0x06 => encoding_rs::ISO_8859_10,
            0x09 => encoding_rs::ISO_8859_13,
            0x0A => encoding_rs::ISO_8859_14,
            0x0B => encoding_rs::ISO_8859_15,
            _ => encoding_rs::WINDOWS_1252,
        }
    }
}

impl StringDecoder for DvbStringDecoder {
    fn decode(&self, raw: &[u8]) -> String {
        let (enc, body) = match raw.split_first() {
            None => return String::new(),
            Some((&0x15, rest)) => (encoding_rs::UTF_8, rest),
            Some((&0x10, rest)) if rest.len() >= 2 => (Self::table(rest[1]), &rest[2..]),
            Some((&sel, rest)) if sel < 0x20 => (Self::table(sel), rest),
            _ => (encoding_rs::WINDOWS_1252, raw),
        };
        let (text, _, _) = enc.decode(body);
        text.into_owned()
    }
}

/// Elementary-stream structure parser; fed program map sections under
/// the service's own lock.
pub trait StreamParser: Send {
    fn parse_pmt(&mut self, svc: &mut Service, section: &[u8]);
}

/// Collaborator bundle threaded through the dispatch loop.
pub struct Hooks {
    pub model: Box<dyn ServiceModel>,
    pub epg: Box<dyn EpgSink>,
    pub strings: Box<dyn StringDecoder>,
    pub es: Box<dyn StreamParser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_decoder_latin_default() {
        let d = DvbStringDecoder;
        assert_eq!(d.decode(b"TV Eins"), "TV Eins");
        assert_eq!(d.decode(b""), "");
    }

    #[test]
    fn string_decoder_utf8_selector() {
        let d = DvbStringDecoder;
        let mut raw = vec![0x15];
        raw.extend_from_slice("Küche".as_bytes());
        assert_eq!(d.decode(&raw), "Küche");
    }

    #[test]
    fn string_decoder_iso8859_5() {
        let d = DvbStringDecoder;
        // 0xB0 is CYRILLIC CAPITAL LETTER A in ISO 8859-5
        assert_eq!(d.decode(&[0x01, 0xB0]), "А");
    }
}
