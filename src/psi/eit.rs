//! Event Information Table: programme-guide events with short-event and
//! content-genre descriptors. EIT sections may describe other streams
//! on the network, so the owning stream is resolved by transport id.

use crate::constants::{DESC_CONTENT, DESC_SHORT_EVENT, TID_EIT_FIRST, TID_EIT_LAST};
use crate::demux::DemuxDevice;
use crate::model::{ServiceLookupError, StringDecoder};
use crate::psi::bytes::{bcd_duration, descriptors, event_stop, mjd_time, string_with_len};
use crate::psi::{DecodeCtx, DecodeResult};

pub(crate) fn decode<D: DemuxDevice>(
    ctx: &mut DecodeCtx<'_, D>,
    p: &[u8],
    table_id: u8,
) -> DecodeResult {
    if !(TID_EIT_FIRST..=TID_EIT_LAST).contains(&table_id) || p.len() < 11 {
        return DecodeResult::NotApplicable;
    }
    let service_id = u16::from_be_bytes([p[0], p[1]]);
    if p[2] & 0x01 == 0 {
        return DecodeResult::Ignored;
    }
    let tsid = u16::from_be_bytes([p[5], p[6]]);

    let svc = match ctx.hooks.model.find_service(tsid, service_id, None) {
        Ok(svc) => svc,
        Err(ServiceLookupError::UnknownTransport(_)) => return DecodeResult::NotApplicable,
        // known stream, untracked service: consumed without effect
        Err(ServiceLookupError::UnknownService { .. }) => return DecodeResult::Handled,
    };
    let svc = svc.lock().unwrap();
    let now = ctx.clock.wall();

    let mut idx = 11;
    while idx + 12 <= p.len() {
        let event_id = u16::from_be_bytes([p[idx], p[idx + 1]]);
        let start = mjd_time(&p[idx + 2..idx + 7]);
        let duration = bcd_duration(&p[idx + 7..idx + 10]);
        let dllen = (((p[idx + 10] & 0x0F) as usize) << 8) | p[idx + 11] as usize;
        idx += 12;
        if idx + dllen > p.len() {
            // inconsistent descriptor loop: truncate, don't overrun
            break;
        }
        let dloop = &p[idx..idx + dllen];
        idx += dllen;

        let Some(start) = start else { continue };
        let stop = event_stop(start, duration);
        if stop < now {
            // already come to pass
            continue;
        }
        let hooks = &mut *ctx.hooks;
        let Some(ev) = hooks.epg.event_create(&svc, start, stop, event_id) else {
            continue;
        };
        for (tag, d) in descriptors(dloop) {
            match tag {
                DESC_SHORT_EVENT => {
                    if let Some((title, text)) = short_event(&*hooks.strings, d) {
                        hooks.epg.set_title(ev, &title);
                        hooks.epg.set_description(ev, &text);
                    }
                }
                DESC_CONTENT => {
                    // one content type per event
                    if let Some(&code) = d.first() {
                        hooks.epg.set_content_type(ev, code);
                    }
                }
                _ => {}
            }
        }
    }
    DecodeResult::Handled
}

/// Short-event descriptor: ISO-639 language code, then title and text.
fn short_event(dec: &dyn StringDecoder, d: &[u8]) -> Option<(String, String)> {
    if d.len() < 4 {
        return None;
    }
    let (title, used) = string_with_len(dec, &d[3..])?;
    let (text, _) = string_with_len(dec, &d[3 + used..])?;
    Some((title, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TunedStream;
    use crate::testing::{
        decode_ctx_with_clock, eit_body, eit_event, hooks, short_event_descriptor, MockClock,
        MockDevice, MockEpg, MockEs, MockModel, WALL_BASE,
    };

    fn run(model: &MockModel, epg: &MockEpg, body: &[u8], table_id: u8) -> DecodeResult {
        let dev = MockDevice::new(4);
        let es = MockEs::default();
        let mut h = hooks(model, epg, &es);
        let mut stream = TunedStream::new(0, false);
        let clock = MockClock::new(0);
        decode(
            &mut decode_ctx_with_clock(&dev, &mut stream, &mut h, false, &clock),
            body,
            table_id,
        )
    }

    #[test]
    fn creates_event_with_title_and_genre() {
        let model = MockModel::with_transports(&[5]);
        model.add_service(5, 0x64, 0x30);
        let epg = MockEpg::default();

        let mut descs = short_event_descriptor("Film", "A film.");
        descs.extend_from_slice(&[DESC_CONTENT, 0x02, 0x10, 0x00]);
        let ev = eit_event(0xBEEF, WALL_BASE + 3600, 1800, &descs);
        let body = eit_body(0x64, 5, true, &ev);

        assert_eq!(run(&model, &epg, &body, 0x50), DecodeResult::Handled);
        let created = epg.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].event_id, 0xBEEF);
        assert_eq!(epg.title_of(created[0].id).as_deref(), Some("Film"));
        assert_eq!(epg.description_of(created[0].id).as_deref(), Some("A film."));
        assert_eq!(epg.content_type_of(created[0].id), Some(0x10));
    }

    #[test]
    fn past_events_are_skipped() {
        let model = MockModel::with_transports(&[5]);
        model.add_service(5, 0x64, 0x30);
        let epg = MockEpg::default();

        // stop time one hour before the simulated clock
        let ev = eit_event(1, WALL_BASE - 7200, 3600, &[]);
        let body = eit_body(0x64, 5, true, &ev);
        assert_eq!(run(&model, &epg, &body, 0x50), DecodeResult::Handled);
        assert!(epg.created().is_empty());
    }

    #[test]
    fn truncated_descriptor_loop_does_not_overrun() {
        let model = MockModel::with_transports(&[5]);
        model.add_service(5, 0x64, 0x30);
        let epg = MockEpg::default();

        let mut ev = eit_event(2, WALL_BASE + 60, 60, &[]);
        let n = ev.len();
        ev[n - 1] = 0xFF; // declared loop length far past the section end
        let body = eit_body(0x64, 5, true, &ev);
        assert_eq!(run(&model, &epg, &body, 0x50), DecodeResult::Handled);
        assert!(epg.created().is_empty());
    }

    #[test]
    fn unknown_transport_does_not_count() {
        let model = MockModel::with_transports(&[]);
        let epg = MockEpg::default();
        let ev = eit_event(3, WALL_BASE + 60, 60, &[]);
        let body = eit_body(0x64, 5, true, &ev);
        assert_eq!(run(&model, &epg, &body, 0x50), DecodeResult::NotApplicable);
    }

    #[test]
    fn table_id_outside_eit_range_rejected() {
        let model = MockModel::with_transports(&[5]);
        let epg = MockEpg::default();
        let ev = eit_event(4, WALL_BASE + 60, 60, &[]);
        let body = eit_body(0x64, 5, true, &ev);
        assert_eq!(run(&model, &epg, &body, 0x42), DecodeResult::NotApplicable);
    }
}
