//! Service Description Table: provider/display names, service type and
//! the free/scrambled flag, persisted only when something changed.

use crate::constants::DESC_SERVICE;
use crate::demux::DemuxDevice;
use crate::model::StringDecoder;
use crate::psi::bytes::{descriptors, string_with_len};
use crate::psi::{DecodeCtx, DecodeResult};

pub(crate) fn decode<D: DemuxDevice>(ctx: &mut DecodeCtx<'_, D>, p: &[u8]) -> DecodeResult {
    if p.len() < 8 {
        return DecodeResult::NotApplicable;
    }
    if p[2] & 0x01 == 0 {
        return DecodeResult::Ignored;
    }
    let tsid = u16::from_be_bytes([p[0], p[1]]);

    let mut idx = 8;
    while idx + 5 <= p.len() {
        let service_id = u16::from_be_bytes([p[idx], p[idx + 1]]);
        let free_ca = (p[idx + 3] >> 4) & 0x01 != 0;
        let dllen = (((p[idx + 3] & 0x0F) as usize) << 8) | p[idx + 4] as usize;
        idx += 5;
        if idx + dllen > p.len() {
            break;
        }

        for (tag, d) in descriptors(&p[idx..idx + dllen]) {
            if tag != DESC_SERVICE {
                continue;
            }
            let Some((stype, provider, raw_name)) = service_descriptor(&*ctx.hooks.strings, d) else {
                continue;
            };
            // Some providers pad names with spaces (and worse)
            let trimmed = raw_name.trim_matches(|c: char| c as u32 <= 0x20);
            let name = if trimmed.is_empty() {
                format!("noname-sid-0x{service_id:x}")
            } else {
                trimmed.to_owned()
            };

            let Ok(svc) = ctx.hooks.model.find_service(tsid, service_id, None) else {
                continue;
            };
            let mut s = svc.lock().unwrap();
            if s.service_type != stype
                || s.scrambled != free_ca
                || s.provider != provider
                || s.name != name
            {
                s.service_type = stype;
                s.scrambled = free_ca;
                s.provider = provider;
                s.name = name;
                ctx.hooks.model.persist_service(&s);
            }
        }
        idx += dllen;
    }
    DecodeResult::Handled
}

/// Service descriptor: type byte plus two length-prefixed strings.
fn service_descriptor(dec: &dyn StringDecoder, d: &[u8]) -> Option<(u8, String, String)> {
    if d.len() < 2 {
        return None;
    }
    let stype = d[0];
    let (provider, used) = string_with_len(dec, &d[1..])?;
    let (name, _) = string_with_len(dec, &d[1 + used..])?;
    Some((stype, provider, name))
}
