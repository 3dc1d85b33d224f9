//! ATSC Virtual Channel Table: fixed-stride channel records with a
//! UTF-16BE channel name, filtered to digital TV channels.

use crate::constants::{ATSC_SERVICE_TYPE_TV, SERVICE_TYPE_SDTV, TID_VCT_CABLE, TID_VCT_TERRESTRIAL};
use crate::demux::DemuxDevice;
use crate::psi::bytes::utf16be_string;
use crate::psi::{DecodeCtx, DecodeResult};

pub(crate) fn decode<D: DemuxDevice>(
    ctx: &mut DecodeCtx<'_, D>,
    p: &[u8],
    table_id: u8,
) -> DecodeResult {
    if table_id != TID_VCT_TERRESTRIAL && table_id != TID_VCT_CABLE {
        return DecodeResult::NotApplicable;
    }
    if p.len() < 7 {
        return DecodeResult::NotApplicable;
    }

    let b = &p[5..];
    let mut channels = b[1] as usize;
    let mut b = &b[2..];

    while channels > 0 && b.len() >= 32 {
        let dlen = (((b[30] & 0x03) as usize) << 8) | b[31] as usize;
        if 32 + dlen > b.len() {
            // corrupt table
            return DecodeResult::NotApplicable;
        }
        let rec = &b[..32];
        b = &b[32 + dlen..];
        channels -= 1;

        let atsc_stype = rec[27] & 0x3F;
        if atsc_stype != ATSC_SERVICE_TYPE_TV {
            continue;
        }
        let tsid = u16::from_be_bytes([rec[22], rec[23]]);
        let service_id = u16::from_be_bytes([rec[24], rec[25]]);
        let Ok(svc) = ctx.hooks.model.find_service(tsid, service_id, None) else {
            continue;
        };
        // seven UTF-16BE code units
        let name = utf16be_string(&rec[0..14]);

        let mut s = svc.lock().unwrap();
        if s.service_type != SERVICE_TYPE_SDTV || s.name != name {
            s.service_type = SERVICE_TYPE_SDTV;
            s.name = name;
            ctx.hooks.model.persist_service(&s);
        }
    }
    DecodeResult::Handled
}
