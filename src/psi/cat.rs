//! Conditional Access Table: spawns a header-inclusive subscription per
//! CA stream so downstream conditional-access handling can hook in.

use crate::constants::{DESC_CA, TABLE_INC_HEADER};
use crate::demux::DemuxDevice;
use crate::psi::bytes::descriptors;
use crate::psi::{DecodeCtx, DecodeResult};
use crate::registry::TableDecoder;

pub(crate) fn decode<D: DemuxDevice>(ctx: &mut DecodeCtx<'_, D>, p: &[u8]) -> DecodeResult {
    if p.len() < 5 {
        return DecodeResult::NotApplicable;
    }
    if p[2] & 0x01 == 0 {
        return DecodeResult::Ignored;
    }

    for (tag, d) in descriptors(&p[5..]) {
        if tag != DESC_CA || d.len() < 4 {
            continue;
        }
        let ca_system_id = u16::from_be_bytes([d[0], d[1]]);
        let pid = (((d[2] & 0x1F) as u16) << 8) | d[3] as u16;
        if pid == 0 {
            continue;
        }
        ctx.stream.add_table(
            ctx.dev,
            ctx.path,
            TableDecoder::CaStream { ca_system_id },
            "CA",
            TABLE_INC_HEADER,
            pid,
            None,
        );
    }
    DecodeResult::Handled
}
