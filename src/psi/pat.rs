//! Program Association Table: pins down the stream's transport id and
//! spawns one program-map subscription per announced service.

use crate::constants::{TABLE_CHECK_CRC, TABLE_QUICKREQ, TID_PMT};
use crate::demux::DemuxDevice;
use crate::psi::{DecodeCtx, DecodeResult};
use crate::registry::TableDecoder;

pub(crate) fn decode<D: DemuxDevice>(ctx: &mut DecodeCtx<'_, D>, p: &[u8]) -> DecodeResult {
    if p.len() < 5 {
        return DecodeResult::NotApplicable;
    }
    if p[2] & 0x01 == 0 {
        // next version, not in force yet
        return DecodeResult::Ignored;
    }

    let tsid = u16::from_be_bytes([p[0], p[1]]);
    if ctx.stream.transport_id != Some(tsid) {
        ctx.hooks.model.transport_id_changed(ctx.stream.transport_id, tsid);
        ctx.stream.transport_id = Some(tsid);
    }

    let mut idx = 5;
    while idx + 4 <= p.len() {
        let service = u16::from_be_bytes([p[idx], p[idx + 1]]);
        let pmt_pid = (((p[idx + 2] & 0x1F) as u16) << 8) | p[idx + 3] as u16;
        idx += 4;

        if service == 0 {
            // network PID entry, not a service
            continue;
        }
        if let Ok(svc) = ctx.hooks.model.find_service(tsid, service, Some(pmt_pid)) {
            let name = format!("PMT({pmt_pid}), service:{service}");
            ctx.stream.add_table(
                ctx.dev,
                ctx.path,
                TableDecoder::Pmt { service: svc },
                &name,
                TABLE_CHECK_CRC | TABLE_QUICKREQ,
                pmt_pid,
                Some((TID_PMT, 0xFF)),
            );
        }
    }
    DecodeResult::Handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{decode_ctx, pat_body, MockDevice, MockEpg, MockEs, MockModel};

    #[test]
    fn registers_one_pmt_subscription_per_service() {
        let dev = MockDevice::new(8);
        let model = MockModel::with_transports(&[]);
        let (epg, es) = (MockEpg::default(), MockEs::default());
        let mut h = crate::testing::hooks(&model, &epg, &es);
        let mut stream = crate::registry::TunedStream::new(0, false);

        let body = pat_body(7, true, &[(1, 0x30), (2, 0x31), (0, 0x10)]);
        let r = decode(&mut decode_ctx(&dev, &mut stream, &mut h, false), &body);
        assert_eq!(r, DecodeResult::Handled);

        assert_eq!(stream.transport_id, Some(7));
        assert_eq!(model.tsid_changes(), vec![(None, 7)]);

        // service 0 is the network entry and spawns nothing
        let pids: Vec<u16> = stream.snapshot().iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![0x30, 0x31]);

        // repeated PAT: no duplicates, transport id untouched
        let r = decode(&mut decode_ctx(&dev, &mut stream, &mut h, false), &body);
        assert_eq!(r, DecodeResult::Handled);
        assert_eq!(stream.subscription_count(), 2);
        assert_eq!(model.tsid_changes().len(), 1);
    }

    #[test]
    fn next_version_is_ignored() {
        let dev = MockDevice::new(8);
        let model = MockModel::with_transports(&[]);
        let (epg, es) = (MockEpg::default(), MockEs::default());
        let mut h = crate::testing::hooks(&model, &epg, &es);
        let mut stream = crate::registry::TunedStream::new(0, false);

        let body = pat_body(7, false, &[(1, 0x30)]);
        let r = decode(&mut decode_ctx(&dev, &mut stream, &mut h, false), &body);
        assert_eq!(r, DecodeResult::Ignored);
        assert_eq!(stream.subscription_count(), 0);
        assert_eq!(stream.transport_id, None);
    }
}
