//! Program Map trampoline. The body belongs to the external
//! elementary-stream parser; this core only owns the filter lifecycle.

use crate::demux::DemuxDevice;
use crate::model::ServiceRef;
use crate::psi::{DecodeCtx, DecodeResult};

pub(crate) fn decode<D: DemuxDevice>(
    ctx: &mut DecodeCtx<'_, D>,
    service: &ServiceRef,
    p: &[u8],
) -> DecodeResult {
    // the stream-structure lock, held around the whole delegate call
    let mut svc = service.lock().unwrap();
    ctx.hooks.es.parse_pmt(&mut svc, p);
    DecodeResult::Handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Service;
    use crate::registry::TunedStream;
    use crate::testing::{decode_ctx, hooks, MockDevice, MockEpg, MockEs, MockModel};
    use std::sync::{Arc, Mutex};

    #[test]
    fn delegates_section_to_stream_parser() {
        let dev = MockDevice::new(4);
        let model = MockModel::with_transports(&[]);
        let (epg, es) = (MockEpg::default(), MockEs::default());
        let mut h = hooks(&model, &epg, &es);
        let mut stream = TunedStream::new(0, false);
        let svc: ServiceRef = Arc::new(Mutex::new(Service::new(7, 0x30)));

        let body = [0xE0, 0x31, 0xF0, 0x00];
        let r = decode(&mut decode_ctx(&dev, &mut stream, &mut h, false), &svc, &body);
        assert_eq!(r, DecodeResult::Handled);

        let seen = es.sections();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (7, body.to_vec()));
    }
}
