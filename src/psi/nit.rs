//! Network Information Table: network name plus satellite/cable
//! delivery descriptors, which can grow the mux catalog when
//! autodiscovery is enabled for the adapter.

use crate::constants::{DESC_CABLE_DELIVERY, DESC_NETWORK_NAME, DESC_SAT_DELIVERY, TID_NIT_ACTUAL};
use crate::demux::DemuxDevice;
use crate::model::{DeliverySystem, Fec, Modulation, MuxConf, Polarisation, Rolloff};
use crate::psi::bytes::{bcd_frequency, bcd_symbol_rate, descriptors};
use crate::psi::{DecodeCtx, DecodeResult};

const FEC_TAB: [Fec; 16] = [
    Fec::Auto,
    Fec::F1_2,
    Fec::F2_3,
    Fec::F3_4,
    Fec::F5_6,
    Fec::F7_8,
    Fec::F8_9,
    Fec::F3_5,
    Fec::F4_5,
    Fec::F9_10,
    Fec::None,
    Fec::None,
    Fec::None,
    Fec::None,
    Fec::None,
    Fec::None,
];

const QAM_TAB: [Modulation; 6] = [
    Modulation::Auto,
    Modulation::Qam16,
    Modulation::Qam32,
    Modulation::Qam64,
    Modulation::Qam128,
    Modulation::Qam256,
];

pub(crate) fn decode<D: DemuxDevice>(
    ctx: &mut DecodeCtx<'_, D>,
    p: &[u8],
    table_id: u8,
) -> DecodeResult {
    if table_id != TID_NIT_ACTUAL || p.len() < 5 {
        return DecodeResult::NotApplicable;
    }
    if p[2] & 0x01 == 0 {
        return DecodeResult::Ignored;
    }

    let b = &p[5..];
    if b.len() < 2 {
        return DecodeResult::NotApplicable;
    }
    let ndl = (((b[0] & 0x0F) as usize) << 8) | b[1] as usize;
    if 2 + ndl > b.len() {
        return DecodeResult::NotApplicable;
    }
    for (tag, d) in descriptors(&b[2..2 + ndl]) {
        if tag == DESC_NETWORK_NAME {
            let name = ctx.hooks.strings.decode(d);
            if ctx.stream.network_name.as_deref() != Some(name.as_str()) {
                ctx.hooks.model.network_name_changed(&name);
                ctx.stream.network_name = Some(name);
            }
        }
    }

    let b = &b[2 + ndl..];
    if b.len() < 2 {
        return DecodeResult::NotApplicable;
    }
    let tsl = (((b[0] & 0x0F) as usize) << 8) | b[1] as usize;
    let mut b = &b[2..];
    if b.len() < tsl {
        return DecodeResult::NotApplicable;
    }

    while b.len() >= 6 {
        let tsid = u16::from_be_bytes([b[0], b[1]]);
        let dl = (((b[4] & 0x0F) as usize) << 8) | b[5] as usize;
        b = &b[6..];
        if dl > b.len() {
            break;
        }
        for (tag, d) in descriptors(&b[..dl]) {
            match tag {
                DESC_SAT_DELIVERY => sat_delivery(ctx, d, tsid),
                DESC_CABLE_DELIVERY => cable_delivery(ctx, d, tsid),
                _ => {}
            }
        }
        b = &b[dl..];
    }
    DecodeResult::Handled
}

/// Satellite delivery descriptor, including the DVB-S2 extension bits.
fn sat_delivery<D: DemuxDevice>(ctx: &mut DecodeCtx<'_, D>, d: &[u8], tsid: u16) {
    if !ctx.autodiscovery || d.len() < 11 {
        return;
    }
    let polarisation = match (d[6] >> 5) & 0x03 {
        0 => Polarisation::Horizontal,
        1 => Polarisation::Vertical,
        2 => Polarisation::CircularLeft,
        _ => Polarisation::CircularRight,
    };
    let modulation = match d[6] & 0x03 {
        0x01 => Modulation::Qpsk,
        0x02 => Modulation::Psk8,
        0x03 => Modulation::Qam16,
        _ => Modulation::Auto,
    };
    let (delivery, rolloff) = if d[6] & 0x04 != 0 {
        let rolloff = match (d[6] >> 3) & 0x03 {
            0x00 => Rolloff::R35,
            0x01 => Rolloff::R25,
            0x02 => Rolloff::R20,
            _ => Rolloff::Auto,
        };
        (DeliverySystem::DvbS2, rolloff)
    } else {
        (DeliverySystem::DvbS, Rolloff::R35)
    };
    let conf = MuxConf {
        delivery,
        frequency: bcd_frequency(&d[0..4]) * 10,
        symbol_rate: bcd_symbol_rate(&d[7..11]) * 100,
        modulation,
        fec_inner: FEC_TAB[(d[10] & 0x0F) as usize],
        polarisation: Some(polarisation),
        rolloff: Some(rolloff),
    };
    ctx.hooks.model.create_mux(conf, tsid);
}

/// Cable delivery descriptor.
fn cable_delivery<D: DemuxDevice>(ctx: &mut DecodeCtx<'_, D>, d: &[u8], tsid: u16) {
    if !ctx.autodiscovery || d.len() < 11 {
        return;
    }
    let modulation = if (d[6] & 0x0F) as usize >= QAM_TAB.len() {
        Modulation::Auto
    } else {
        QAM_TAB[(d[6] & 0x0F) as usize]
    };
    let conf = MuxConf {
        delivery: DeliverySystem::Cable,
        frequency: bcd_frequency(&d[0..4]) * 100,
        symbol_rate: bcd_symbol_rate(&d[7..11]) * 100,
        modulation,
        fec_inner: FEC_TAB[(d[10] & 0x07) as usize],
        polarisation: None,
        rolloff: None,
    };
    ctx.hooks.model.create_mux(conf, tsid);
}
