//! Stateless binary helpers shared by the table decoders: BCD fields,
//! MJD dates, descriptor loops and length-prefixed text.

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::StringDecoder;

/// Two packed decimal digits.
pub fn bcd(b: u8) -> u32 {
    ((b >> 4) * 10 + (b & 0x0F)) as u32
}

/// Eight-digit BCD frequency field (delivery descriptors, bytes 0..4).
pub fn bcd_frequency(p: &[u8]) -> u32 {
    bcd(p[0]) * 1_000_000 + bcd(p[1]) * 10_000 + bcd(p[2]) * 100 + bcd(p[3])
}

/// Seven-digit BCD symbol rate (delivery descriptors, bytes 7..11; the
/// last byte carries one digit in its high nibble).
pub fn bcd_symbol_rate(p: &[u8]) -> u32 {
    bcd(p[0]) * 100_000 + bcd(p[1]) * 1_000 + bcd(p[2]) * 10 + (p[3] >> 4) as u32
}

/// Duration in seconds from three BCD bytes (hh mm ss).
pub fn bcd_duration(p: &[u8]) -> i64 {
    bcd(p[0]) as i64 * 3600 + bcd(p[1]) as i64 * 60 + bcd(p[2]) as i64
}

/// Start time from 16-bit MJD plus 24-bit BCD time (EN 300 468 annex C).
pub fn mjd_time(p: &[u8]) -> Option<DateTime<Utc>> {
    if p.len() < 5 {
        return None;
    }
    let mjd = u16::from_be_bytes([p[0], p[1]]) as i64;
    let days = mjd - 40_587; // MJD of the unix epoch
    let secs = bcd(p[2]) as i64 * 3600 + bcd(p[3]) as i64 * 60 + bcd(p[4]) as i64;
    DateTime::<Utc>::from_timestamp(days * 86_400 + secs, 0)
}

/// Iterator over a (tag, length, body) descriptor loop. A declared
/// length overrunning the container ends iteration instead of reading
/// past it.
pub struct Descriptors<'a> {
    buf: &'a [u8],
}

pub fn descriptors(buf: &[u8]) -> Descriptors<'_> {
    Descriptors { buf }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() < 2 {
            return None;
        }
        let tag = self.buf[0];
        let len = self.buf[1] as usize;
        if 2 + len > self.buf.len() {
            self.buf = &[];
            return None;
        }
        let body = &self.buf[2..2 + len];
        self.buf = &self.buf[2 + len..];
        Some((tag, body))
    }
}

/// Length-prefixed DVB text field. Returns the decoded string and the
/// number of bytes consumed (prefix included).
pub fn string_with_len(dec: &dyn StringDecoder, p: &[u8]) -> Option<(String, usize)> {
    let n = *p.first()? as usize;
    if 1 + n > p.len() {
        return None;
    }
    Some((dec.decode(&p[1..1 + n]), 1 + n))
}

/// Fixed-width UTF-16BE channel name (ATSC VCT), trailing NULs dropped.
pub fn utf16be_string(p: &[u8]) -> String {
    let (text, _, _) = encoding_rs::UTF_16BE.decode(p);
    text.trim_end_matches('\0').to_owned()
}

pub(crate) fn event_stop(start: DateTime<Utc>, duration_secs: i64) -> DateTime<Utc> {
    start + TimeDelta::seconds(duration_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DvbStringDecoder;

    #[test]
    fn bcd_fields() {
        assert_eq!(bcd(0x47), 47);
        assert_eq!(bcd(0x00), 0);
        // 11.954 GHz as announced in a satellite delivery descriptor
        assert_eq!(bcd_frequency(&[0x01, 0x19, 0x54, 0x00]), 1_195_400);
        // 27500 kSym/s
        assert_eq!(bcd_symbol_rate(&[0x02, 0x75, 0x00, 0x0F]), 275_000);
        assert_eq!(bcd_duration(&[0x01, 0x30, 0x00]), 5400);
    }

    #[test]
    fn mjd_conversion_matches_en300468_example() {
        // 93/10/13 12:45:00 is coded as 0xC079124500
        let dt = mjd_time(&[0xC0, 0x79, 0x12, 0x45, 0x00]).unwrap();
        assert_eq!(dt.to_rfc3339(), "1993-10-13T12:45:00+00:00");
    }

    #[test]
    fn descriptor_loop_stops_on_overrun() {
        let buf = [0x48, 0x02, 0xAA, 0xBB, 0x40, 0x7F, 0x01];
        let all: Vec<_> = descriptors(&buf).collect();
        // second descriptor claims 127 bytes with 1 available
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], (0x48, &[0xAA, 0xBB][..]));
    }

    #[test]
    fn length_prefixed_strings() {
        let dec = DvbStringDecoder;
        let buf = b"\x05Hello\x02hi";
        let (s, used) = string_with_len(&dec, buf).unwrap();
        assert_eq!((s.as_str(), used), ("Hello", 6));
        let (s, _) = string_with_len(&dec, &buf[used..]).unwrap();
        assert_eq!(s, "hi");
        assert!(string_with_len(&dec, b"\x09shrt").is_none());
    }

    #[test]
    fn utf16be_names() {
        let raw = [0x00, b'W', 0x00, b'A', 0x00, b'B', 0x00, b'C', 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(utf16be_string(&raw), "WABC");
    }
}
