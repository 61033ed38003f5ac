//! Record framing at the file surface
//!
//! Both directions use little-endian, packed layouts with no padding.
//!
//! Write side - zero or more concatenated payload records:
//!
//! ```text
//! { u32 payload_size, u8 payload[payload_size] }
//! ```
//!
//! Read side - zero or more concatenated signal records:
//!
//! ```text
//! { u32 lost_signals, u64 signal_id, u32 payload_size, u8 payload[payload_size] }
//! ```
//!
//! Writes must consist of whole payload records; a trailing partial record
//! invalidates the entire write. Reads always return whole signal records.

use crate::error::{Result, SigfsError};
use crate::queue::{SignalCount, SignalId};

/// Size of the `{u32 payload_size}` header on a written payload record.
pub const PAYLOAD_HEADER_SIZE: usize = 4;

/// Size of the `{u32 lost, u64 sid, u32 payload_size}` header on a signal
/// record returned by read.
pub const SIGNAL_HEADER_SIZE: usize = 4 + 8 + 4;

/// One decoded signal record, borrowing the payload from the read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRecord<'a> {
    pub lost_signals: SignalCount,
    pub signal_id: SignalId,
    pub payload: &'a [u8],
}

/// Append one payload record to `out`.
pub fn encode_payload(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Append one signal record to `out`.
pub fn encode_signal(out: &mut Vec<u8>, lost: SignalCount, sid: SignalId, payload: &[u8]) {
    out.extend_from_slice(&lost.to_le_bytes());
    out.extend_from_slice(&sid.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Split a written buffer into its payload records.
///
/// All-or-nothing: a truncated header or payload anywhere in the buffer
/// fails the whole call, so a bad write publishes nothing.
pub fn split_payload_records(buf: &[u8]) -> Result<Vec<&[u8]>> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let remaining = buf.len() - offset;
        if remaining < PAYLOAD_HEADER_SIZE {
            return Err(SigfsError::invalid_record(format!(
                "truncated payload header at offset {}: {} of {} bytes",
                offset, remaining, PAYLOAD_HEADER_SIZE
            )));
        }

        let size = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
        offset += PAYLOAD_HEADER_SIZE;

        if buf.len() - offset < size {
            return Err(SigfsError::invalid_record(format!(
                "truncated payload at offset {}: {} of {} bytes",
                offset,
                buf.len() - offset,
                size
            )));
        }

        records.push(&buf[offset..offset + size]);
        offset += size;
    }

    Ok(records)
}

/// Iterator over the signal records in a read buffer.
pub struct SignalStream<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> SignalStream<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }
}

impl<'a> Iterator for SignalStream<'a> {
    type Item = Result<SignalRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset == self.buf.len() {
            return None;
        }

        let remaining = &self.buf[self.offset..];
        if remaining.len() < SIGNAL_HEADER_SIZE {
            self.offset = self.buf.len();
            return Some(Err(SigfsError::invalid_record(format!(
                "truncated signal header: {} of {} bytes",
                remaining.len(),
                SIGNAL_HEADER_SIZE
            ))));
        }

        let lost_signals = u32::from_le_bytes(remaining[0..4].try_into().unwrap());
        let signal_id = u64::from_le_bytes(remaining[4..12].try_into().unwrap());
        let size = u32::from_le_bytes(remaining[12..16].try_into().unwrap()) as usize;

        if remaining.len() - SIGNAL_HEADER_SIZE < size {
            self.offset = self.buf.len();
            return Some(Err(SigfsError::invalid_record(format!(
                "truncated signal payload: {} of {} bytes",
                remaining.len() - SIGNAL_HEADER_SIZE,
                size
            ))));
        }

        let payload = &remaining[SIGNAL_HEADER_SIZE..SIGNAL_HEADER_SIZE + size];
        self.offset += SIGNAL_HEADER_SIZE + size;

        Some(Ok(SignalRecord {
            lost_signals,
            signal_id,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_single_payload() {
        let mut buf = Vec::new();
        encode_payload(&mut buf, b"SIG000");
        let records = split_payload_records(&buf).unwrap();
        assert_eq!(records, vec![&b"SIG000"[..]]);
    }

    #[test]
    fn test_split_concatenated_payloads() {
        let mut buf = Vec::new();
        encode_payload(&mut buf, b"first");
        encode_payload(&mut buf, b"");
        encode_payload(&mut buf, b"third");
        let records = split_payload_records(&buf).unwrap();
        assert_eq!(records, vec![&b"first"[..], b"", b"third"]);
    }

    #[test]
    fn test_split_rejects_trailing_partial_header() {
        let mut buf = Vec::new();
        encode_payload(&mut buf, b"ok");
        buf.extend_from_slice(&[0x07, 0x00]);
        assert!(split_payload_records(&buf).is_err());
    }

    #[test]
    fn test_split_rejects_truncated_payload() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf.extend_from_slice(b"only3");
        assert!(split_payload_records(&buf).is_err());
    }

    #[test]
    fn test_signal_stream_decodes_records() {
        let mut buf = Vec::new();
        encode_signal(&mut buf, 3, 4, b"SIG004");
        encode_signal(&mut buf, 0, 5, b"SIG005");

        let records: Vec<_> = SignalStream::new(&buf).map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lost_signals, 3);
        assert_eq!(records[0].signal_id, 4);
        assert_eq!(records[0].payload, b"SIG004");
        assert_eq!(records[1].lost_signals, 0);
        assert_eq!(records[1].signal_id, 5);
    }

    #[test]
    fn test_signal_stream_flags_truncation() {
        let mut buf = Vec::new();
        encode_signal(&mut buf, 0, 1, b"whole");
        buf.truncate(buf.len() - 2);

        let mut stream = SignalStream::new(&buf);
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
    }
}
