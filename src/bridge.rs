//! IPC bridge to the external AVN-billing collaborator.
//!
//! The on-wire unit is a fixed 136-byte record carried over two
//! unidirectional byte streams. Writes are atomic at record
//! granularity; readers consume whole records or fail, and a zero-byte
//! read at a record boundary is a clean end of stream.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use arrayvec::ArrayString;
use serde::Serialize;

use crate::monitor::ViolationRecord;
use crate::types::AircraftKind;

/// Record layout version. Bump when the byte layout changes.
pub const RECORD_VERSION: u8 = 1;

// Field widths are the compatibility contract with the external
// collaborators. Integers are little-endian; text fields are
// NUL-terminated ASCII, truncated if over.
pub const TYPE_LEN: usize = 4;
pub const AVN_ID_LEN: usize = 4;
pub const AIRLINE_LEN: usize = 32;
pub const FLIGHT_LEN: usize = 16;
pub const AMOUNT_LEN: usize = 8;
pub const DETAILS_LEN: usize = 64;
pub const SPEED_LEN: usize = 4;

pub const RECORD_LEN: usize = TYPE_LEN
    + AVN_ID_LEN
    + AIRLINE_LEN
    + FLIGHT_LEN
    + AMOUNT_LEN
    + DETAILS_LEN
    + SPEED_LEN
    + SPEED_LEN;

const TYPE_OFFSET: usize = 0;
const AVN_ID_OFFSET: usize = TYPE_OFFSET + TYPE_LEN;
const AIRLINE_OFFSET: usize = AVN_ID_OFFSET + AVN_ID_LEN;
const FLIGHT_OFFSET: usize = AIRLINE_OFFSET + AIRLINE_LEN;
const AMOUNT_OFFSET: usize = FLIGHT_OFFSET + FLIGHT_LEN;
const DETAILS_OFFSET: usize = AMOUNT_OFFSET + AMOUNT_LEN;
const MIN_SPEED_OFFSET: usize = DETAILS_OFFSET + DETAILS_LEN;
const MAX_SPEED_OFFSET: usize = MIN_SPEED_OFFSET + SPEED_LEN;

/// Bounded retransmission: records are retried a few times, then kept
/// aside rather than blocking the stream.
pub const MAX_WRITE_ATTEMPTS: u8 = 3;
pub const MAX_PENDING_RECORDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordType {
    AvnCreated,
    PaymentRequest,
    PaymentConfirmation,
    QueryAvn,
    QueryAirline,
}

impl RecordType {
    pub fn as_u32(&self) -> u32 {
        match self {
            RecordType::AvnCreated => 0,
            RecordType::PaymentRequest => 1,
            RecordType::PaymentConfirmation => 2,
            RecordType::QueryAvn => 3,
            RecordType::QueryAirline => 4,
        }
    }

    pub fn from_u32(raw: u32) -> Option<RecordType> {
        match raw {
            0 => Some(RecordType::AvnCreated),
            1 => Some(RecordType::PaymentRequest),
            2 => Some(RecordType::PaymentConfirmation),
            3 => Some(RecordType::QueryAvn),
            4 => Some(RecordType::QueryAirline),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum BridgeError {
    /// Fewer bytes than a whole record.
    ShortRecord { got: usize },
    UnknownType(u32),
    /// A text field held non-UTF-8 bytes.
    InvalidText,
    Io(io::Error),
}

impl core::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BridgeError::ShortRecord { got } => {
                write!(f, "short record: {} of {} bytes", got, RECORD_LEN)
            }
            BridgeError::UnknownType(raw) => write!(f, "unknown record type {}", raw),
            BridgeError::InvalidText => write!(f, "text field is not valid UTF-8"),
            BridgeError::Io(e) => write!(f, "stream error: {}", e),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<io::Error> for BridgeError {
    fn from(e: io::Error) -> Self {
        BridgeError::Io(e)
    }
}

/// One fixed-size record. `amount` carries the recorded speed on
/// AVN_CREATED and a currency amount on payment records; `details`
/// carries the billing class or status text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvnRecord {
    pub record_type: RecordType,
    pub avn_id: u32,
    pub airline: ArrayString<AIRLINE_LEN>,
    pub flight: ArrayString<FLIGHT_LEN>,
    pub amount: f64,
    pub details: ArrayString<DETAILS_LEN>,
    pub min_speed: i32,
    pub max_speed: i32,
}

impl AvnRecord {
    pub fn new(record_type: RecordType, avn_id: u32) -> Self {
        Self {
            record_type,
            avn_id,
            airline: ArrayString::new(),
            flight: ArrayString::new(),
            amount: 0.0,
            details: ArrayString::new(),
            min_speed: 0,
            max_speed: 0,
        }
    }

    /// Outbound AVN_CREATED record for a fresh violation. The billing
    /// class collapses to COMMERCIAL or CARGO; emergency traffic is
    /// billed as cargo.
    pub fn avn_created(violation: &ViolationRecord) -> Self {
        let mut record = Self::new(RecordType::AvnCreated, violation.avn_id);
        push_truncated(&mut record.airline, violation.airline.as_str());
        push_truncated(&mut record.flight, violation.flight_id.as_str());
        record.amount = violation.recorded_speed;
        let class = if violation.kind == AircraftKind::Commercial {
            "COMMERCIAL"
        } else {
            "CARGO"
        };
        push_truncated(&mut record.details, class);
        record.min_speed = violation.min_speed as i32;
        record.max_speed = violation.max_speed as i32;
        record
    }

    pub fn payment_request(avn_id: u32, amount: f64, airline: &str, flight: &str) -> Self {
        let mut record = Self::new(RecordType::PaymentRequest, avn_id);
        record.amount = amount;
        push_truncated(&mut record.airline, airline);
        push_truncated(&mut record.flight, flight);
        record
    }

    pub fn payment_confirmation(avn_id: u32, amount: f64) -> Self {
        let mut record = Self::new(RecordType::PaymentConfirmation, avn_id);
        record.amount = amount;
        record
    }

    pub fn query_avn(avn_id: u32) -> Self {
        Self::new(RecordType::QueryAvn, avn_id)
    }

    pub fn query_airline(airline: &str) -> Self {
        let mut record = Self::new(RecordType::QueryAirline, 0);
        push_truncated(&mut record.airline, airline);
        record
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[TYPE_OFFSET..TYPE_OFFSET + TYPE_LEN]
            .copy_from_slice(&self.record_type.as_u32().to_le_bytes());
        buf[AVN_ID_OFFSET..AVN_ID_OFFSET + AVN_ID_LEN]
            .copy_from_slice(&self.avn_id.to_le_bytes());
        put_text(&mut buf[AIRLINE_OFFSET..AIRLINE_OFFSET + AIRLINE_LEN], &self.airline);
        put_text(&mut buf[FLIGHT_OFFSET..FLIGHT_OFFSET + FLIGHT_LEN], &self.flight);
        buf[AMOUNT_OFFSET..AMOUNT_OFFSET + AMOUNT_LEN]
            .copy_from_slice(&self.amount.to_le_bytes());
        put_text(&mut buf[DETAILS_OFFSET..DETAILS_OFFSET + DETAILS_LEN], &self.details);
        buf[MIN_SPEED_OFFSET..MIN_SPEED_OFFSET + SPEED_LEN]
            .copy_from_slice(&self.min_speed.to_le_bytes());
        buf[MAX_SPEED_OFFSET..MAX_SPEED_OFFSET + SPEED_LEN]
            .copy_from_slice(&self.max_speed.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, BridgeError> {
        if buf.len() < RECORD_LEN {
            return Err(BridgeError::ShortRecord { got: buf.len() });
        }
        let raw_type = u32::from_le_bytes(
            buf[TYPE_OFFSET..TYPE_OFFSET + TYPE_LEN].try_into().unwrap_or_default(),
        );
        let record_type =
            RecordType::from_u32(raw_type).ok_or(BridgeError::UnknownType(raw_type))?;
        Ok(Self {
            record_type,
            avn_id: u32::from_le_bytes(
                buf[AVN_ID_OFFSET..AVN_ID_OFFSET + AVN_ID_LEN]
                    .try_into()
                    .unwrap_or_default(),
            ),
            airline: get_text(&buf[AIRLINE_OFFSET..AIRLINE_OFFSET + AIRLINE_LEN])?,
            flight: get_text(&buf[FLIGHT_OFFSET..FLIGHT_OFFSET + FLIGHT_LEN])?,
            amount: f64::from_le_bytes(
                buf[AMOUNT_OFFSET..AMOUNT_OFFSET + AMOUNT_LEN]
                    .try_into()
                    .unwrap_or_default(),
            ),
            details: get_text(&buf[DETAILS_OFFSET..DETAILS_OFFSET + DETAILS_LEN])?,
            min_speed: i32::from_le_bytes(
                buf[MIN_SPEED_OFFSET..MIN_SPEED_OFFSET + SPEED_LEN]
                    .try_into()
                    .unwrap_or_default(),
            ),
            max_speed: i32::from_le_bytes(
                buf[MAX_SPEED_OFFSET..MAX_SPEED_OFFSET + SPEED_LEN]
                    .try_into()
                    .unwrap_or_default(),
            ),
        })
    }
}

/// Truncates to the field width, leaving room for the NUL terminator.
fn push_truncated<const CAP: usize>(field: &mut ArrayString<CAP>, text: &str) {
    for ch in text.chars() {
        if field.len() + ch.len_utf8() >= CAP {
            break;
        }
        let _ = field.try_push(ch);
    }
}

fn put_text(slot: &mut [u8], text: &str) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(slot.len() - 1);
    slot[..len].copy_from_slice(&bytes[..len]);
    // Remaining bytes stay zero, terminating the string.
}

fn get_text<const CAP: usize>(slot: &[u8]) -> Result<ArrayString<CAP>, BridgeError> {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    let text = core::str::from_utf8(&slot[..end]).map_err(|_| BridgeError::InvalidText)?;
    let mut field = ArrayString::new();
    field.try_push_str(text).map_err(|_| BridgeError::InvalidText)?;
    Ok(field)
}

/// Writes one whole record and flushes it.
pub fn write_record<W: Write>(writer: &mut W, record: &AvnRecord) -> io::Result<()> {
    writer.write_all(&record.encode())?;
    writer.flush()
}

/// Reads one whole record. `Ok(None)` is a clean end of stream; a
/// partial record is an error.
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<AvnRecord>, BridgeError> {
    let mut buf = [0u8; RECORD_LEN];
    let mut filled = 0;
    while filled < RECORD_LEN {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(BridgeError::ShortRecord { got: filled });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BridgeError::Io(e)),
        }
    }
    AvnRecord::decode(&buf).map(Some)
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BridgeTxStats {
    pub sent: u32,
    pub write_failures: u32,
    pub dropped: u32,
}

/// Outbound record queue with bounded per-record retry. Transient
/// write failures keep the record at the head; a record that keeps
/// failing is dropped so the stream does not wedge.
#[derive(Debug, Default)]
pub struct BridgeTx {
    pending: VecDeque<AvnRecord>,
    head_attempts: u8,
    stats: BridgeTxStats,
}

impl BridgeTx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, record: AvnRecord) {
        debug_assert!(
            self.pending.len() <= MAX_PENDING_RECORDS,
            "pending overflow: {}",
            self.pending.len()
        );
        if self.pending.len() >= MAX_PENDING_RECORDS {
            self.pending.pop_front();
            self.head_attempts = 0;
            self.stats.dropped += 1;
        }
        self.pending.push_back(record);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &BridgeTxStats {
        &self.stats
    }

    /// Drains as many queued records as the stream will take. Stops at
    /// the first write failure, counting an attempt against the head
    /// record.
    pub fn flush<W: Write>(&mut self, writer: &mut W) -> Result<usize, BridgeError> {
        let mut written = 0;
        while let Some(record) = self.pending.front() {
            match write_record(writer, record) {
                Ok(()) => {
                    self.pending.pop_front();
                    self.head_attempts = 0;
                    self.stats.sent += 1;
                    written += 1;
                }
                Err(e) => {
                    self.stats.write_failures += 1;
                    self.head_attempts += 1;
                    if self.head_attempts >= MAX_WRITE_ATTEMPTS {
                        self.pending.pop_front();
                        self.head_attempts = 0;
                        self.stats.dropped += 1;
                    }
                    return Err(BridgeError::Io(e));
                }
            }
        }
        Ok(written)
    }
}
