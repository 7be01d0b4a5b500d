use crate::payment::{PaymentRecord, RecordError};
use crate::shape::{Kind, Shape, Terminator, REGISTRY};
use crate::TERMINATOR;
use bytes::Bytes;
use itertools::Itertools;
use std::fmt;

pub mod decoder;

/// One frame received from the device.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Message {
    kind: Kind,
    frame: Bytes,
}

impl Message {
    /// Builds a well-formed frame of a concrete kind around `payload`.
    ///
    /// Returns `None` for `Kind::Unknown` or when the payload length does not fit the kind.
    pub fn new(kind: Kind, payload: &[u8]) -> Option<Self> {
        let shape = kind.shape()?;
        if payload.len() != shape.payload_length {
            return None;
        }
        let mut frame = Vec::with_capacity(shape.length());
        frame.extend_from_slice(shape.header);
        frame.extend_from_slice(payload);
        frame.extend(shape.terminator.build(shape.header, payload));
        Some(Self {
            kind,
            frame: frame.into(),
        })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Complete frame, header through terminator.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    pub fn header(&self) -> &[u8] {
        match self.kind.shape() {
            Some(shape) => &self.frame[..shape.header.len()],
            None => &[],
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self.kind.shape() {
            Some(shape) => &self.frame[shape.header.len()..shape.header.len() + shape.payload_length],
            // Whatever preceded the terminator we resynchronized on.
            None => &self.frame[..self.frame.len() - 1],
        }
    }

    pub fn terminator(&self) -> &[u8] {
        match self.kind.shape() {
            Some(shape) => &self.frame[self.frame.len() - shape.terminator.length()..],
            None => &self.frame[self.frame.len() - 1..],
        }
    }

    /// The device expects an acknowledgement for every frame it opens with `0x01`.
    pub fn requires_acknowledgement(&self) -> bool {
        self.frame.first() == Some(&0x01)
    }

    /// Whether the received checksum digits match the computed ones.
    ///
    /// `None` for kinds without a checksum.
    pub fn checksum_matches(&self) -> Option<bool> {
        let shape = self.kind.shape()?;
        match shape.terminator {
            Terminator::Plain => None,
            Terminator::Checksummed => {
                Some(shape.terminator.build(self.header(), self.payload()) == self.terminator())
            }
        }
    }

    /// Name reported in a `DeviceNameResponse`, if it carries one.
    pub fn device_name(&self) -> Option<String> {
        if self.kind != Kind::DeviceNameResponse {
            return None;
        }
        let name = std::str::from_utf8(self.payload()).ok()?;
        let name = name.trim_matches(|c: char| c == ' ' || c == '\0');
        if name.is_empty() || !name.is_ascii() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Amount announced by a `PaymentNotification`; blank amounts are absent.
    pub fn notified_amount(&self) -> Option<u32> {
        if self.kind != Kind::PaymentNotification {
            return None;
        }
        std::str::from_utf8(self.payload())
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// Decodes the record carried by a `PaymentRecordResponse`.
    ///
    /// `None` for any other kind.
    pub fn payment_record(&self) -> Option<Result<PaymentRecord, RecordError>> {
        (self.kind == Kind::PaymentRecordResponse)
            .then(|| PaymentRecord::from_payload(self.payload()))
    }

    /// Opaque per-card bytes from a `UniqueCardDataResponse`.
    pub fn card_data(&self) -> Option<&[u8]> {
        (self.kind == Kind::UniqueCardDataResponse).then(|| self.payload())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, hex(&self.frame))
    }
}

/// Bytes as space separated uppercase hex pairs.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).join(" ")
}

/// Matches one frame at the start of `src`.
///
/// Returns the message and the number of bytes it consumed, or `None` when no
/// complete frame is buffered yet.
pub fn parse(src: &[u8]) -> Option<(Message, usize)> {
    if let Some(shape) = REGISTRY.iter().find(|shape| src.starts_with(shape.header)) {
        // A known header owns the buffer until its whole frame is in, even if
        // the binary payload seen so far contains a terminator byte.
        return shape.matches(src).then(|| take(shape, src));
    }
    let end = src.iter().position(|b| *b == TERMINATOR)? + 1;
    let message = Message {
        kind: Kind::Unknown,
        frame: Bytes::copy_from_slice(&src[..end]),
    };
    Some((message, end))
}

fn take(shape: &Shape, src: &[u8]) -> (Message, usize) {
    let length = shape.length();
    let message = Message {
        kind: shape.kind,
        frame: Bytes::copy_from_slice(&src[..length]),
    };
    (message, length)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_frame_into_sections() {
        let message = Message::new(Kind::DeviceNameResponse, b"ETC-1234").unwrap();
        assert_eq!(message.header(), &[0x02, 0xE2]);
        assert_eq!(message.payload(), b"ETC-1234");
        assert_eq!(message.terminator().len(), 3);
        assert_eq!(message.terminator()[2], TERMINATOR);
        assert_eq!(message.frame().len(), 13);
    }

    #[test]
    fn rejects_payload_of_wrong_length() {
        assert!(Message::new(Kind::DeviceNameResponse, b"short").is_none());
        assert!(Message::new(Kind::Unknown, b"").is_none());
    }

    #[test]
    fn round_trips_every_concrete_shape() {
        for shape in REGISTRY.iter() {
            let payload = vec![b'0'; shape.payload_length];
            let message = Message::new(shape.kind, &payload).unwrap();
            let (parsed, consumed) = parse(message.frame()).unwrap();
            assert_eq!(parsed, message, "{:?}", shape.kind);
            assert_eq!(consumed, shape.length());
        }
    }

    #[test]
    fn unknown_consumes_through_terminator() {
        let (message, consumed) = parse(&[0x99, 0x98, 0x0D, b'U', 0x0D]).unwrap();
        assert_eq!(message.kind(), Kind::Unknown);
        assert_eq!(consumed, 3);
        assert_eq!(message.payload(), &[0x99, 0x98]);
    }

    #[test]
    fn waits_for_more_bytes_without_terminator() {
        assert!(parse(&[0x99, 0x98]).is_none());
        assert!(parse(&[]).is_none());
    }

    #[test]
    fn partial_known_frame_waits_despite_carriage_return() {
        let mut card_data = vec![0xA5; 128];
        card_data[10] = TERMINATOR;
        let message = Message::new(Kind::UniqueCardDataResponse, &card_data).unwrap();

        assert!(parse(&message.frame()[..20]).is_none());
        assert!(parse(&[0x02, 0xE5, b'1', 0x0D]).is_none());

        let (parsed, consumed) = parse(message.frame()).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(consumed, 3 + 128 + 3);
    }

    #[test]
    fn detects_checksum_mismatch() {
        let message = Message::new(Kind::GateExitNotification, &[]).unwrap();
        assert_eq!(message.checksum_matches(), Some(true));

        let mut corrupted = message.frame().to_vec();
        corrupted[3] = b'F';
        let (corrupted, _) = parse(&corrupted).unwrap();
        assert_eq!(corrupted.kind(), Kind::GateExitNotification);
        assert_eq!(corrupted.checksum_matches(), Some(false));

        let heartbeat = Message::new(Kind::HeartBeat, &[]).unwrap();
        assert_eq!(heartbeat.checksum_matches(), None);
    }

    #[test]
    fn notifications_require_acknowledgement() {
        assert!(Message::new(Kind::PaymentNotification, b"001500")
            .unwrap()
            .requires_acknowledgement());
        assert!(Message::new(Kind::HandshakeRequest, &[])
            .unwrap()
            .requires_acknowledgement());
        assert!(!Message::new(Kind::CardExistenceResponse, &[])
            .unwrap()
            .requires_acknowledgement());
    }

    #[test]
    fn blank_sections_are_absent() {
        let named = Message::new(Kind::DeviceNameResponse, b"MSC-BE51").unwrap();
        assert_eq!(named.device_name().as_deref(), Some("MSC-BE51"));
        let blank = Message::new(Kind::DeviceNameResponse, b"        ").unwrap();
        assert_eq!(blank.device_name(), None);

        let paid = Message::new(Kind::PaymentNotification, b"  1500").unwrap();
        assert_eq!(paid.notified_amount(), Some(1500));
        let unpriced = Message::new(Kind::PaymentNotification, b"      ").unwrap();
        assert_eq!(unpriced.notified_amount(), None);
    }

    #[test]
    fn debug_shows_kind_and_bytes() {
        let message = Message::new(Kind::HandshakeAcknowledgement, &[]).unwrap();
        assert_eq!(format!("{message:?}"), "HandshakeAcknowledgement(F0 0D)");
    }
}
