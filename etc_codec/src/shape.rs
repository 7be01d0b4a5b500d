use crate::checksum::checksum;
use crate::TERMINATOR;

/// Every frame kind the device is known to send, plus the catch-all.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    HeartBeat,
    HandshakeAcknowledgement,
    HandshakeRequest,
    CardExistenceResponse,
    CardNonExistenceResponse,
    DeviceNameResponse,
    InitialPaymentRecordExistenceResponse,
    InitialPaymentRecordNonExistenceResponse,
    NextPaymentRecordNonExistenceResponse,
    PaymentRecordResponse,
    GateEntranceNotification,
    GateExitNotification,
    PaymentNotification,
    CardInsertionNotification,
    CardEjectionNotification,
    UniqueCardDataResponse,
    Unknown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// A lone `0x0D`.
    Plain,
    /// Two ASCII hex checksum digits, then `0x0D`.
    Checksummed,
}

impl Terminator {
    pub const fn length(self) -> usize {
        match self {
            Terminator::Plain => 1,
            Terminator::Checksummed => 3,
        }
    }

    pub fn build(self, header: &[u8], payload: &[u8]) -> Vec<u8> {
        match self {
            Terminator::Plain => vec![TERMINATOR],
            Terminator::Checksummed => {
                let mut covered = Vec::with_capacity(header.len() + payload.len());
                covered.extend_from_slice(header);
                covered.extend_from_slice(payload);
                let [high, low] = checksum(&covered);
                vec![high, low, TERMINATOR]
            }
        }
    }
}

/// Fixed layout of one concrete frame kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Shape {
    pub kind: Kind,
    pub header: &'static [u8],
    pub payload_length: usize,
    pub terminator: Terminator,
}

impl Shape {
    const fn new(
        kind: Kind,
        header: &'static [u8],
        payload_length: usize,
        terminator: Terminator,
    ) -> Self {
        Self {
            kind,
            header,
            payload_length,
            terminator,
        }
    }

    pub const fn length(&self) -> usize {
        self.header.len() + self.payload_length + self.terminator.length()
    }

    pub fn matches(&self, src: &[u8]) -> bool {
        src.len() >= self.length() && src.starts_with(self.header)
    }
}

/// Concrete shapes in matching priority. `Kind::Unknown` is tried after all of them.
pub static REGISTRY: [Shape; 16] = [
    Shape::new(Kind::HeartBeat, &[b'U'], 0, Terminator::Plain),
    Shape::new(Kind::HandshakeAcknowledgement, &[0xF0], 0, Terminator::Plain),
    Shape::new(Kind::HandshakeRequest, &[0x01, 0xC2, b'0'], 0, Terminator::Checksummed),
    Shape::new(Kind::CardExistenceResponse, &[0x02, 0xCD, 0x01], 0, Terminator::Checksummed),
    Shape::new(Kind::CardNonExistenceResponse, &[0x02, 0xCD, 0x00], 0, Terminator::Checksummed),
    Shape::new(Kind::DeviceNameResponse, &[0x02, 0xE2], 8, Terminator::Checksummed),
    Shape::new(
        Kind::InitialPaymentRecordExistenceResponse,
        &[0x02, 0xC1, b'7'],
        0,
        Terminator::Checksummed,
    ),
    Shape::new(
        Kind::InitialPaymentRecordNonExistenceResponse,
        &[0x02, 0xC1, b'5'],
        0,
        Terminator::Checksummed,
    ),
    Shape::new(
        Kind::NextPaymentRecordNonExistenceResponse,
        &[0x02, 0xC1, b'8'],
        0,
        Terminator::Checksummed,
    ),
    Shape::new(Kind::PaymentRecordResponse, &[0x02, 0xE5], 41, Terminator::Checksummed),
    Shape::new(Kind::GateEntranceNotification, &[0x01, 0xC7, b'a'], 0, Terminator::Checksummed),
    Shape::new(Kind::GateExitNotification, &[0x01, 0xC7, b'A'], 0, Terminator::Checksummed),
    Shape::new(Kind::PaymentNotification, &[0x01, 0xC5], 6, Terminator::Checksummed),
    Shape::new(Kind::CardInsertionNotification, &[0x01, 0xC2, b'D'], 0, Terminator::Checksummed),
    Shape::new(Kind::CardEjectionNotification, &[0x01, 0xC2, b'E'], 0, Terminator::Checksummed),
    Shape::new(Kind::UniqueCardDataResponse, &[0x02, 0xB6, 0x80], 128, Terminator::Checksummed),
];

impl Kind {
    /// Layout of this kind; `None` for `Unknown`, which has no fixed layout.
    pub fn shape(self) -> Option<&'static Shape> {
        REGISTRY.iter().find(|shape| shape.kind == self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn every_concrete_kind_has_exactly_one_shape() {
        let kinds = REGISTRY.iter().map(|shape| shape.kind).collect_vec();
        assert_eq!(kinds.iter().unique().count(), REGISTRY.len());
        assert!(!kinds.contains(&Kind::Unknown));
        assert!(Kind::Unknown.shape().is_none());
        assert_eq!(Kind::PaymentRecordResponse.shape().unwrap().length(), 2 + 41 + 3);
    }

    #[test]
    fn headers_are_unambiguous() {
        // No header is a prefix of another, so registry order is only a tie-break on frequency.
        for (a, b) in REGISTRY.iter().tuple_combinations() {
            assert!(
                !a.header.starts_with(b.header) && !b.header.starts_with(a.header),
                "{:?} and {:?} overlap",
                a.kind,
                b.kind
            );
        }
    }

    #[test]
    fn priority_follows_wire_table() {
        assert_eq!(REGISTRY[0].kind, Kind::HeartBeat);
        assert_eq!(REGISTRY[1].kind, Kind::HandshakeAcknowledgement);
        assert_eq!(REGISTRY[15].kind, Kind::UniqueCardDataResponse);
    }

    #[test]
    fn needs_whole_frame_to_match() {
        let shape = Kind::CardExistenceResponse.shape().unwrap();
        assert!(!shape.matches(&[0x02, 0xCD, 0x01, b'C']));
        assert!(shape.matches(&[0x02, 0xCD, 0x01, b'C', b'E', 0x0D]));
        assert!(!shape.matches(&[0x02, 0xCD, 0x00, b'C', b'E', 0x0D]));
    }

    #[test]
    fn builds_terminators() {
        assert_eq!(Terminator::Plain.build(&[0xFA], &[]), vec![0x0D]);
        // 0xCD + 0x01 = 0xCE
        assert_eq!(
            Terminator::Checksummed.build(&[0x02, 0xCD, 0x01], &[]),
            vec![b'C', b'E', 0x0D]
        );
    }
}
