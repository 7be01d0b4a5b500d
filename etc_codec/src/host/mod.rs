use crate::shape::{Kind, Terminator};
use serde::{Deserialize, Serialize};

pub mod encoder;

/// Requests the host sends to the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Handshake,
    Acknowledgement,
    CardExistence,
    DeviceName,
    InitialPaymentRecord,
    NextPaymentRecord,
    UniqueCardData,
}

impl Command {
    pub fn header(self) -> &'static [u8] {
        match self {
            Command::Handshake => &[0xFA],
            Command::Acknowledgement => &[0x02, 0xC0],
            Command::CardExistence => &[0x01, 0xC6, b'G'],
            Command::DeviceName => &[0x01, 0xC6, b'K'],
            Command::InitialPaymentRecord => &[0x01, 0xC6, b'L'],
            Command::NextPaymentRecord => &[0x01, 0xC6, b'M'],
            Command::UniqueCardData => &[0x01, 0xC6, b'R'],
        }
    }

    pub fn terminator(self) -> Terminator {
        match self {
            Command::Handshake => Terminator::Plain,
            _ => Terminator::Checksummed,
        }
    }

    /// Complete frame. Commands never carry a payload.
    pub fn bytes(self) -> Vec<u8> {
        let header = self.header();
        let mut bytes = header.to_vec();
        bytes.extend(self.terminator().build(header, &[]));
        bytes
    }

    pub fn requires_preliminary_handshake(self) -> bool {
        self.header().first() == Some(&0x01)
    }

    /// Acknowledgements are fire-and-forget; everything else waits for an answer.
    pub fn expects_response(self) -> bool {
        self != Command::Acknowledgement
    }

    /// Whether a frame of `kind` terminates this request, positive or negative.
    pub fn is_answered_by(self, kind: Kind) -> bool {
        use Kind::*;
        match self {
            Command::Handshake => kind == HandshakeAcknowledgement,
            Command::Acknowledgement => false,
            Command::CardExistence => {
                matches!(kind, CardExistenceResponse | CardNonExistenceResponse)
            }
            Command::DeviceName => kind == DeviceNameResponse,
            Command::InitialPaymentRecord => matches!(
                kind,
                InitialPaymentRecordExistenceResponse
                    | InitialPaymentRecordNonExistenceResponse
                    | PaymentRecordResponse
            ),
            Command::NextPaymentRecord => matches!(
                kind,
                PaymentRecordResponse | NextPaymentRecordNonExistenceResponse
            ),
            Command::UniqueCardData => kind == UniqueCardDataResponse,
        }
    }
}
