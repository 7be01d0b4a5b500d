use super::Command;
use bytes::BufMut;
use tokio_util::codec::Encoder;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandEncoder;

impl Encoder<Command> for CommandEncoder {
    type Error = anyhow::Error;

    fn encode(&mut self, item: Command, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        log::trace!("Encoding {item:?}");
        dst.put_slice(&item.bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::BytesMut;

    fn encode(command: Command) -> BytesMut {
        let mut buffer = BytesMut::new();
        CommandEncoder.encode(command, &mut buffer).unwrap();
        buffer
    }

    #[test]
    fn encodes_handshake_with_plain_terminator() {
        assert_eq!(encode(Command::Handshake), [0xFA, 0x0D][..]);
    }

    #[test]
    fn encodes_checksummed_commands() {
        assert_eq!(encode(Command::Acknowledgement), [0x02, 0xC0, b'C', b'0', 0x0D][..]);
        assert_eq!(encode(Command::CardExistence), [0x01, 0xC6, b'G', b'0', b'D', 0x0D][..]);
        assert_eq!(encode(Command::DeviceName), [0x01, 0xC6, b'K', b'1', b'1', 0x0D][..]);
        assert_eq!(
            encode(Command::InitialPaymentRecord),
            [0x01, 0xC6, b'L', b'1', b'2', 0x0D][..]
        );
        assert_eq!(encode(Command::NextPaymentRecord), [0x01, 0xC6, b'M', b'1', b'3', 0x0D][..]);
        assert_eq!(encode(Command::UniqueCardData), [0x01, 0xC6, b'R', b'1', b'8', 0x0D][..]);
    }

    #[test]
    fn appends_to_existing_buffer() {
        let mut buffer = BytesMut::new();
        let mut encoder = CommandEncoder;
        encoder.encode(Command::Handshake, &mut buffer).unwrap();
        encoder.encode(Command::DeviceName, &mut buffer).unwrap();
        assert_eq!(buffer.len(), 2 + 6);
    }
}
