use super::{hex, parse, Message};
use crate::checksum::checksum;
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::Decoder;

/// What to do with an inbound frame whose checksum digits are wrong.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Accept without looking.
    Ignore,
    /// Accept, but log a warning.
    #[default]
    Warn,
    /// Log a warning and drop the frame.
    Discard,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct MessageDecoder {
    policy: ChecksumPolicy,
}

impl MessageDecoder {
    pub fn with_policy(policy: ChecksumPolicy) -> Self {
        Self { policy }
    }

    /// Returns false if the frame must be dropped.
    fn admit(&self, message: &Message) -> bool {
        if self.policy == ChecksumPolicy::Ignore || message.checksum_matches() != Some(false) {
            return true;
        }
        let covered = [message.header(), message.payload()].concat();
        log::warn!(
            "Checksum mismatch in {:?}: expected {}, received {}",
            message.kind(),
            hex(&checksum(&covered)),
            hex(&message.terminator()[..2])
        );
        self.policy != ChecksumPolicy::Discard
    }
}

impl Decoder for MessageDecoder {
    type Item = Message;

    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some((message, consumed)) = parse(src) {
            src.advance(consumed);
            log::trace!("Decoded {message:?}");
            if self.admit(&message) {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}
