use crate::session::Fault;
use etc_codec::{Command, Kind, Message, PaymentRecord};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Notification {
    GateEntrance,
    GateExit,
    Payment { amount: Option<u32> },
    CardInserted,
    CardEjected,
}

/// Everything the caller gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
    PreparationFinished,
    PreparationFailed(String),
    Notification(Notification),
    Payment(PaymentRecord),
    PaymentHistoryFinished,
    DeviceName(String),
    CardPresence(bool),
    CardData(Vec<u8>),
    Faulted(Fault),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub event: Option<Event>,
    pub follow_up: Option<Command>,
}

impl Reaction {
    fn event(event: Event) -> Self {
        Self {
            event: Some(event),
            follow_up: None,
        }
    }

    fn then(mut self, command: Command) -> Self {
        self.follow_up = Some(command);
        self
    }
}

/// Driver policy for one received message.
///
/// `answered` is the request the message terminated, if any. The payment
/// history is only walked further when the message answered a walk step, so
/// stray or late records never drive outbound commands.
pub fn react(message: &Message, answered: Option<Command>) -> Reaction {
    let walking = matches!(
        answered,
        Some(Command::InitialPaymentRecord | Command::NextPaymentRecord)
    );
    let walk = |reaction: Reaction| {
        if walking {
            reaction.then(Command::NextPaymentRecord)
        } else {
            reaction
        }
    };
    match message.kind() {
        Kind::GateEntranceNotification => Reaction::event(Event::Notification(Notification::GateEntrance)),
        Kind::GateExitNotification => Reaction::event(Event::Notification(Notification::GateExit)),
        Kind::PaymentNotification => Reaction::event(Event::Notification(Notification::Payment {
            amount: message.notified_amount(),
        }))
        .then(Command::InitialPaymentRecord),
        Kind::CardInsertionNotification => {
            Reaction::event(Event::Notification(Notification::CardInserted))
                .then(Command::InitialPaymentRecord)
        }
        Kind::CardEjectionNotification => Reaction::event(Event::Notification(Notification::CardEjected)),
        Kind::InitialPaymentRecordExistenceResponse => walk(Reaction::default()),
        Kind::InitialPaymentRecordNonExistenceResponse | Kind::NextPaymentRecordNonExistenceResponse => {
            Reaction {
                event: walking.then_some(Event::PaymentHistoryFinished),
                follow_up: None,
            }
        }
        Kind::PaymentRecordResponse => {
            let reaction = match message.payment_record() {
                Some(Ok(record)) => Reaction::event(Event::Payment(record)),
                Some(Err(e)) => {
                    tracing::warn!("Skipping undecodable payment record {message:?}: {e}");
                    Reaction::default()
                }
                None => Reaction::default(),
            };
            walk(reaction)
        }
        Kind::DeviceNameResponse => Reaction {
            event: message.device_name().map(Event::DeviceName),
            follow_up: None,
        },
        Kind::CardExistenceResponse => Reaction::event(Event::CardPresence(true)),
        Kind::CardNonExistenceResponse => Reaction::event(Event::CardPresence(false)),
        Kind::UniqueCardDataResponse => Reaction {
            event: message.card_data().map(|data| Event::CardData(data.to_vec())),
            follow_up: None,
        },
        Kind::HeartBeat | Kind::HandshakeRequest | Kind::HandshakeAcknowledgement | Kind::Unknown => {
            Reaction::default()
        }
    }
}
