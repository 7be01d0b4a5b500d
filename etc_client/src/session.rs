use etc_codec::{Command, Kind, Message};
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum Fault {
    #[error("transport preparation failed: {0}")]
    Transport(String),
    #[error("no answer to {command:?} after {attempts} attempts")]
    ResponseTimeout { command: Command, attempts: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session is faulted: {0}")]
    Faulted(Fault),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// A handshake is on the wire; `then` goes out once the device acknowledges it.
    AwaitingHandshakeAcknowledgement { then: Command },
    AwaitingResponse(Command),
    Faulted(Fault),
}

/// Outcome of feeding one received message to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    /// The outstanding request this message terminated.
    pub answered: Option<Command>,
    /// Commands to put on the wire, in order.
    pub transmit: Vec<Command>,
}

/// Request/response bookkeeping for one device conversation.
///
/// Strictly half-duplex: at most one request is outstanding, later ones wait in `queue`.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    handshake_confirmed: bool,
    queue: VecDeque<Command>,
    attempts: u8,
    max_retries: u8,
}

impl Session {
    pub fn new(max_retries: u8) -> Self {
        Self {
            state: SessionState::Idle,
            handshake_confirmed: false,
            queue: VecDeque::new(),
            attempts: 0,
            max_retries,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_waiting(&self) -> bool {
        matches!(
            self.state,
            SessionState::AwaitingHandshakeAcknowledgement { .. } | SessionState::AwaitingResponse(_)
        )
    }

    /// Idle with nothing queued.
    pub fn is_settled(&self) -> bool {
        self.state == SessionState::Idle && self.queue.is_empty()
    }

    /// Returns the commands to transmit now; queued requests return none.
    pub fn submit(&mut self, command: Command) -> Result<Vec<Command>, SessionError> {
        if let SessionState::Faulted(fault) = &self.state {
            return Err(SessionError::Faulted(fault.clone()));
        }
        if !command.expects_response() {
            return Ok(vec![command]);
        }
        match command {
            Command::NextPaymentRecord if self.restarting_history() => {
                tracing::debug!("History walk restarts, dropping {command:?}");
                return Ok(Vec::new());
            }
            Command::InitialPaymentRecord => {
                self.queue.retain(|queued| *queued != Command::NextPaymentRecord);
            }
            _ => {}
        }
        if self.state != SessionState::Idle {
            if self.queue.contains(&command) {
                tracing::debug!("{command:?} already queued");
            } else {
                tracing::debug!("Queueing {command:?} behind {:?}", self.state);
                self.queue.push_back(command);
            }
            return Ok(Vec::new());
        }
        Ok(self.dispatch(command))
    }

    /// An `InitialPaymentRecord` is pending, so the history cursor is about to be reset.
    fn restarting_history(&self) -> bool {
        let initial = Command::InitialPaymentRecord;
        self.queue.contains(&initial)
            || match self.state {
                SessionState::AwaitingHandshakeAcknowledgement { then } => then == initial,
                SessionState::AwaitingResponse(command) => command == initial,
                _ => false,
            }
    }

    fn dispatch(&mut self, command: Command) -> Vec<Command> {
        self.attempts = 1;
        if command.requires_preliminary_handshake() && !self.handshake_confirmed {
            self.state = SessionState::AwaitingHandshakeAcknowledgement { then: command };
            vec![Command::Handshake]
        } else {
            self.state = SessionState::AwaitingResponse(command);
            vec![command]
        }
    }

    pub fn receive(&mut self, message: &Message) -> Receipt {
        let mut receipt = Receipt::default();
        if matches!(self.state, SessionState::Faulted(_)) {
            return receipt;
        }
        if message.requires_acknowledgement() {
            receipt.transmit.push(Command::Acknowledgement);
        }

        match self.state {
            SessionState::AwaitingHandshakeAcknowledgement { then }
                if message.kind() == Kind::HandshakeAcknowledgement =>
            {
                tracing::debug!("Handshake acknowledged, sending {then:?}");
                self.handshake_confirmed = true;
                self.attempts = 1;
                self.state = SessionState::AwaitingResponse(then);
                receipt.transmit.push(then);
            }
            SessionState::AwaitingResponse(command) if command.is_answered_by(message.kind()) => {
                if command == Command::Handshake {
                    self.handshake_confirmed = true;
                }
                receipt.answered = Some(command);
                self.state = SessionState::Idle;
                if let Some(next) = self.queue.pop_front() {
                    receipt.transmit.extend(self.dispatch(next));
                }
            }
            _ => {}
        }
        receipt
    }

    /// The outstanding request went unanswered for too long.
    ///
    /// Retransmits while retries remain, faults otherwise.
    pub fn time_out(&mut self) -> Vec<Command> {
        let (command, resend) = match self.state {
            SessionState::AwaitingHandshakeAcknowledgement { then } => (then, Command::Handshake),
            SessionState::AwaitingResponse(command) => (command, command),
            _ => return Vec::new(),
        };
        if self.attempts <= self.max_retries {
            self.attempts += 1;
            tracing::warn!("No answer to {command:?}, retransmitting {resend:?} (attempt {})", self.attempts);
            vec![resend]
        } else {
            self.fault(Fault::ResponseTimeout {
                command,
                attempts: self.attempts,
            });
            Vec::new()
        }
    }

    pub fn fault(&mut self, fault: Fault) {
        tracing::error!("Session faulted: {fault}");
        self.queue.clear();
        self.state = SessionState::Faulted(fault);
    }

    /// Back to the unconnected baseline; anything outstanding is dropped.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.handshake_confirmed = false;
        self.queue.clear();
        self.attempts = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn message(kind: Kind) -> Message {
        let payload = vec![b'0'; kind.shape().unwrap().payload_length];
        Message::new(kind, &payload).unwrap()
    }

    /// A session that already went through one handshake.
    fn handshaken() -> Session {
        let mut session = Session::new(1);
        session.submit(Command::CardExistence).unwrap();
        session.receive(&message(Kind::HandshakeAcknowledgement));
        session.receive(&message(Kind::CardExistenceResponse));
        assert!(session.is_settled());
        session
    }

    #[test]
    fn handshakes_before_first_query() {
        let mut session = Session::new(1);
        assert_eq!(session.submit(Command::DeviceName), Ok(vec![Command::Handshake]));
        assert_eq!(
            session.state(),
            &SessionState::AwaitingHandshakeAcknowledgement {
                then: Command::DeviceName
            }
        );

        let receipt = session.receive(&message(Kind::HandshakeAcknowledgement));
        assert_eq!(receipt.transmit, vec![Command::DeviceName]);
        assert_eq!(receipt.answered, None);
        assert_eq!(session.state(), &SessionState::AwaitingResponse(Command::DeviceName));

        let receipt = session.receive(&message(Kind::DeviceNameResponse));
        assert_eq!(receipt.answered, Some(Command::DeviceName));
        assert_eq!(session.state(), &SessionState::Idle);
    }

    #[test]
    fn explicit_handshake_returns_to_idle() {
        let mut session = Session::new(1);
        assert_eq!(session.submit(Command::Handshake), Ok(vec![Command::Handshake]));
        assert_eq!(session.state(), &SessionState::AwaitingResponse(Command::Handshake));
        let receipt = session.receive(&message(Kind::HandshakeAcknowledgement));
        assert_eq!(receipt.answered, Some(Command::Handshake));
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(session.submit(Command::DeviceName), Ok(vec![Command::DeviceName]));
    }

    #[test]
    fn handshakes_only_once() {
        let mut session = handshaken();
        assert_eq!(
            session.submit(Command::InitialPaymentRecord),
            Ok(vec![Command::InitialPaymentRecord])
        );
    }

    #[test]
    fn negative_response_completes_request() {
        let mut session = handshaken();
        session.submit(Command::NextPaymentRecord).unwrap();
        let receipt = session.receive(&message(Kind::NextPaymentRecordNonExistenceResponse));
        assert_eq!(receipt.answered, Some(Command::NextPaymentRecord));
        assert!(session.is_settled());
    }

    #[test]
    fn queues_while_outstanding() {
        let mut session = handshaken();
        assert_eq!(session.submit(Command::DeviceName), Ok(vec![Command::DeviceName]));
        assert_eq!(session.submit(Command::UniqueCardData), Ok(vec![]));
        assert_eq!(session.submit(Command::UniqueCardData), Ok(vec![]));

        let receipt = session.receive(&message(Kind::DeviceNameResponse));
        assert_eq!(receipt.transmit, vec![Command::UniqueCardData]);
        let receipt = session.receive(&message(Kind::UniqueCardDataResponse));
        assert_eq!(receipt.transmit, vec![]);
        assert!(session.is_settled());
    }

    #[test]
    fn unrelated_messages_leave_state_alone() {
        let mut session = handshaken();
        session.submit(Command::DeviceName).unwrap();
        for kind in [Kind::HeartBeat, Kind::GateEntranceNotification, Kind::CardExistenceResponse] {
            let receipt = session.receive(&message(kind));
            assert_eq!(receipt.answered, None);
            assert_eq!(session.state(), &SessionState::AwaitingResponse(Command::DeviceName));
        }
    }

    #[test]
    fn notification_is_acknowledged_without_transition() {
        let mut session = handshaken();
        let receipt = session.receive(&message(Kind::PaymentNotification));
        assert_eq!(receipt.transmit, vec![Command::Acknowledgement]);
        assert_eq!(session.state(), &SessionState::Idle);
    }

    #[test]
    fn device_handshake_request_is_acknowledged() {
        let mut session = handshaken();
        session.submit(Command::DeviceName).unwrap();
        let receipt = session.receive(&message(Kind::HandshakeRequest));
        assert_eq!(receipt.transmit, vec![Command::Acknowledgement]);
        assert_eq!(receipt.answered, None);
        assert_eq!(session.state(), &SessionState::AwaitingResponse(Command::DeviceName));
    }

    #[test]
    fn restarted_history_walk_supersedes_cursor() {
        let mut session = handshaken();
        session.submit(Command::NextPaymentRecord).unwrap();
        session.submit(Command::InitialPaymentRecord).unwrap();

        // The record answering the old cursor hands over to the restart.
        let receipt = session.receive(&message(Kind::PaymentRecordResponse));
        assert_eq!(receipt.transmit, vec![Command::InitialPaymentRecord]);
        assert_eq!(session.submit(Command::NextPaymentRecord), Ok(vec![]));

        session.receive(&message(Kind::InitialPaymentRecordExistenceResponse));
        assert_eq!(
            session.submit(Command::NextPaymentRecord),
            Ok(vec![Command::NextPaymentRecord])
        );
        session.receive(&message(Kind::NextPaymentRecordNonExistenceResponse));
        assert!(session.is_settled());
    }

    #[test]
    fn restart_drops_queued_cursor() {
        let mut session = handshaken();
        session.submit(Command::DeviceName).unwrap();
        session.submit(Command::NextPaymentRecord).unwrap();
        session.submit(Command::InitialPaymentRecord).unwrap();

        let receipt = session.receive(&message(Kind::DeviceNameResponse));
        assert_eq!(receipt.transmit, vec![Command::InitialPaymentRecord]);
        session.receive(&message(Kind::InitialPaymentRecordNonExistenceResponse));
        assert!(session.is_settled());
    }

    #[test]
    fn acknowledgement_bypasses_queue() {
        let mut session = handshaken();
        session.submit(Command::DeviceName).unwrap();
        assert_eq!(session.submit(Command::Acknowledgement), Ok(vec![Command::Acknowledgement]));
        assert_eq!(session.state(), &SessionState::AwaitingResponse(Command::DeviceName));
    }

    #[test]
    fn retries_then_faults() {
        let mut session = Session::new(1);
        session.submit(Command::CardExistence).unwrap();
        assert_eq!(session.time_out(), vec![Command::Handshake]);
        assert_eq!(session.time_out(), vec![]);
        assert_eq!(
            session.state(),
            &SessionState::Faulted(Fault::ResponseTimeout {
                command: Command::CardExistence,
                attempts: 2
            })
        );
        assert!(matches!(
            session.submit(Command::DeviceName),
            Err(SessionError::Faulted(_))
        ));
        assert_eq!(session.receive(&message(Kind::PaymentNotification)), Receipt::default());
    }

    #[test]
    fn timeout_when_idle_does_nothing() {
        let mut session = Session::new(0);
        assert_eq!(session.time_out(), vec![]);
        assert_eq!(session.state(), &SessionState::Idle);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut session = handshaken();
        session.submit(Command::DeviceName).unwrap();
        session.submit(Command::UniqueCardData).unwrap();
        session.fault(Fault::Transport("gone".to_string()));
        session.reset();
        assert!(session.is_settled());
        assert_eq!(session.submit(Command::DeviceName), Ok(vec![Command::Handshake]));
    }
}
