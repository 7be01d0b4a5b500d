use crate::config::Config;
use crate::reaction::{react, Event};
use crate::session::{Fault, Session, SessionState};
use crate::transport::Transport;
use etc_codec::device::hex;
use etc_codec::{Command, CommandEncoder, Kind, Message, MessageDecoder};
use futures::{Sink, SinkExt, StreamExt};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant, Sleep};
use tokio_util::codec::{FramedRead, FramedWrite};

/// Owns one device connection: decoding, session state and the outbound queue.
#[derive(Debug)]
pub struct Driver {
    config: Config,
    session: Session,
    events: mpsc::Sender<Event>,
}

impl Driver {
    pub fn new(config: Config, events: mpsc::Sender<Event>) -> Self {
        let session = Session::new(config.max_retries);
        Self {
            config,
            session,
            events,
        }
    }

    /// Runs until the device goes away, the session faults, or the caller
    /// hangs up `requests` with nothing left outstanding.
    pub async fn run<T: Transport>(
        mut self,
        transport: T,
        mut requests: mpsc::Receiver<Command>,
    ) -> anyhow::Result<()> {
        let (reader, writer) = match transport.prepare() {
            Ok(halves) => halves,
            Err(e) => {
                self.session.fault(Fault::Transport(e.to_string()));
                self.emit(Event::PreparationFailed(e.to_string())).await;
                return Ok(());
            }
        };
        let mut reader = FramedRead::new(reader, MessageDecoder::with_policy(self.config.checksum));
        let mut writer = FramedWrite::new(writer, CommandEncoder);

        let response_timer = sleep(self.config.response_timeout);
        tokio::pin!(response_timer);

        self.emit(Event::PreparationFinished).await;
        for query in self.config.startup_queries.clone() {
            self.submit(query, &mut writer, response_timer.as_mut()).await?;
        }

        let mut requests_open = true;
        loop {
            tokio::select! {
                frame = reader.next() => match frame {
                    Some(Ok(message)) => {
                        self.handle(message, &mut writer, response_timer.as_mut()).await?;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Failed to read from device: {e:?}");
                        break;
                    }
                    None => {
                        tracing::info!("Device stream ended");
                        break;
                    }
                },
                request = requests.recv(), if requests_open => match request {
                    Some(command) => self.submit(command, &mut writer, response_timer.as_mut()).await?,
                    None => {
                        tracing::debug!("Request channel closed");
                        requests_open = false;
                    }
                },
                () = &mut response_timer, if self.session.is_waiting() => {
                    let retransmit = self.session.time_out();
                    if let SessionState::Faulted(fault) = self.session.state() {
                        let fault = fault.clone();
                        self.emit(Event::Faulted(fault)).await;
                        break;
                    }
                    self.transmit(retransmit, &mut writer, response_timer.as_mut()).await?;
                }
            }
            if !requests_open && self.session.is_settled() {
                tracing::info!("No more requests, ending session");
                break;
            }
        }
        self.session.reset();
        Ok(())
    }

    async fn handle<W>(
        &mut self,
        message: Message,
        writer: &mut W,
        mut timer: Pin<&mut Sleep>,
    ) -> anyhow::Result<()>
    where
        W: Sink<Command, Error = anyhow::Error> + Unpin,
    {
        tracing::trace!("Received {message:?}");
        let receipt = self.session.receive(&message);
        if let Some(answered) = receipt.answered {
            tracing::debug!("{answered:?} answered by {:?}", message.kind());
        }

        self.transmit(receipt.transmit, writer, timer.as_mut()).await?;

        match message.kind() {
            Kind::HeartBeat => tracing::trace!("Device is alive"),
            Kind::Unknown => {
                tracing::debug!("Discarding {message:?}");
                return Ok(());
            }
            _ => {}
        }

        let reaction = react(&message, receipt.answered);
        if let Some(event) = reaction.event {
            self.emit(event).await;
        }
        if let Some(command) = reaction.follow_up {
            self.submit(command, writer, timer).await?;
        }
        Ok(())
    }

    async fn submit<W>(
        &mut self,
        command: Command,
        writer: &mut W,
        timer: Pin<&mut Sleep>,
    ) -> anyhow::Result<()>
    where
        W: Sink<Command, Error = anyhow::Error> + Unpin,
    {
        let commands = self.session.submit(command)?;
        self.transmit(commands, writer, timer).await
    }

    async fn transmit<W>(
        &mut self,
        commands: Vec<Command>,
        writer: &mut W,
        mut timer: Pin<&mut Sleep>,
    ) -> anyhow::Result<()>
    where
        W: Sink<Command, Error = anyhow::Error> + Unpin,
    {
        for command in commands {
            tracing::trace!("Transmitting {command:?}: {}", hex(&command.bytes()));
            writer.send(command).await?;
            if command.expects_response() {
                timer
                    .as_mut()
                    .reset(Instant::now() + self.config.response_timeout);
            }
        }
        Ok(())
    }

    async fn emit(&self, event: Event) {
        tracing::info!("{event:?}");
        if self.events.send(event).await.is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}
