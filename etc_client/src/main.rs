use anyhow::Context;
use arguments::{Arguments, Mode};
use bytes::BytesMut;
use clap::Parser;
use config::Config;
use driver::Driver;
use etc_codec::{ChecksumPolicy, Command, MessageDecoder};
use reaction::Event;
use rustyline::{error::ReadlineError, history::DefaultHistory};
use std::{net::SocketAddr, path::Path};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_util::codec::Decoder;
use tracing_subscriber::EnvFilter;
use transport::{NordicUart, Transport};

mod arguments;
mod config;
mod driver;
mod reaction;
mod session;
mod transport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();
    let config = Config::from_file_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.mode {
        Mode::Monitor { address } => {
            let (_requests, handles) = connect(address, config).await?;
            join(handles).await?;
        }
        Mode::Console { address } => {
            let (requests, handles) = connect(address, config).await?;
            console(requests).await?;
            join(handles).await?;
        }
        Mode::Decode { input } => decode(&input, config.checksum)?,
    }

    Ok(())
}

type Handles = (JoinHandle<anyhow::Result<()>>, JoinHandle<()>);

async fn connect(
    address: SocketAddr,
    config: Config,
) -> anyhow::Result<(mpsc::Sender<Command>, Handles)> {
    tracing::info!("Connecting to {address}");
    let stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("Failed to connect to {address}"))?;
    Ok(match config.characteristics.clone() {
        Some(characteristics) => spawn(NordicUart::new(stream, characteristics), config),
        None => spawn(stream, config),
    })
}

fn spawn<T>(transport: T, config: Config) -> (mpsc::Sender<Command>, Handles)
where
    T: Transport + Send + 'static,
{
    let (events_tx, mut events) = mpsc::channel::<Event>(64);
    let (requests, requests_rx) = mpsc::channel(16);

    let driver = tokio::spawn(Driver::new(config, events_tx).run(transport, requests_rx));
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match ron::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Failed to serialize {event:?}: {e}"),
            }
        }
    });
    (requests, (driver, printer))
}

async fn join((driver, printer): Handles) -> anyhow::Result<()> {
    driver.await.context("Driver task panicked")??;
    printer.await.context("Event printer panicked")?;
    Ok(())
}

async fn console(requests: mpsc::Sender<Command>) -> anyhow::Result<()> {
    println!(
        "RON input, such as:\n{}\nor\n{}",
        ron::to_string(&Command::DeviceName)?,
        ron::to_string(&Command::InitialPaymentRecord)?,
    );
    println!("CTRL+C to clear and CTRL+D to quit.");
    let mut rl = rustyline::Editor::<(), DefaultHistory>::new()?;
    loop {
        match rl.readline(">> ") {
            Ok(line) => {
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line)?;
                match ron::from_str::<Command>(&line) {
                    Ok(command) => {
                        if requests.send(command).await.is_err() {
                            println!("Session ended");
                            break;
                        }
                    }
                    Err(e) => println!("{e:#?}"),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!("CTRL+D");
                break;
            }
            Err(e) => anyhow::bail!("{e:?}"),
        }
    }
    Ok(())
}

fn parse_hex_byte(s: &str) -> anyhow::Result<u8> {
    u8::from_str_radix(s, 16).with_context(|| format!("Failed to parse hex byte {s:?}"))
}

fn decode(input: &Path, policy: ChecksumPolicy) -> anyhow::Result<()> {
    let dump = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let bytes = dump
        .split_whitespace()
        .map(parse_hex_byte)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut buffer = BytesMut::from(&bytes[..]);
    let mut decoder = MessageDecoder::with_policy(policy);
    while let Some(message) = decoder.decode(&mut buffer)? {
        println!("{message:?}");
        match message.payment_record() {
            Some(Ok(record)) => println!("    {}", ron::to_string(&record)?),
            Some(Err(e)) => println!("    {e}"),
            None => {}
        }
    }
    if !buffer.is_empty() {
        tracing::warn!("{} trailing bytes without a complete frame", buffer.len());
    }
    Ok(())
}
