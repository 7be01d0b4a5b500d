use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf};
use tokio::net::{tcp, TcpStream};

/// Nordic UART service characteristic the device notifies on.
pub const TX_CHARACTERISTIC: &str = "6E400002-B5A3-F393-E0A9-E50E24DCCA9E";
/// Nordic UART service characteristic the host writes to.
pub const RX_CHARACTERISTIC: &str = "6E400003-B5A3-F393-E0A9-E50E24DCCA9E";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0} characteristic not found")]
    MissingCharacteristic(&'static str),
    #[error("transport unavailable: {0}")]
    Unavailable(#[from] io::Error),
}

/// A byte pipe to the device. Knows nothing about frames.
pub trait Transport {
    type Reader: AsyncRead + Send + Unpin + 'static;
    type Writer: AsyncWrite + Send + Unpin + 'static;

    fn prepare(self) -> Result<(Self::Reader, Self::Writer), TransportError>;
}

/// A serial bridge reachable over TCP.
impl Transport for TcpStream {
    type Reader = tcp::OwnedReadHalf;
    type Writer = tcp::OwnedWriteHalf;

    fn prepare(self) -> Result<(Self::Reader, Self::Writer), TransportError> {
        self.set_nodelay(true)?;
        Ok(self.into_split())
    }
}

impl Transport for DuplexStream {
    type Reader = ReadHalf<DuplexStream>;
    type Writer = WriteHalf<DuplexStream>;

    fn prepare(self) -> Result<(Self::Reader, Self::Writer), TransportError> {
        Ok(tokio::io::split(self))
    }
}

/// A pipe that only works if the peripheral offers both UART characteristics.
#[derive(Debug)]
pub struct NordicUart<T> {
    inner: T,
    characteristics: Vec<String>,
}

impl<T> NordicUart<T> {
    pub fn new(inner: T, characteristics: Vec<String>) -> Self {
        Self {
            inner,
            characteristics,
        }
    }

    fn offers(&self, uuid: &str) -> bool {
        self.characteristics
            .iter()
            .any(|c| c.eq_ignore_ascii_case(uuid))
    }
}

impl<T: Transport> Transport for NordicUart<T> {
    type Reader = T::Reader;
    type Writer = T::Writer;

    fn prepare(self) -> Result<(Self::Reader, Self::Writer), TransportError> {
        if !self.offers(TX_CHARACTERISTIC) {
            return Err(TransportError::MissingCharacteristic("tx"));
        }
        if !self.offers(RX_CHARACTERISTIC) {
            return Err(TransportError::MissingCharacteristic("rx"));
        }
        self.inner.prepare()
    }
}
