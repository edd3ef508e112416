use std::time::Duration;

use serialport::{ClearBuffer, SerialPort, SerialPortType};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::source::{ByteSource, Chunk, ReadTimeout, StreamSource};

/// Baud rate the AFE bridge firmware listens at out of the box.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Serial port settings.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub path: String,
    /// Line rate. 8N1, no flow control.
    pub baud_rate: u32,
    /// Initial read timeout applied on open. Each read overrides it.
    pub timeout: Duration,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(50),
        }
    }
}

impl ReadTimeout for Box<dyn SerialPort> {
    fn apply_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.set_timeout(timeout).map_err(std::io::Error::from)
    }
}

/// An open serial port.
pub struct SerialStream {
    source: StreamSource<Box<dyn SerialPort>>,
    path: String,
}

impl SerialStream {
    /// Open the port described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(config.path.as_str(), config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|err| TransportError::Open {
                path: config.path.clone(),
                reason: err.description,
            })?;

        info!(path = %config.path, baud = config.baud_rate, "serial port opened");
        Ok(Self {
            source: StreamSource::new(port),
            path: config.path.clone(),
        })
    }

    /// Device path this stream was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Line rate reported by the driver.
    pub fn baud_rate(&self) -> Option<u32> {
        self.source.get_ref().baud_rate().ok()
    }
}

impl ByteSource for SerialStream {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.source.write_bytes(bytes)
    }

    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Chunk> {
        self.source.read_chunk(buf, timeout)
    }

    fn discard_input(&mut self) -> Result<usize> {
        let port = self.source.get_ref();
        let pending = port.bytes_to_read().unwrap_or(0) as usize;
        port.clear(ClearBuffer::Input)
            .map_err(|err| TransportError::Io(err.into()))?;
        debug!(path = %self.path, pending, "serial input cleared");
        Ok(pending)
    }
}

impl Drop for SerialStream {
    fn drop(&mut self) {
        debug!(path = %self.path, "serial port closed");
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("path", &self.path)
            .finish()
    }
}

/// Open a serial port. Shorthand for [`SerialStream::open`].
pub fn open(config: &SerialConfig) -> Result<SerialStream> {
    SerialStream::open(config)
}

/// A serial port found on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub kind: &'static str,
    /// USB product / manufacturer string, when the OS exposes one.
    pub description: Option<String>,
}

/// List serial ports visible to the OS.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports =
        serialport::available_ports().map_err(|err| TransportError::Enumerate(err.description))?;

    Ok(ports
        .into_iter()
        .map(|port| {
            let (kind, description) = match port.port_type {
                SerialPortType::UsbPort(usb) => ("usb", usb.product.or(usb.manufacturer)),
                SerialPortType::PciPort => ("pci", None),
                SerialPortType::BluetoothPort => ("bluetooth", None),
                SerialPortType::Unknown => ("unknown", None),
            };
            PortInfo {
                name: port.port_name,
                kind,
                description,
            }
        })
        .collect())
}
