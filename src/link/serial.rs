//! Serial port link (8N1) used as both byte source and responder.

use super::{ByteSource, Responder};
use anyhow::{anyhow, Result};
use log::debug;
use serialport::SerialPort;
use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;

/// Bytes pulled from the driver per read. Served one at a time afterwards.
const RX_CHUNK: usize = 64;

pub struct SerialLink {
    port_name: String,
    port: Box<dyn SerialPort>,
    rx: [u8; RX_CHUNK],
    rx_pos: usize,
    rx_len: usize,
}

impl SerialLink {
    /// Open `port_name` at `baud_rate`. `timeout` bounds each driver read/write.
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let mut builder = serialport::new(port_name, baud_rate).timeout(timeout);
        // Some USB serial adapters need explicit settings
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let mut port = builder
            .open()
            .map_err(|e| anyhow!("Failed to open serial port {}: {}", port_name, e))?;
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);
        // Discard anything left over from a previous session
        let _ = port.clear(serialport::ClearBuffer::All);
        debug!("Serial port {} opened at {} baud", port_name, baud_rate);
        Ok(Self {
            port_name: port_name.to_string(),
            port,
            rx: [0u8; RX_CHUNK],
            rx_pos: 0,
            rx_len: 0,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Second handle on the same port, e.g. for replies while this one reads.
    pub fn try_clone(&self) -> Result<Self> {
        let port = self
            .port
            .try_clone()
            .map_err(|e| anyhow!("Failed to clone serial port {}: {}", self.port_name, e))?;
        Ok(Self {
            port_name: self.port_name.clone(),
            port,
            rx: [0u8; RX_CHUNK],
            rx_pos: 0,
            rx_len: 0,
        })
    }
}

impl ByteSource for SerialLink {
    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        if self.rx_pos < self.rx_len {
            let b = self.rx[self.rx_pos];
            self.rx_pos += 1;
            return Ok(Some(b));
        }
        let available = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 {
            return Ok(None);
        }
        let want = available.min(RX_CHUNK);
        match self.port.read(&mut self.rx[..want]) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.rx_len = n;
                self.rx_pos = 1;
                Ok(Some(self.rx[0]))
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Responder for SerialLink {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        // Spin until the driver takes the byte; the link applies back-pressure.
        loop {
            match self.port.write(&[byte]) {
                Ok(1) => return Ok(()),
                Ok(_) => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn send_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &b in bytes {
            self.send_byte(b)?;
        }
        self.port.flush()
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
