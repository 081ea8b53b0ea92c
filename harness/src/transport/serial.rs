use std::{
    io::{self, Read, Write},
    time,
};

use crate::{Error, Result};

use super::Transport;

fn to_io(e: serialport::Error) -> io::Error {
    io::Error::new(
        match e.kind {
            serialport::ErrorKind::Io(kind) => kind,
            _ => io::ErrorKind::Other,
        },
        e.description,
    )
}

/// Console reached over a local serial device.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    serial: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    pub fn new(port_name: &str, baud_rate: u32) -> SerialTransport {
        SerialTransport {
            port_name: port_name.to_string(),
            baud_rate,
            serial: None,
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.serial
            .as_mut()
            .ok_or_else(|| Error::Connection(format!("serial port {} is not open", self.port_name)))
    }
}

impl Transport for SerialTransport {
    fn describe(&self) -> String {
        format!("serial {}@{}", self.port_name, self.baud_rate)
    }

    fn connect(&mut self) -> Result<()> {
        if self.serial.is_some() {
            return Ok(());
        }

        let serial = serialport::new(&self.port_name, self.baud_rate)
            .timeout(time::Duration::from_millis(10000))
            .data_bits(serialport::DataBits::Eight)
            .open()
            .map_err(|e| {
                Error::Connection(format!("could not open serial port {}: {}", self.port_name, e))
            })?;

        if let Err(e) = serial.clear(serialport::ClearBuffer::All) {
            println!("(warn) failed to clear serial port: {}", e);
        }

        self.serial = Some(serial);

        Ok(())
    }

    fn disconnect(&mut self) {
        self.serial = None;
    }

    fn is_connected(&self) -> bool {
        self.serial.is_some()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let serial = self.port()?;

        if let Err(e) = serial.write_all(data) {
            return Err(Error::Io(io::Error::new(
                e.kind(),
                format!("could not write to serial port: {}", e),
            )));
        }

        if let Err(e) = serial.flush() {
            return Err(Error::Io(io::Error::new(
                e.kind(),
                format!("could not flush serial port: {}", e),
            )));
        }

        Ok(())
    }

    fn pending_bytes(&mut self) -> Result<usize> {
        let serial = self.port()?;

        let pending = serial.bytes_to_read().map_err(|e| Error::Io(to_io(e)))?;

        Ok(pending as usize)
    }

    fn drain(&mut self) -> Result<Vec<u8>> {
        let serial = self.port()?;

        let mut out = Vec::new();
        let mut buf = [0u8; 256];

        while serial.bytes_to_read().map_err(|e| Error::Io(to_io(e)))? > 0 {
            let bytes_read = match serial.read(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    return Err(Error::Io(io::Error::new(
                        e.kind(),
                        format!("could not read from serial port: {}", e),
                    )))
                }
            };

            if bytes_read == 0 {
                break;
            }

            out.extend_from_slice(&buf[..bytes_read]);
        }

        Ok(out)
    }

    fn discard_pending(&mut self) -> Result<()> {
        let serial = self.port()?;

        serial
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| Error::Io(to_io(e)))
    }

    fn open_attempts(&self) -> u32 {
        10
    }
}
