use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceError, RegisterWrite};
use crate::types::{Sample, Status, WireMode, STATUS_OK};

const READ_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct Command<'a> {
    #[serde(rename = "COMMAND")]
    command: &'a str,
    #[serde(rename = "PARAMETERS", skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<u8>,
}

#[derive(Deserialize)]
struct Response {
    #[serde(rename = "STATUS_CODE")]
    status_code: u16,
    #[serde(rename = "STATUS_TEXT", default)]
    status_text: String,
    #[serde(rename = "DATA", default)]
    data: Option<serde_json::Value>,
}

/// Decoded sample payload carried in the `DATA` field of a data line.
#[derive(Deserialize)]
struct Frame {
    timestamp: i64,
    #[serde(default)]
    sample_number: Option<u32>,
    channel_data: Vec<i32>,
}

/// HackEEG-style board speaking JSON lines over a serial port.
///
/// Every command is one JSON object per line and is answered by a status line.
/// While streaming, each line carries one already-decoded sample.
pub struct SerialDevice {
    port_name: String,
    writer: Box<dyn serialport::SerialPort>,
    reader: BufReader<Box<dyn serialport::SerialPort>>,
    line: String,
}

impl SerialDevice {
    pub fn connect(port_name: &str, baud_rate: u32) -> Result<Self, DeviceError> {
        let connection_error = |reason: String| DeviceError::Connection {
            port: port_name.to_owned(),
            reason,
        };
        let writer = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| connection_error(e.to_string()))?;
        let reader = writer
            .try_clone()
            .map_err(|e| connection_error(e.to_string()))?;
        debug!("opened {port_name} at {baud_rate} baud");
        Ok(Self {
            port_name: port_name.to_owned(),
            writer,
            reader: BufReader::new(reader),
            line: String::new(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&mut self, command: &str, parameters: Vec<u8>) -> Result<(), DeviceError> {
        let payload = serde_json::to_string(&Command {
            command,
            parameters,
        })
        .map_err(|e| DeviceError::Decode(e.to_string()))?;
        self.writer.write_all(payload.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_response(&mut self) -> Result<Response, DeviceError> {
        let line = read_full_line(&mut self.reader, &mut self.line)?;
        serde_json::from_str(line.trim()).map_err(|e| DeviceError::Decode(e.to_string()))
    }

    fn command(&mut self, command: &str, parameters: Vec<u8>) -> Result<(), DeviceError> {
        self.send(command, parameters)?;
        let response = self.read_response()?;
        if response.status_code != STATUS_OK {
            return Err(DeviceError::Rejected {
                command: command.to_owned(),
                status: response.status_code,
            });
        }
        Ok(())
    }
}

/// Reads until a newline. Bytes that arrived before a timeout stay in
/// `pending` so the next call completes the same line.
fn read_full_line<R: BufRead>(reader: &mut R, pending: &mut String) -> Result<String, DeviceError> {
    match reader.read_line(pending) {
        Ok(_) if pending.ends_with('\n') => Ok(std::mem::take(pending)),
        Ok(_) => Err(DeviceError::Timeout),
        Err(e) if e.kind() == ErrorKind::TimedOut => Err(DeviceError::Timeout),
        Err(e) => Err(e.into()),
    }
}

impl Device for SerialDevice {
    fn configure(&mut self, writes: &[RegisterWrite]) -> Result<(), DeviceError> {
        self.command("sdatac", Vec::new())?;
        for write in writes {
            self.command("wreg", vec![write.register, write.value])?;
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: WireMode) -> Result<(), DeviceError> {
        match mode {
            WireMode::LineDelimited => self.command("jsonlines", Vec::new()),
            WireMode::CompactBinary => Err(DeviceError::UnsupportedMode(mode)),
        }
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.command("start", Vec::new())?;
        self.command("rdatac", Vec::new())
    }

    fn read_next_sample(&mut self) -> Result<Option<Sample>, DeviceError> {
        let response = self.read_response()?;
        let status = Status::from_code(response.status_code);
        if !status.is_ok() {
            debug!("status {}: {}", response.status_code, response.status_text);
            return Ok(Some(Sample {
                timestamp: 0,
                sequence_id: None,
                status,
                channel_data: Vec::new(),
            }));
        }
        let Some(data) = response.data else {
            return Ok(None);
        };
        let frame: Frame =
            serde_json::from_value(data).map_err(|e| DeviceError::Decode(e.to_string()))?;
        Ok(Some(Sample::ok(
            frame.timestamp,
            frame.sample_number,
            frame.channel_data,
        )))
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        // Data lines may still be in flight, so responses are not checked.
        self.send("sdatac", Vec::new())?;
        self.send("stop", Vec::new())?;
        if let Err(e) = self.writer.clear(serialport::ClearBuffer::Input) {
            warn!("{}: could not clear input buffer: {e}", self.port_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Read};

    /// Serves chunks in order, `None` standing for a read timeout.
    struct ChunkedPort(VecDeque<Option<&'static [u8]>>);

    impl Read for ChunkedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                Some(None) => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn line_split_by_timeout_is_reassembled() {
        let port = ChunkedPort(VecDeque::from(vec![
            Some(&b"{\"STATUS_CODE\":2"[..]),
            None,
            Some(&b"00}\n{\"STATUS"[..]),
            None,
            Some(&b"_CODE\":500}\n"[..]),
        ]));
        let mut reader = BufReader::new(port);
        let mut pending = String::new();
        assert!(matches!(read_full_line(&mut reader, &mut pending), Err(DeviceError::Timeout)));
        assert_eq!(
            read_full_line(&mut reader, &mut pending).unwrap(),
            "{\"STATUS_CODE\":200}\n"
        );
        assert!(matches!(read_full_line(&mut reader, &mut pending), Err(DeviceError::Timeout)));
        let line = read_full_line(&mut reader, &mut pending).unwrap();
        let response: Response = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(response.status_code, 500);
        assert!(pending.is_empty());
        // 端口无数据时视为超时
        assert!(matches!(read_full_line(&mut reader, &mut pending), Err(DeviceError::Timeout)));
    }

    #[test]
    fn command_serializes_like_firmware_expects() {
        let json = serde_json::to_string(&Command {
            command: "wreg",
            parameters: vec![0x01, 0x95],
        })
        .unwrap();
        assert_eq!(json, r#"{"COMMAND":"wreg","PARAMETERS":[1,149]}"#);
        let bare = serde_json::to_string(&Command {
            command: "rdatac",
            parameters: Vec::new(),
        })
        .unwrap();
        assert_eq!(bare, r#"{"COMMAND":"rdatac"}"#);
    }

    #[test]
    fn data_line_decodes_into_frame() {
        let response: Response = serde_json::from_str(
            r#"{"STATUS_CODE":200,"DATA":{"timestamp":42,"sample_number":3,"channel_data":[1,-2]}}"#,
        )
        .unwrap();
        let frame: Frame = serde_json::from_value(response.data.unwrap()).unwrap();
        assert_eq!(frame.timestamp, 42);
        assert_eq!(frame.sample_number, Some(3));
        assert_eq!(frame.channel_data, vec![1, -2]);
    }

    #[test]
    fn missing_port_is_a_connection_error() {
        let err = SerialDevice::connect("/dev/does-not-exist-biostream", 115_200);
        assert!(matches!(err, Err(DeviceError::Connection { .. })));
    }
}
