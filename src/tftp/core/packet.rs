//! TFTP packet codec
//!
//! Wire layout of the five RFC 1350 messages:
//!
//! ```text
//! RRQ/WRQ | 01/02 | filename | 0 | mode | 0 |
//! DATA    | 03    | block#   | 0..=512 bytes |
//! ACK     | 04    | block#   |
//! ERROR   | 05    | code     | message | 0 |
//! ```
//!
//! All 16-bit fields are big-endian.

use std::fmt;

use thiserror::Error;

use super::convert::Convert;

/// Largest DATA payload; a shorter payload ends the transfer.
pub const MAX_DATA_LEN: usize = 512;

/// Opcode plus block number.
pub const HEADER_LEN: usize = 4;

/// Largest datagram the client expects to receive.
pub const MAX_PACKET_LEN: usize = MAX_DATA_LEN + HEADER_LEN;

/// Transfer modes a request may carry. Compared case-insensitively and
/// written to the wire exactly as configured.
pub const SUPPORTED_MODES: [&str; 3] = ["netascii", "octet", "mail"];

/// Returns true if `mode` names one of [`SUPPORTED_MODES`].
pub fn is_supported_mode(mode: &str) -> bool {
    SUPPORTED_MODES.iter().any(|m| m.eq_ignore_ascii_case(mode))
}

/// Packet type carried in the first two bytes of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Rrq),
            2 => Some(Self::Wrq),
            3 => Some(Self::Data),
            4 => Some(Self::Ack),
            5 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rrq => "RRQ",
            Self::Wrq => "WRQ",
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error codes carried by ERROR packets.
///
/// Codes outside the RFC 1350 range are kept verbatim in `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileAlreadyExists,
    NoSuchUser,
    Unknown(u16),
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::NotDefined => 0,
            Self::FileNotFound => 1,
            Self::AccessViolation => 2,
            Self::DiskFull => 3,
            Self::IllegalOperation => 4,
            Self::UnknownTransferId => 5,
            Self::FileAlreadyExists => 6,
            Self::NoSuchUser => 7,
            Self::Unknown(code) => code,
        }
    }

    /// Standard RFC 1350 text for the code.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::NotDefined | Self::Unknown(_) => "Undefined error",
            Self::FileNotFound => "File not found",
            Self::AccessViolation => "Access violation",
            Self::DiskFull => "Disk full or allocation exceeded",
            Self::IllegalOperation => "Illegal TFTP operation",
            Self::UnknownTransferId => "Unknown transfer ID",
            Self::FileAlreadyExists => "File already exists",
            Self::NoSuchUser => "No such user",
        }
    }
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::NotDefined,
            1 => Self::FileNotFound,
            2 => Self::AccessViolation,
            3 => Self::DiskFull,
            4 => Self::IllegalOperation,
            5 => Self::UnknownTransferId,
            6 => Self::FileAlreadyExists,
            7 => Self::NoSuchUser,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.default_message(), self.as_u16())
    }
}

/// Failures while encoding or decoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet too short: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("invalid opcode: {0}")]
    UnknownOpcode(u16),
    #[error("string field is not NUL-terminated")]
    MissingTerminator,
    #[error("data payload of {0} bytes exceeds 512")]
    PayloadTooLarge(usize),
    #[error("unsupported transfer mode `{0}`")]
    UnsupportedMode(String),
    #[error("invalid filename `{0}`")]
    InvalidFilename(String),
}

/// A decoded TFTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq { filename: String, mode: String },
    Wrq { filename: String, mode: String },
    Data { block_num: u16, data: Vec<u8> },
    Ack(u16),
    Error { code: ErrorCode, msg: String },
}

impl Packet {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Rrq { .. } => Opcode::Rrq,
            Self::Wrq { .. } => Opcode::Wrq,
            Self::Data { .. } => Opcode::Data,
            Self::Ack(_) => Opcode::Ack,
            Self::Error { .. } => Opcode::Error,
        }
    }

    /// Encode the packet into a UDP payload.
    ///
    /// Requests are rejected if the mode is not supported or the filename
    /// cannot be NUL-terminated; DATA is rejected above [`MAX_DATA_LEN`].
    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let mut buf = Vec::with_capacity(MAX_PACKET_LEN);
        buf.extend_from_slice(&self.opcode().as_u16().to_be_bytes());

        match self {
            Self::Rrq { filename, mode } | Self::Wrq { filename, mode } => {
                if filename.is_empty() || filename.contains('\0') {
                    return Err(PacketError::InvalidFilename(filename.clone()));
                }
                if !is_supported_mode(mode) {
                    return Err(PacketError::UnsupportedMode(mode.clone()));
                }
                buf.extend_from_slice(filename.as_bytes());
                buf.push(0);
                buf.extend_from_slice(mode.as_bytes());
                buf.push(0);
            }
            Self::Data { block_num, data } => {
                if data.len() > MAX_DATA_LEN {
                    return Err(PacketError::PayloadTooLarge(data.len()));
                }
                buf.extend_from_slice(&block_num.to_be_bytes());
                buf.extend_from_slice(data);
            }
            Self::Ack(block_num) => {
                buf.extend_from_slice(&block_num.to_be_bytes());
            }
            Self::Error { code, msg } => {
                buf.extend_from_slice(&code.as_u16().to_be_bytes());
                buf.extend_from_slice(msg.replace('\0', "").as_bytes());
                buf.push(0);
            }
        }

        Ok(buf)
    }

    /// Decode a UDP payload.
    ///
    /// Request text is taken as-is. An ERROR message missing its terminator
    /// is read to the end of the datagram.
    pub fn deserialize(buf: &[u8]) -> Result<Self, PacketError> {
        let raw = Convert::to_u16(buf)?;
        let opcode = Opcode::from_u16(raw).ok_or(PacketError::UnknownOpcode(raw))?;

        match opcode {
            Opcode::Rrq | Opcode::Wrq => {
                let (filename, used) = Convert::to_string(&buf[2..])?;
                let (mode, _) = Convert::to_string(&buf[2 + used..])?;
                Ok(if opcode == Opcode::Rrq {
                    Self::Rrq { filename, mode }
                } else {
                    Self::Wrq { filename, mode }
                })
            }
            Opcode::Data | Opcode::Ack | Opcode::Error if buf.len() < HEADER_LEN => {
                Err(PacketError::Truncated {
                    needed: HEADER_LEN,
                    actual: buf.len(),
                })
            }
            Opcode::Data => {
                let block_num = Convert::to_u16(&buf[2..])?;
                let data = &buf[HEADER_LEN..];
                if data.len() > MAX_DATA_LEN {
                    return Err(PacketError::PayloadTooLarge(data.len()));
                }
                Ok(Self::Data {
                    block_num,
                    data: data.to_vec(),
                })
            }
            Opcode::Ack => Ok(Self::Ack(Convert::to_u16(&buf[2..])?)),
            Opcode::Error => {
                let code = ErrorCode::from(Convert::to_u16(&buf[2..])?);
                let body = &buf[HEADER_LEN..];
                let msg = match Convert::to_string(body) {
                    Ok((msg, _)) => msg,
                    Err(_) => String::from_utf8_lossy(body).into_owned(),
                };
                Ok(Self::Error { code, msg })
            }
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rrq { filename, mode } => write!(f, "RRQ [{}] [{}]", filename, mode),
            Self::Wrq { filename, mode } => write!(f, "WRQ [{}] [{}]", filename, mode),
            Self::Data { block_num, data } => {
                write!(f, "DATA [{}] ({} bytes)", block_num, data.len())
            }
            Self::Ack(block_num) => write!(f, "ACK [{}]", block_num),
            Self::Error { code, msg } => write!(f, "ERROR [{}]: {}", code.as_u16(), msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_write_request() {
        let wrq = Packet::Wrq {
            filename: "lab3.docx".to_string(),
            mode: "octet".to_string(),
        };
        assert_eq!(wrq.serialize().unwrap(), b"\x00\x02lab3.docx\x00octet\x00".to_vec());
    }

    #[test]
    fn request_mode_keeps_configured_case() {
        let rrq = Packet::Rrq {
            filename: "a".to_string(),
            mode: "NetASCII".to_string(),
        };
        assert_eq!(rrq.serialize().unwrap(), b"\x00\x01a\x00NetASCII\x00".to_vec());
    }

    #[test]
    fn unsupported_mode_is_rejected() {
        let rrq = Packet::Rrq {
            filename: "a".to_string(),
            mode: "binary".to_string(),
        };
        assert_eq!(
            rrq.serialize(),
            Err(PacketError::UnsupportedMode("binary".to_string()))
        );
    }

    #[test]
    fn filename_with_nul_is_rejected() {
        let wrq = Packet::Wrq {
            filename: "bad\0name".to_string(),
            mode: "octet".to_string(),
        };
        assert!(matches!(wrq.serialize(), Err(PacketError::InvalidFilename(_))));
    }

    #[test]
    fn ack_round_trips_every_block_number() {
        for block in [0u16, 1, 255, 256, 512, 32768, 65535] {
            let bytes = Packet::Ack(block).serialize().unwrap();
            assert_eq!(bytes.len(), 4);
            assert_eq!(Packet::deserialize(&bytes).unwrap(), Packet::Ack(block));
        }
    }

    #[test]
    fn data_round_trips_payload_sizes() {
        for len in [0usize, 1, 511, 512] {
            let data = vec![0xA5; len];
            let packet = Packet::Data {
                block_num: 7,
                data: data.clone(),
            };
            let bytes = packet.serialize().unwrap();
            assert_eq!(bytes.len(), len + HEADER_LEN);
            assert_eq!(
                Packet::deserialize(&bytes).unwrap(),
                Packet::Data { block_num: 7, data }
            );
        }
    }

    #[test]
    fn oversized_data_is_rejected() {
        let packet = Packet::Data {
            block_num: 1,
            data: vec![0; MAX_DATA_LEN + 1],
        };
        assert_eq!(packet.serialize(), Err(PacketError::PayloadTooLarge(513)));

        let mut raw = vec![0, 3, 0, 1];
        raw.extend_from_slice(&[0; MAX_DATA_LEN + 1]);
        assert_eq!(Packet::deserialize(&raw), Err(PacketError::PayloadTooLarge(513)));
    }

    #[test]
    fn deserialize_error_packet() {
        let packet = Packet::deserialize(b"\x00\x05\x00\x01File not found\x00").unwrap();
        assert_eq!(
            packet,
            Packet::Error {
                code: ErrorCode::FileNotFound,
                msg: "File not found".to_string()
            }
        );
    }

    #[test]
    fn error_message_without_terminator_is_accepted() {
        let packet = Packet::deserialize(b"\x00\x05\x00\x02denied").unwrap();
        assert_eq!(
            packet,
            Packet::Error {
                code: ErrorCode::AccessViolation,
                msg: "denied".to_string()
            }
        );
    }

    #[test]
    fn unknown_error_code_is_preserved() {
        let packet = Packet::deserialize(b"\x00\x05\x01\x43busy\x00").unwrap();
        assert_eq!(
            packet,
            Packet::Error {
                code: ErrorCode::Unknown(0x143),
                msg: "busy".to_string()
            }
        );
    }

    #[test]
    fn short_packets_are_malformed() {
        assert_eq!(
            Packet::deserialize(&[0]),
            Err(PacketError::Truncated {
                needed: 2,
                actual: 1
            })
        );
        for raw in [&[0u8, 3][..], &[0, 4, 0][..], &[0, 5, 0][..]] {
            assert_eq!(
                Packet::deserialize(raw),
                Err(PacketError::Truncated {
                    needed: HEADER_LEN,
                    actual: raw.len()
                })
            );
        }
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert_eq!(Packet::deserialize(&[0, 6, 0, 0]), Err(PacketError::UnknownOpcode(6)));
        assert_eq!(Packet::deserialize(&[1, 3, 0, 0]), Err(PacketError::UnknownOpcode(259)));
    }

    #[test]
    fn deserialize_read_request() {
        let packet = Packet::deserialize(b"\x00\x01boot.img\x00octet\x00").unwrap();
        assert_eq!(
            packet,
            Packet::Rrq {
                filename: "boot.img".to_string(),
                mode: "octet".to_string()
            }
        );
    }

    #[test]
    fn error_code_mapping() {
        for code in 0u16..=7 {
            assert_eq!(ErrorCode::from(code).as_u16(), code);
        }
        assert_eq!(ErrorCode::from(1).default_message(), "File not found");
        assert_eq!(ErrorCode::from(3).to_string(), "Disk full or allocation exceeded (3)");
    }
}
