use super::packet::PacketError;

/// Byte-level helpers shared by the packet codec.
pub struct Convert;

impl Convert {
    /// Read a big-endian `u16` from the first two bytes of `buf`.
    pub fn to_u16(buf: &[u8]) -> Result<u16, PacketError> {
        match buf {
            [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(PacketError::Truncated {
                needed: 2,
                actual: buf.len(),
            }),
        }
    }

    /// Split a NUL-terminated string off the front of `buf`.
    ///
    /// Returns the decoded text and the number of bytes consumed, including
    /// the terminator. Invalid UTF-8 is replaced rather than rejected.
    pub fn to_string(buf: &[u8]) -> Result<(String, usize), PacketError> {
        let end = buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(PacketError::MissingTerminator)?;
        let text = String::from_utf8_lossy(&buf[..end]).into_owned();
        Ok((text, end + 1))
    }
}
