use bytes::{BufMut, Bytes, BytesMut};

/// Firmware identification command.
pub const FIRMWARE_PROBE: &str = "M115";

/// Object-model query flag suffix: no result depth or array length limit.
pub const OM_QUERY_SUFFIX: &str = "nd99";

/// How an object-model reply is applied to the cached copy of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verbosity {
    /// Full value; replaces the cached key.
    Verbose,
    /// Frequently-changing fields only; merged into the cached key.
    Frequent,
}

impl Verbosity {
    /// Leading flag character sent in `M409 F"..."`.
    pub fn flag(self) -> char {
        match self {
            Verbosity::Verbose => 'v',
            Verbosity::Frequent => 'f',
        }
    }

    /// Complete flag string, e.g. `vnd99`.
    pub fn flags(self) -> String {
        format!("{}{}", self.flag(), OM_QUERY_SUFFIX)
    }

    /// Verbose when `dirty`, frequent otherwise.
    pub fn for_dirty(dirty: bool) -> Self {
        if dirty {
            Verbosity::Verbose
        } else {
            Verbosity::Frequent
        }
    }
}

/// XOR of every character code in `command`.
pub fn checksum(command: &str) -> u32 {
    command.chars().fold(0, |acc, c| acc ^ u32::from(c))
}

/// Encode a command into its wire format.
///
/// Wire format:
/// ```text
/// <command> "*" <decimal checksum> "\r\n"
/// ```
pub fn encode_command(command: &str, dst: &mut BytesMut) {
    let checksum = checksum(command).to_string();
    dst.reserve(command.len() + checksum.len() + 3);
    dst.put_slice(command.as_bytes());
    dst.put_u8(b'*');
    dst.put_slice(checksum.as_bytes());
    dst.put_slice(b"\r\n");
}

/// Frame a command into a fresh buffer.
pub fn frame(command: &str) -> Bytes {
    let mut buf = BytesMut::new();
    encode_command(command, &mut buf);
    buf.freeze()
}

/// Build the object-model query for `key`.
pub fn om_query(key: &str, verbosity: Verbosity) -> String {
    format!("M409 F\"{}\" K\"{}\"", verbosity.flags(), key)
}

/// Strip and verify the checksum of a received command line.
///
/// This is the controller side of [`encode_command`]; `line` must not carry
/// the line terminator. Returns `None` when the checksum is absent or wrong.
pub fn unframe(line: &str) -> Option<&str> {
    let (command, sum) = line.rsplit_once('*')?;
    let sum: u32 = sum.parse().ok()?;
    (checksum(command) == sum).then_some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_probe_frame_is_byte_exact() {
        let expected = u32::from(b'M') ^ u32::from(b'1') ^ u32::from(b'1') ^ u32::from(b'5');
        assert_eq!(checksum("M115"), expected);
        assert_eq!(expected, 120);
        assert_eq!(frame("M115").as_ref(), b"M115*120\r\n");
    }

    #[test]
    fn checksum_is_single_running_xor() {
        assert_eq!(checksum("A"), 65);
        assert_eq!(checksum("AA"), 0);
        assert_eq!(checksum(""), 0);
    }

    #[test]
    fn om_query_text() {
        assert_eq!(
            om_query("state", Verbosity::Verbose),
            r#"M409 F"vnd99" K"state""#
        );
        assert_eq!(
            om_query("seqs", Verbosity::Frequent),
            r#"M409 F"fnd99" K"seqs""#
        );
    }

    #[test]
    fn om_query_frame_carries_its_checksum() {
        let command = om_query("heat", Verbosity::Frequent);
        let framed = frame(&command);
        let text = std::str::from_utf8(&framed).unwrap();

        assert!(text.ends_with("\r\n"));
        assert_eq!(unframe(text.trim_end()), Some(command.as_str()));
    }

    #[test]
    fn encode_appends_to_existing_buffer() {
        let mut buf = BytesMut::from(&b"\n"[..]);
        encode_command("M115", &mut buf);
        assert_eq!(buf.as_ref(), b"\nM115*120\r\n");
    }

    #[test]
    fn unframe_rejects_bad_checksums() {
        assert_eq!(unframe("M115*120"), Some("M115"));
        assert_eq!(unframe("M115*121"), None);
        assert_eq!(unframe("M115"), None);
        assert_eq!(unframe("M115*abc"), None);
    }

    #[test]
    fn verbosity_from_dirty_flag() {
        assert_eq!(Verbosity::for_dirty(true), Verbosity::Verbose);
        assert_eq!(Verbosity::for_dirty(false), Verbosity::Frequent);
        assert_eq!(Verbosity::Verbose.flags(), "vnd99");
        assert_eq!(Verbosity::Frequent.flags(), "fnd99");
    }
}
