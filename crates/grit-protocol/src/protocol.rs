//! pkt-line framing with capability negotiation.
//!
//! Each packet is four hex digits of length (counting the header) followed
//! by payload; `0000` flushes a section. The first payload each side sends
//! carries its capability list, separated from the line by NUL (or by a
//! space on the fetch client); the first payload received is split the same
//! way. Four leading bytes that are not hex are handed back verbatim, which
//! is how the reader notices an inlined pack signature.

use std::io::{Read, Write};

use crate::ProtocolError;

pub struct Protocol<R, W> {
    command: String,
    pub input: R,
    pub output: W,
    caps_local: Vec<String>,
    caps_remote: Option<Vec<String>>,
    caps_sent: bool,
}

impl<R: Read, W: Write> Protocol<R, W> {
    pub fn new(command: &str, input: R, output: W, capabilities: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            input,
            output,
            caps_local: capabilities.iter().map(|c| c.to_string()).collect(),
            caps_remote: None,
            caps_sent: false,
        }
    }

    /// Did the peer advertise (and we offer) this capability?
    pub fn capable(&self, ability: &str) -> bool {
        self.caps_remote
            .as_ref()
            .map(|caps| caps.iter().any(|c| c == ability))
            .unwrap_or(false)
    }

    /// Send a payload line, or a flush packet for `None`.
    pub fn send_packet(&mut self, line: Option<&[u8]>) -> Result<(), ProtocolError> {
        let Some(line) = line else {
            self.output.write_all(b"0000")?;
            self.output.flush()?;
            return Ok(());
        };

        let line = self.append_caps(line);
        let size = line.len() + 5;
        write!(self.output, "{size:04x}")?;
        self.output.write_all(&line)?;
        self.output.write_all(b"\n")?;
        self.output.flush()?;
        Ok(())
    }

    /// Receive one payload line. `None` is a flush packet or end of input.
    /// Four non-hex header bytes (a pack signature) come back as the line
    /// itself.
    pub fn recv_packet(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let mut head = [0u8; 4];
        let mut filled = 0;
        while filled < 4 {
            let n = self.input.read(&mut head[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(ProtocolError::InvalidLine(
                    "truncated pkt-line header".into(),
                ));
            }
            filled += n;
        }

        if !head.iter().all(|b| b.is_ascii_hexdigit()) {
            return Ok(Some(head.to_vec()));
        }

        let size = usize::from_str_radix(std::str::from_utf8(&head).unwrap(), 16)
            .map_err(|_| ProtocolError::InvalidLine("bad pkt-line length".into()))?;
        if size == 0 {
            return Ok(None);
        }
        if size < 4 {
            return Err(ProtocolError::InvalidLine(format!(
                "pkt-line length {size} too small"
            )));
        }

        let mut body = vec![0u8; size - 4];
        self.input.read_exact(&mut body)?;
        if body.last() == Some(&b'\n') {
            body.pop();
        }

        Ok(Some(self.detect_caps(body)))
    }

    /// Receive lines until a flush or the given terminator line.
    pub fn recv_until(
        &mut self,
        terminator: Option<&[u8]>,
    ) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let mut lines = Vec::new();
        loop {
            let line = self.recv_packet()?;
            match line {
                None => break,
                Some(line) if Some(line.as_slice()) == terminator => break,
                Some(line) => lines.push(line),
            }
        }
        Ok(lines)
    }

    fn append_caps(&mut self, line: &[u8]) -> Vec<u8> {
        if self.caps_sent {
            return line.to_vec();
        }
        self.caps_sent = true;

        let sep: u8 = if self.command == "fetch" { b' ' } else { b'\0' };

        let mut caps: Vec<&String> = match &self.caps_remote {
            Some(remote) => self
                .caps_local
                .iter()
                .filter(|c| remote.contains(c))
                .collect(),
            None => self.caps_local.iter().collect(),
        };
        caps.sort();

        if caps.is_empty() {
            return line.to_vec();
        }

        let mut out = line.to_vec();
        out.push(sep);
        out.extend_from_slice(
            caps.iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(" ")
                .as_bytes(),
        );
        out
    }

    fn detect_caps(&mut self, line: Vec<u8>) -> Vec<u8> {
        if self.caps_remote.is_some() {
            return line;
        }

        let (sep, n_fields) = if self.command == "upload-pack" {
            (b' ', 3)
        } else {
            (b'\0', 2)
        };

        let mut parts: Vec<&[u8]> = line.splitn(n_fields, |&b| b == sep).collect();

        let caps_text = if parts.len() == n_fields {
            parts.pop().unwrap_or_default()
        } else {
            b""
        };

        self.caps_remote = Some(
            String::from_utf8_lossy(caps_text)
                .split_whitespace()
                .map(String::from)
                .collect(),
        );

        parts.join(&sep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sender(command: &str, caps: &[&str]) -> Protocol<Cursor<Vec<u8>>, Vec<u8>> {
        Protocol::new(command, Cursor::new(Vec::new()), Vec::new(), caps)
    }

    #[test]
    fn framing_roundtrip() {
        let mut sender = sender("push", &[]);
        sender.send_packet(Some(b"hello")).unwrap();
        sender.send_packet(None).unwrap();

        // "hello" + "\n" is 6 bytes + 4 header = 000a
        assert!(sender.output.starts_with(b"000ahello\n"));
        assert!(sender.output.ends_with(b"0000"));

        let wire = sender.output.clone();
        let mut receiver = Protocol::new("receive-pack", Cursor::new(wire), Vec::new(), &[]);
        assert_eq!(receiver.recv_packet().unwrap().unwrap(), b"hello");
        assert_eq!(receiver.recv_packet().unwrap(), None);
    }

    #[test]
    fn first_line_carries_caps_after_nul() {
        let mut sender = sender("receive-pack", &["report-status", "delete-refs"]);
        sender.send_packet(Some(b"cafe refs/heads/master")).unwrap();
        sender.send_packet(Some(b"second line")).unwrap();

        let wire = sender.output.clone();
        let text = String::from_utf8_lossy(&wire);
        assert!(text.contains("cafe refs/heads/master\0delete-refs report-status"));
        // Caps only on the first line.
        assert!(text.contains("second line\n"));
        assert!(!text[text.find("second").unwrap()..].contains('\0'));
    }

    #[test]
    fn receiver_strips_and_records_caps() {
        let mut sender = sender("receive-pack", &["report-status", "ofs-delta"]);
        sender.send_packet(Some(b"cafe refs/heads/master")).unwrap();
        sender.send_packet(None).unwrap();

        let mut receiver =
            Protocol::new("push", Cursor::new(sender.output.clone()), Vec::new(), &[]);
        let line = receiver.recv_packet().unwrap().unwrap();
        assert_eq!(line, b"cafe refs/heads/master");
        assert!(receiver.capable("report-status"));
        assert!(receiver.capable("ofs-delta"));
        assert!(!receiver.capable("no-thin"));
    }

    #[test]
    fn fetch_side_uses_space_separator() {
        let mut sender = sender("fetch", &["ofs-delta"]);
        sender.send_packet(Some(b"want cafebabe")).unwrap();

        let text = String::from_utf8_lossy(&sender.output);
        assert!(text.contains("want cafebabe ofs-delta"));

        // The upload-pack server splits on spaces, three fields.
        let mut server = Protocol::new(
            "upload-pack",
            Cursor::new(sender.output.clone()),
            Vec::new(),
            &["ofs-delta"],
        );
        let line = server.recv_packet().unwrap().unwrap();
        assert_eq!(line, b"want cafebabe");
        assert!(server.capable("ofs-delta"));
    }

    #[test]
    fn non_hex_header_returns_raw_bytes() {
        let mut wire = Vec::new();
        wire.extend_from_slice(b"PACKsome pack data");
        let mut receiver = Protocol::new("fetch", Cursor::new(wire), Vec::new(), &[]);
        // Caps already "negotiated" so detect_caps stays out of the way.
        receiver.caps_remote = Some(Vec::new());

        let line = receiver.recv_packet().unwrap().unwrap();
        assert_eq!(line, b"PACK");
    }

    #[test]
    fn recv_until_terminator() {
        let mut sender = sender("push", &[]);
        sender.send_packet(Some(b"one")).unwrap();
        sender.send_packet(Some(b"done")).unwrap();
        sender.send_packet(Some(b"after")).unwrap();

        let mut receiver = Protocol::new(
            "receive-pack",
            Cursor::new(sender.output.clone()),
            Vec::new(),
            &[],
        );
        receiver.caps_remote = Some(Vec::new());
        let lines = receiver.recv_until(Some(b"done")).unwrap();
        assert_eq!(lines, vec![b"one".to_vec()]);
    }
}
