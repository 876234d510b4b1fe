use super::{FrameError, HEADER_LEN, MsgType, PROTO_VERSION, ProtoError};
use std::io::{self, Read, Write};

/// Write a single frame: [ver][type][reserved u16=0][len u32][body...]
pub fn write_frame<W: Write>(w: &mut W, msg_type: MsgType, body: &[u8]) -> io::Result<()> {
    if body.len() > u32::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "body too large",
        ));
    }
    let len = body.len() as u32;
    let mut header = [0u8; HEADER_LEN];
    header[0] = PROTO_VERSION;
    header[1] = msg_type.as_u8();
    header[2] = 0;
    header[3] = 0;
    header[4..8].copy_from_slice(&len.to_be_bytes());
    w.write_all(&header)?;
    w.write_all(body)?;
    w.flush()?;
    Ok(())
}

/// Validate a frame header and return (type, body length).
fn parse_header(header: &[u8], max_body: usize) -> Result<(MsgType, usize), ProtoError> {
    if header.len() < HEADER_LEN {
        return Err(ProtoError::InvalidFormat("short header"));
    }
    if header[0] != PROTO_VERSION {
        return Err(ProtoError::InvalidFormat("bad proto version"));
    }
    let msg_type = MsgType::from_u8(header[1])?;

    // flags ignored for now
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > max_body {
        return Err(ProtoError::TooLarge);
    }
    Ok((msg_type, len))
}

/// Read a single frame, enforcing a max body length.
pub fn read_frame<R: Read>(r: &mut R, max_body: usize) -> Result<(MsgType, Vec<u8>), FrameError> {
    let mut header = [0u8; HEADER_LEN];

    r.read_exact(&mut header)?; // io::Error -> FrameError::Io

    let (msg_type, len) = parse_header(&header, max_body)?;

    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?; // io::Error -> FrameError::Io

    Ok((msg_type, body))
}

/// Incremental frame reassembly for streams polled with a read timeout.
///
/// Bytes are appended as they arrive; complete frames are taken out in
/// order. A timeout in the middle of a frame never loses data.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    max_body: usize,
}

impl FrameBuffer {
    pub fn new(max_body: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_body,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete frame, if one is buffered.
    pub fn try_take(&mut self) -> Result<Option<(MsgType, Vec<u8>)>, ProtoError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let (msg_type, len) = parse_header(&self.buf[..HEADER_LEN], self.max_body)?;
        let total = HEADER_LEN + len;
        if self.buf.len() < total {
            return Ok(None);
        }
        let body = self.buf[HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some((msg_type, body)))
    }
}
