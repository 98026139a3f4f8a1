// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Frame encoding and (sans-io) incremental decoding
//!
//! [FrameCodec] encodes [Message]s to transport chunks, [FrameReader]
//! accepts chunks as they arrive from a transport and yields decoded
//! messages (or framing errors) in order.

use std::collections::VecDeque;

use byteorder::{ByteOrder, NetworkEndian};
use encdec::{DecodeOwned, Encode};

use crate::{Message, DEFAULT_MAX_PAYLOAD, HEADER_LEN, HID_PACKET_SIZE, MAGIC};

/// Read size used for stream transports
const STREAM_CHUNK_SIZE: usize = 4096;

/// Transport chunking mode
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Framing {
    /// Fixed-size packets (USB HID), final packet zero-padded
    Packet(usize),
    /// Unpadded byte stream (TCP)
    Stream,
}

impl Framing {
    /// Standard USB HID framing
    pub const HID: Framing = Framing::Packet(HID_PACKET_SIZE);

    /// Buffer size for a single transport read
    pub fn read_size(&self) -> usize {
        match self {
            Framing::Packet(n) => *n,
            Framing::Stream => STREAM_CHUNK_SIZE,
        }
    }
}

/// Framing errors
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum FrameError {
    /// Frame did not start with the magic marker
    #[error("invalid frame magic {0:02x?}")]
    BadMagic([u8; 2]),

    /// Declared payload length exceeds the configured maximum
    #[error("declared payload length {len} exceeds maximum {max}")]
    TooLong { len: usize, max: usize },

    /// Not enough bytes for a frame header
    #[error("frame header too short ({0} bytes)")]
    ShortHeader(usize),

    /// Stream ended before the declared length was received
    #[error("frame truncated (expected {expected} bytes, received {actual})")]
    Truncated { expected: usize, actual: usize },

    /// Packet size cannot hold a frame header
    #[error("packet size {0} cannot hold a frame header")]
    InvalidPacketSize(usize),

    /// Header encoding failed
    #[error("header encoding failed")]
    Encoding,
}

impl From<encdec::Error> for FrameError {
    fn from(_e: encdec::Error) -> Self {
        FrameError::Encoding
    }
}

/// Frame header, see [crate] docs for the encoding
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FrameHeader {
    /// Message type identifier
    pub kind: u16,
    /// Payload length in bytes
    pub len: u32,
}

impl Encode for FrameHeader {
    type Error = FrameError;

    fn encode_len(&self) -> Result<usize, FrameError> {
        Ok(HEADER_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, FrameError> {
        if buff.len() < HEADER_LEN {
            return Err(FrameError::ShortHeader(buff.len()));
        }

        buff[..2].copy_from_slice(&MAGIC);
        NetworkEndian::write_u16(&mut buff[2..4], self.kind);
        NetworkEndian::write_u32(&mut buff[4..8], self.len);

        Ok(HEADER_LEN)
    }
}

impl DecodeOwned for FrameHeader {
    type Output = Self;

    type Error = FrameError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), FrameError> {
        if buff.len() >= 2 && buff[..2] != MAGIC {
            return Err(FrameError::BadMagic([buff[0], buff[1]]));
        }
        if buff.len() < HEADER_LEN {
            return Err(FrameError::ShortHeader(buff.len()));
        }

        let h = Self {
            kind: NetworkEndian::read_u16(&buff[2..4]),
            len: NetworkEndian::read_u32(&buff[4..8]),
        };

        Ok((h, HEADER_LEN))
    }
}

/// Frame codec, configured for a transport's chunking mode
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FrameCodec {
    framing: Framing,
    max_payload: usize,
}

impl FrameCodec {
    /// Create a codec for the provided framing with the default payload limit
    pub const fn new(framing: Framing) -> Self {
        Self {
            framing,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Codec for 64-byte USB HID packets
    pub const fn hid() -> Self {
        Self::new(Framing::HID)
    }

    /// Codec for socket streams
    pub const fn stream() -> Self {
        Self::new(Framing::Stream)
    }

    /// Override the maximum accepted payload length
    pub const fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Encode a message into transport chunks
    ///
    /// Packet framing returns one zero-padded chunk per packet,
    /// stream framing returns a single chunk.
    pub fn encode(&self, m: &Message) -> Result<Vec<Vec<u8>>, FrameError> {
        let len = m.payload.len();
        if len > self.max_payload || len > u32::MAX as usize {
            return Err(FrameError::TooLong {
                len,
                max: self.max_payload,
            });
        }

        let mut b = vec![0u8; HEADER_LEN + len];
        let h = FrameHeader {
            kind: m.kind,
            len: len as u32,
        };
        let n = h.encode(&mut b)?;
        b[n..].copy_from_slice(&m.payload);

        match self.framing {
            Framing::Stream => Ok(vec![b]),
            Framing::Packet(size) if size <= HEADER_LEN => Err(FrameError::InvalidPacketSize(size)),
            Framing::Packet(size) => {
                let packets = b
                    .chunks(size)
                    .map(|c| {
                        let mut p = vec![0u8; size];
                        p[..c.len()].copy_from_slice(c);
                        p
                    })
                    .collect();
                Ok(packets)
            }
        }
    }

    /// Create an incremental reader using this codec's configuration
    pub fn reader(&self) -> FrameReader {
        FrameReader::new(self.framing, self.max_payload)
    }

    /// Decode exactly one message from a sequence of chunks
    ///
    /// This is atomic, either a complete message is returned or an error,
    /// chunks following the end of the first frame are ignored.
    pub fn decode<B: AsRef<[u8]>>(&self, chunks: &[B]) -> Result<Message, FrameError> {
        let mut r = self.reader();

        for c in chunks {
            r.push(c.as_ref());
            if let Some(v) = r.next() {
                return v;
            }
        }

        let (expected, actual) = r.progress();
        Err(FrameError::Truncated { expected, actual })
    }
}

/// Frame with a decoded header awaiting payload bytes
#[derive(Debug)]
struct Partial {
    header: FrameHeader,
    payload: Vec<u8>,
}

/// Incremental frame decoder
///
/// Chunks are pushed as read from the transport, completed messages and
/// framing errors are returned in arrival order via [FrameReader::next].
/// After an error the reader resynchronises on the next candidate frame
/// start: the next packet for packet framing, the next magic marker for
/// stream framing.
#[derive(Debug)]
pub struct FrameReader {
    framing: Framing,
    max_payload: usize,
    buff: Vec<u8>,
    partial: Option<Partial>,
    ready: VecDeque<Result<Message, FrameError>>,
    syncing: bool,
}

impl FrameReader {
    pub fn new(framing: Framing, max_payload: usize) -> Self {
        Self {
            framing,
            max_payload,
            buff: Vec::new(),
            partial: None,
            ready: VecDeque::new(),
            syncing: false,
        }
    }

    /// Push a chunk read from the transport
    pub fn push(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        match self.framing {
            Framing::Packet(_) => self.push_packet(chunk),
            Framing::Stream => {
                self.buff.extend_from_slice(chunk);
                self.process_stream();
            }
        }
    }

    /// Fetch the next decoded message or framing error
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<Message, FrameError>> {
        self.ready.pop_front()
    }

    /// Check whether a frame is partially received
    pub fn in_progress(&self) -> bool {
        self.partial.is_some() || (!self.syncing && !self.buff.is_empty())
    }

    /// Expected and received byte counts for the frame in progress
    fn progress(&self) -> (usize, usize) {
        match &self.partial {
            Some(p) => (p.header.len as usize, p.payload.len()),
            None => (HEADER_LEN, self.buff.len()),
        }
    }

    fn push_packet(&mut self, p: &[u8]) {
        // Continuation packet, padding past the declared length is dropped
        if let Some(partial) = self.partial.as_mut() {
            let need = partial.header.len as usize - partial.payload.len();
            let n = need.min(p.len());
            partial.payload.extend_from_slice(&p[..n]);
            self.complete();
            return;
        }

        // First packet, must carry a frame header
        let (header, n) = match FrameHeader::decode_owned(p) {
            Ok(v) => v,
            Err(e) => {
                log::trace!("discarding packet: {e}");
                self.ready.push_back(Err(e));
                return;
            }
        };

        if !self.start(header) {
            return;
        }

        if let Some(partial) = self.partial.as_mut() {
            let take = (header.len as usize).min(p.len() - n);
            partial.payload.extend_from_slice(&p[n..][..take]);
        }
        self.complete();
    }

    fn process_stream(&mut self) {
        loop {
            if let Some(partial) = self.partial.as_mut() {
                let need = partial.header.len as usize - partial.payload.len();
                let n = need.min(self.buff.len());
                partial.payload.extend(self.buff.drain(..n));

                self.complete();
                if self.partial.is_some() {
                    return;
                }
                continue;
            }

            if self.buff.len() < MAGIC.len() {
                return;
            }

            // Skip to the next magic marker, reporting each lost frame once
            if self.buff[..2] != MAGIC {
                if !self.syncing {
                    self.ready
                        .push_back(Err(FrameError::BadMagic([self.buff[0], self.buff[1]])));
                    self.syncing = true;
                }

                match self.buff[1..].windows(2).position(|w| w == MAGIC) {
                    Some(i) => {
                        self.buff.drain(..i + 1);
                    }
                    None => {
                        let keep = usize::from(self.buff.last() == Some(&MAGIC[0]));
                        let cut = self.buff.len() - keep;
                        self.buff.drain(..cut);
                        return;
                    }
                }
                continue;
            }

            if self.buff.len() < HEADER_LEN {
                return;
            }

            let (header, n) = match FrameHeader::decode_owned(&self.buff) {
                Ok(v) => v,
                Err(e) => {
                    self.ready.push_back(Err(e));
                    self.syncing = true;
                    self.buff.drain(..1);
                    continue;
                }
            };

            if !self.start(header) {
                // Drop the marker so scanning moves past this header
                self.syncing = true;
                self.buff.drain(..MAGIC.len());
                continue;
            }

            self.syncing = false;
            self.buff.drain(..n);
            self.complete();
        }
    }

    /// Begin a frame, rejecting oversized declared lengths
    fn start(&mut self, header: FrameHeader) -> bool {
        let len = header.len as usize;
        if len > self.max_payload {
            self.ready.push_back(Err(FrameError::TooLong {
                len,
                max: self.max_payload,
            }));
            return false;
        }

        self.partial = Some(Partial {
            header,
            payload: Vec::with_capacity(len),
        });

        true
    }

    /// Move a fully received frame to the ready queue
    fn complete(&mut self) {
        let done = matches!(&self.partial, Some(p) if p.payload.len() >= p.header.len as usize);
        if !done {
            return;
        }

        if let Some(p) = self.partial.take() {
            self.ready
                .push_back(Ok(Message::new(p.header.kind, p.payload)));
        }
    }
}
