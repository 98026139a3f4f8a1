// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::MessageType;

/// Base of the reserved identifier range used for relay control frames
pub const SYSTEM_KIND_BASE: u16 = 0xFF00;

/// A typed protocol message with an opaque payload
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    /// Wire message type identifier
    pub kind: u16,
    /// Encoded payload (protobuf for real devices, opaque to the framing)
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message with the provided type and payload
    pub fn new(kind: impl Into<u16>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Create a message with an empty payload
    pub fn empty(kind: impl Into<u16>) -> Self {
        Self::new(kind, Vec::new())
    }

    /// Build a message by encoding a protobuf payload
    pub fn encode_proto<M: prost::Message>(kind: MessageType, m: &M) -> Self {
        Self::new(kind, m.encode_to_vec())
    }

    /// Decode the payload as a protobuf message
    pub fn decode_proto<M: prost::Message + Default>(&self) -> Result<M, prost::DecodeError> {
        M::decode(self.payload.as_slice())
    }

    /// Resolve the message type against the known catalog
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::try_from(self.kind).ok()
    }

    /// Check whether this message has the provided type
    pub fn is(&self, kind: MessageType) -> bool {
        self.kind == kind.id()
    }

    /// Check whether this message lives in the relay control range
    pub fn is_control(&self) -> bool {
        self.kind >= SYSTEM_KIND_BASE
    }
}

impl core::fmt::Debug for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.message_type() {
            Some(t) => write!(f, "Message({t}, ")?,
            None => write!(f, "Message(0x{:04x}, ", self.kind)?,
        }
        write!(f, "{} bytes)", self.payload.len())
    }
}
