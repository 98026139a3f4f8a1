// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol definitions for Trezor / KeepKey class hardware wallets
//!
//! This crate provides the message catalog, the length-framed wire encoding
//! used over USB HID and TCP sockets, and a small set of payload summaries
//! for the messages the host state machine needs to inspect.
//!
//! ## Frame encoding
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    MAGIC (0x23)   |   MAGIC (0x23)  |     MESSAGE_TYPE (BE)   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      PAYLOAD_LENGTH (BE)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                           PAYLOAD...                          /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Over USB HID the concatenated header and payload are split into fixed
//! size packets with the final packet zero-padded. Over sockets the same
//! bytes are streamed without padding.

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};

mod message;
pub use message::{Message, SYSTEM_KIND_BASE};

pub mod frame;
pub use frame::{FrameCodec, FrameError, FrameHeader, FrameReader, Framing};

pub mod messages;

/// Frame header magic marker
pub const MAGIC: [u8; 2] = [0x23, 0x23];

/// Encoded frame header length (magic + type + length)
pub const HEADER_LEN: usize = 8;

/// Fixed USB HID packet size
pub const HID_PACKET_SIZE: usize = 64;

/// Default maximum accepted payload length
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Well-known message type identifiers
///
/// Identifiers are shared across all transports, messages with types
/// outside this catalog are still valid and relayed as-is.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Display, EnumString, EnumIter, TryFromPrimitive,
)]
#[repr(u16)]
pub enum MessageType {
    Initialize = 0,
    Ping = 1,
    Success = 2,
    Failure = 3,
    ChangePin = 4,
    WipeDevice = 5,
    FirmwareErase = 6,
    FirmwareUpload = 7,
    GetEntropy = 9,
    Entropy = 10,
    GetPublicKey = 11,
    PublicKey = 12,
    LoadDevice = 13,
    ResetDevice = 14,
    SignTx = 15,
    Features = 17,
    PinMatrixRequest = 18,
    PinMatrixAck = 19,
    Cancel = 20,
    TxRequest = 21,
    TxAck = 22,
    CipherKeyValue = 23,
    ClearSession = 24,
    ApplySettings = 25,
    ButtonRequest = 26,
    ButtonAck = 27,
    GetAddress = 29,
    Address = 30,
    EntropyRequest = 35,
    EntropyAck = 36,
    SignMessage = 38,
    VerifyMessage = 39,
    MessageSignature = 40,
    PassphraseRequest = 41,
    PassphraseAck = 42,
    RecoveryDevice = 45,
    WordRequest = 46,
    WordAck = 47,
    CipheredKeyValue = 48,
    SignIdentity = 53,
    SignedIdentity = 54,
    GetFeatures = 55,
}

impl MessageType {
    /// Fetch the wire identifier for a message type
    pub const fn id(&self) -> u16 {
        *self as u16
    }
}

impl From<MessageType> for u16 {
    fn from(t: MessageType) -> Self {
        t as u16
    }
}
