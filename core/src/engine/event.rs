// Copyright (c) 2022-2023 The MobileCoin Foundation

use strum::{Display, EnumIter, EnumString};

use hwlink_proto::{Message, SYSTEM_KIND_BASE};

/// System (lifecycle) event kinds, produced by transports rather than wire data
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, EnumString, EnumIter)]
#[repr(u8)]
pub enum SystemEvent {
    /// Transport opened
    Connected = 0x00,
    /// Transport closed or device removed
    Disconnected = 0x01,
    /// Transport could not be opened
    ConnectFailed = 0x02,
    /// Device reported an unrecoverable failure
    DeviceFailed = 0x03,
    /// Malformed frame received
    SchemeViolation = 0x04,
    /// Relay rejected a request while the device was busy
    DeviceBusy = 0x05,
}

impl SystemEvent {
    /// Terminal events end a session, no further events follow
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SystemEvent::Disconnected | SystemEvent::ConnectFailed | SystemEvent::DeviceFailed
        )
    }

    /// Encode as a relay control message
    pub fn to_message(&self) -> Message {
        Message::empty(SYSTEM_KIND_BASE + *self as u16)
    }

    /// Decode a relay control message
    pub fn from_message(m: &Message) -> Option<Self> {
        if !m.is_control() {
            return None;
        }

        let e = match m.kind - SYSTEM_KIND_BASE {
            0x00 => SystemEvent::Connected,
            0x01 => SystemEvent::Disconnected,
            0x02 => SystemEvent::ConnectFailed,
            0x03 => SystemEvent::DeviceFailed,
            0x04 => SystemEvent::SchemeViolation,
            0x05 => SystemEvent::DeviceBusy,
            _ => return None,
        };

        Some(e)
    }
}

/// Something that happened on a session, delivered in arrival order
#[derive(Clone, PartialEq, Debug)]
pub enum Event {
    /// Fully decoded protocol message
    Protocol(Message),
    /// Transport lifecycle occurrence
    System(SystemEvent),
}

impl Event {
    /// Map a decoded wire message to an event, relay control frames
    /// become [Event::System]
    pub fn from_wire(m: Message) -> Self {
        match SystemEvent::from_message(&m) {
            Some(s) => Event::System(s),
            None => Event::Protocol(m),
        }
    }

    /// Encode an event for relaying over a socket
    pub fn to_wire(&self) -> Message {
        match self {
            Event::Protocol(m) => m.clone(),
            Event::System(s) => s.to_message(),
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            Event::Protocol(m) => Some(m),
            Event::System(_) => None,
        }
    }

    pub fn system(&self) -> Option<SystemEvent> {
        match self {
            Event::Protocol(_) => None,
            Event::System(s) => Some(*s),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::System(s) if s.is_terminal())
    }
}

impl From<Message> for Event {
    fn from(m: Message) -> Self {
        Event::Protocol(m)
    }
}

impl From<SystemEvent> for Event {
    fn from(s: SystemEvent) -> Self {
        Event::System(s)
    }
}
