// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Payload summaries for the messages inspected by the host
//!
//! These mirror the device protobuf definitions for the fields used here,
//! unknown fields are skipped on decode so newer firmware stays compatible.

use strum::{Display, EnumIter};

/// Reset device state / request [Features]
#[derive(Clone, PartialEq, prost::Message)]
pub struct Initialize {}

/// Request [Features] without resetting session state
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetFeatures {}

/// Liveness test, echoed back in a [Success] message
#[derive(Clone, PartialEq, prost::Message)]
pub struct Ping {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub button_protection: Option<bool>,
}

/// Generic success response
#[derive(Clone, PartialEq, prost::Message)]
pub struct Success {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
}

/// Generic failure response
#[derive(Clone, PartialEq, prost::Message)]
pub struct Failure {
    #[prost(uint32, optional, tag = "1")]
    pub code: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
}

/// Device feature report
#[derive(Clone, PartialEq, prost::Message)]
pub struct Features {
    #[prost(string, optional, tag = "1")]
    pub vendor: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub major_version: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub minor_version: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub patch_version: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub bootloader_mode: Option<bool>,
    #[prost(string, optional, tag = "6")]
    pub device_id: Option<String>,
    #[prost(bool, optional, tag = "7")]
    pub pin_protection: Option<bool>,
    #[prost(bool, optional, tag = "8")]
    pub passphrase_protection: Option<bool>,
    #[prost(string, optional, tag = "10")]
    pub label: Option<String>,
    #[prost(bool, optional, tag = "12")]
    pub initialized: Option<bool>,
}

impl Features {
    /// Firmware version as a display string
    pub fn version(&self) -> String {
        format!(
            "{}.{}.{}",
            self.major_version.unwrap_or_default(),
            self.minor_version.unwrap_or_default(),
            self.patch_version.unwrap_or_default()
        )
    }
}

/// Device is waiting for physical confirmation
#[derive(Clone, PartialEq, prost::Message)]
pub struct ButtonRequest {
    #[prost(uint32, optional, tag = "1")]
    pub code: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub data: Option<String>,
}

impl ButtonRequest {
    /// Resolve the request code against the known set
    pub fn kind(&self) -> Option<ButtonRequestType> {
        let c = u8::try_from(self.code?).ok()?;
        ButtonRequestType::try_from(c).ok()
    }
}

/// Acknowledge a [ButtonRequest]
#[derive(Clone, PartialEq, prost::Message)]
pub struct ButtonAck {}

/// Abort the current operation
#[derive(Clone, PartialEq, prost::Message)]
pub struct Cancel {}

/// Transaction signing progress request
#[derive(Clone, PartialEq, prost::Message)]
pub struct TxRequest {
    #[prost(uint32, optional, tag = "1")]
    pub request_type: Option<u32>,
}

impl TxRequest {
    /// Signing completed, no further data requested
    pub fn is_finished(&self) -> bool {
        self.request_type == Some(TxRequestType::Finished as u32)
    }
}

/// [ButtonRequest] codes
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum ButtonRequestType {
    Other = 1,
    FeeOverThreshold = 2,
    ConfirmOutput = 3,
    ResetDevice = 4,
    ConfirmWord = 5,
    WipeDevice = 6,
    ProtectCall = 7,
    SignTx = 8,
    FirmwareCheck = 9,
    Address = 10,
}

/// [TxRequest] request types
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter)]
#[repr(u32)]
pub enum TxRequestType {
    Input = 0,
    Output = 1,
    Meta = 2,
    Finished = 3,
}
