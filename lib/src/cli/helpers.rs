// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Hex encoded bytes for command line arguments
#[derive(Clone, PartialEq, Debug, Default)]
pub struct HexData(pub Vec<u8>);

impl std::str::FromStr for HexData {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_start_matches("0x");

        hex::decode(s).map(HexData)
    }
}

impl AsRef<[u8]> for HexData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for HexData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Parse a message type by name or numeric identifier
pub fn parse_kind(s: &str) -> Result<u16, String> {
    if let Ok(t) = s.parse::<hwlink::MessageType>() {
        return Ok(t.id());
    }

    match s.strip_prefix("0x") {
        Some(h) => u16::from_str_radix(h, 16),
        None => s.parse::<u16>(),
    }
    .map_err(|_| format!("unknown message type: {s}"))
}
