//! Method identifiers carried in the first envelope byte.

/// Remote call identifiers.
///
/// Requests and their responses use distinct values so a response can never be
/// mistaken for a request (and vice versa).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    /// Liveness probe request
    Ping = 0x01,
    /// Ephemeral public key request
    ExchangePublicKey = 0x02,
    /// Encrypted application message request
    SendEncryptedMessage = 0x03,

    /// Liveness probe reply
    Pong = 0x81,
    /// Peer's ephemeral public key
    PublicKey = 0x82,
    /// Result code for an encrypted message
    SendResult = 0x83,
    /// Peer-side failure
    Error = 0xFF,
}

impl Method {
    /// Parse a method byte. `None` for unknown values.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Ping),
            0x02 => Some(Self::ExchangePublicKey),
            0x03 => Some(Self::SendEncryptedMessage),
            0x81 => Some(Self::Pong),
            0x82 => Some(Self::PublicKey),
            0x83 => Some(Self::SendResult),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }

    /// Raw method byte.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether this method identifies a client-to-peer request.
    #[must_use]
    pub const fn is_request(self) -> bool {
        (self as u8) & 0x80 == 0
    }
}
