//! Payload header and body encodings.
//!
//! ```text
//! [ magic: 4 bytes ][ version: u8 ][ encoding: u8 ][ body ... ]
//! ```
//!
//! The body is the generation's wire struct encoded with serde, as bincode
//! by default or as RON (a readable dump, `serialize-ron` feature).

use bytes::{BufMut, Bytes, BytesMut};

use super::FormatVersion;
use crate::error::{DeserializeError, SerializeError};

/// First bytes of every prefab payload.
pub const MAGIC: [u8; 4] = *b"TSPF";

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Serde encoding of the payload body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Bincode, compact binary.
    #[default]
    Bincode,
    /// RON (Rusty Object Notation), human-readable text.
    #[cfg(feature = "serialize-ron")]
    Ron,
}

impl Encoding {
    fn to_u8(self) -> u8 {
        match self {
            Self::Bincode => 0,
            #[cfg(feature = "serialize-ron")]
            Self::Ron => 1,
        }
    }

    fn from_u8(v: u8) -> Result<Self, DeserializeError> {
        match v {
            0 => Ok(Self::Bincode),
            #[cfg(feature = "serialize-ron")]
            1 => Ok(Self::Ron),
            other => Err(DeserializeError::UnsupportedEncoding(other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub version: FormatVersion,
    pub encoding: Encoding,
}

/// Writes the header followed by `body` in `encoding`.
pub(crate) fn write_payload<T: serde::Serialize>(
    version: FormatVersion,
    encoding: Encoding,
    body: &T,
) -> Result<Bytes, SerializeError> {
    let encoded = encode(body, encoding)?;
    let mut out = BytesMut::with_capacity(HEADER_LEN + encoded.len());
    out.put_slice(&MAGIC);
    out.put_u8(version as u8);
    out.put_u8(encoding.to_u8());
    out.put_slice(&encoded);
    Ok(out.freeze())
}

/// Splits `payload` into its header and body.
pub(crate) fn read_header(payload: &[u8]) -> Result<(Header, &[u8]), DeserializeError> {
    if payload.is_empty() {
        return Err(DeserializeError::EmptyPayload);
    }
    if payload.len() < HEADER_LEN {
        return Err(DeserializeError::Decode(format!(
            "payload of {} bytes is shorter than its header",
            payload.len()
        )));
    }
    let (header, body) = payload.split_at(HEADER_LEN);
    if header[..MAGIC.len()] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }
    let raw_version = header[MAGIC.len()];
    let version =
        FormatVersion::from_u8(raw_version).ok_or(DeserializeError::UnsupportedVersion(raw_version))?;
    let encoding = Encoding::from_u8(header[MAGIC.len() + 1])?;
    Ok((Header { version, encoding }, body))
}

/// Encode a serde-serializable body in the given encoding.
pub(crate) fn encode<T: serde::Serialize>(
    value: &T,
    encoding: Encoding,
) -> Result<Vec<u8>, SerializeError> {
    match encoding {
        Encoding::Bincode => {
            bincode::serialize(value).map_err(|e| SerializeError::Format(e.to_string()))
        }
        #[cfg(feature = "serialize-ron")]
        Encoding::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
            .map(String::into_bytes)
            .map_err(|e| SerializeError::Format(e.to_string())),
    }
}

/// Decode a body in the given encoding.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
    encoding: Encoding,
) -> Result<T, DeserializeError> {
    match encoding {
        Encoding::Bincode => {
            bincode::deserialize(bytes).map_err(|e| DeserializeError::Decode(e.to_string()))
        }
        #[cfg(feature = "serialize-ron")]
        Encoding::Ron => {
            let s = std::str::from_utf8(bytes).map_err(|e| DeserializeError::Decode(e.to_string()))?;
            ron::from_str(s).map_err(|e| DeserializeError::Decode(e.to_string()))
        }
    }
}
