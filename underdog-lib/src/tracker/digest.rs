use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const DIGEST_LEN: usize = 16;

/// A 128-bit fingerprint, written on the wire as 32 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Digest([u8; DIGEST_LEN]);

#[derive(Debug, Error)]
#[error("invalid digest: {0}")]
pub struct DigestError(#[from] hex::FromHexError);

impl Digest {
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// The trailing 12 bits, i.e. the last three hex characters of the textual form.
    pub fn routing_bits(&self) -> u16 {
        (u16::from(self.0[DIGEST_LEN - 2] & 0x0f) << 8) | u16::from(self.0[DIGEST_LEN - 1])
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}
