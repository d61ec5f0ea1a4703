// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, str::FromStr};

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512_256};

use crate::error::AlgodError;

const CHECKSUM_LEN: usize = 4;
const APP_ID_PREFIX: &[u8] = b"appID";

/// The all-zero sentinel address. A staker-ledger slot holding this value
/// is empty.
pub const ZERO_ADDRESS: Address = Address([0u8; 32]);

/// An Algorand account address: a 32-byte ed25519 public key, rendered as
/// base32 text with a 4-byte Sha512/256 checksum suffix.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The escrow address of an application: Sha512/256 over
    /// `"appID" || big-endian-u64(app_id)`.
    pub fn for_application(app_id: u64) -> Self {
        let mut hasher = Sha512_256::new();
        hasher.update(APP_ID_PREFIX);
        hasher.update(app_id.to_be_bytes());
        Address(hasher.finalize().into())
    }

    fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let digest = Sha512_256::digest(self.0);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&digest[32 - CHECKSUM_LEN..]);
        checksum
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut data = [0u8; 32 + CHECKSUM_LEN];
        data[..32].copy_from_slice(&self.0);
        data[32..].copy_from_slice(&self.checksum());
        f.write_str(&BASE32_NOPAD.encode(&data))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Address {
    type Err = AlgodError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let decoded = BASE32_NOPAD
            .decode(text.as_bytes())
            .map_err(|_| AlgodError::InvalidAddress(text.to_owned()))?;
        if decoded.len() != 32 + CHECKSUM_LEN {
            return Err(AlgodError::InvalidAddress(text.to_owned()));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&decoded[..32]);
        let address = Address(key);
        if decoded[32..] != address.checksum() {
            return Err(AlgodError::InvalidAddress(text.to_owned()));
        }
        Ok(address)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = AlgodError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AlgodError::InvalidAddress(format!("{} raw bytes", bytes.len())))?;
        Ok(Address(key))
    }
}

// Addresses travel as raw 32-byte strings in transactions, so the serde
// form is bytes, not text.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
        Address::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn round_trips_through_text() {
        let address = Address([7u8; 32]);
        let text = address.to_string();
        assert_eq!(text.len(), 58);
        assert_eq!(text.parse::<Address>().unwrap(), address);
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut text = Address([7u8; 32]).to_string();
        let last = text.pop().unwrap();
        text.push(if last == 'A' { 'B' } else { 'A' });
        assert_matches!(text.parse::<Address>(), Err(AlgodError::InvalidAddress(_)));
    }

    #[test]
    fn zero_address_is_its_own_text_round_trip() {
        let text = ZERO_ADDRESS.to_string();
        assert_eq!(text.parse::<Address>().unwrap(), ZERO_ADDRESS);
    }

    #[test]
    fn application_addresses_are_stable() {
        // Distinct app ids must map to distinct escrows, deterministically.
        let first = Address::for_application(1);
        assert_eq!(first, Address::for_application(1));
        assert_ne!(first, Address::for_application(2));
    }
}
