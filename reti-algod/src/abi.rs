// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A deliberately small ARC-4 codec: method selectors, argument encoding,
//! and return-value decoding for the type shapes the validator and pool
//! contracts actually use. Nested dynamic types are not supported.

use sha2::{Digest, Sha512_256};

use crate::{address::Address, error::AlgodError};

/// Logs emitted by an ABI method call carry the return value behind this
/// prefix; everything else in the log stream is free-form.
pub const RETURN_PREFIX: [u8; 4] = [0x15, 0x1f, 0x7c, 0x75];

/// An ABI method of a deployed contract, identified by its full signature.
#[derive(Clone, Copy, Debug)]
pub struct AbiMethod {
    pub signature: &'static str,
}

impl AbiMethod {
    pub const fn new(signature: &'static str) -> Self {
        Self { signature }
    }

    pub fn name(&self) -> &str {
        self.signature
            .split_once('(')
            .map(|(name, _)| name)
            .unwrap_or(self.signature)
    }

    /// First four bytes of Sha512/256 over the full signature.
    pub fn selector(&self) -> [u8; 4] {
        let digest = Sha512_256::digest(self.signature.as_bytes());
        [digest[0], digest[1], digest[2], digest[3]]
    }
}

/// Type descriptor used to decode return values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiType {
    Uint(u16),
    Address,
    /// `byte[N]`
    FixedBytes(usize),
    StaticArray(Box<AbiType>, usize),
    DynamicArray(Box<AbiType>),
    Tuple(Vec<AbiType>),
}

impl AbiType {
    /// Encoded size of a value of this type, when that size is fixed.
    fn static_size(&self) -> Result<usize, AlgodError> {
        match self {
            AbiType::Uint(bits) => Ok(usize::from(bits / 8)),
            AbiType::Address => Ok(32),
            AbiType::FixedBytes(len) => Ok(*len),
            AbiType::StaticArray(element, len) => Ok(element.static_size()? * len),
            AbiType::Tuple(elements) => elements.iter().map(AbiType::static_size).sum(),
            AbiType::DynamicArray(_) => Err(AlgodError::Abi(
                "dynamic array has no static size".to_owned(),
            )),
        }
    }
}

/// A decoded (or to-be-encoded) ABI value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiValue {
    Uint(u64),
    Address(Address),
    /// Raw bytes of a static `byte[N]` value, encoded without a length
    /// prefix.
    FixedBytes(Vec<u8>),
    /// A dynamic `string`/`byte[]` value, encoded behind a u16 length.
    Bytes(Vec<u8>),
    Array(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
}

impl AbiValue {
    /// Encodes one method argument. Arguments are passed standalone, so
    /// dynamic values carry their own length prefix and no offset table.
    pub fn encode(&self) -> Result<Vec<u8>, AlgodError> {
        match self {
            AbiValue::Uint(value) => Ok(value.to_be_bytes().to_vec()),
            AbiValue::Address(address) => Ok(address.as_bytes().to_vec()),
            AbiValue::FixedBytes(bytes) => Ok(bytes.clone()),
            AbiValue::Bytes(bytes) => {
                let len = u16::try_from(bytes.len())
                    .map_err(|_| AlgodError::Abi("dynamic value exceeds u16 length".to_owned()))?;
                let mut encoded = len.to_be_bytes().to_vec();
                encoded.extend_from_slice(bytes);
                Ok(encoded)
            }
            AbiValue::Array(_) | AbiValue::Tuple(_) => Err(AlgodError::Abi(
                "composite arguments are not used by this client".to_owned(),
            )),
        }
    }

    pub fn as_uint(&self) -> Result<u64, AlgodError> {
        match self {
            AbiValue::Uint(value) => Ok(*value),
            other => Err(AlgodError::Abi(format!("expected uint, got {other:?}"))),
        }
    }

    pub fn as_address(&self) -> Result<Address, AlgodError> {
        match self {
            AbiValue::Address(address) => Ok(*address),
            other => Err(AlgodError::Abi(format!("expected address, got {other:?}"))),
        }
    }

    pub fn into_elements(self) -> Result<Vec<AbiValue>, AlgodError> {
        match self {
            AbiValue::Array(elements) | AbiValue::Tuple(elements) => Ok(elements),
            other => Err(AlgodError::Abi(format!("expected composite, got {other:?}"))),
        }
    }
}

/// Decodes a complete return value of type `ty` from `bytes`.
pub fn decode(ty: &AbiType, bytes: &[u8]) -> Result<AbiValue, AlgodError> {
    let (value, consumed) = decode_inner(ty, bytes)?;
    if consumed != bytes.len() {
        return Err(AlgodError::Abi(format!(
            "{} trailing bytes after decoding {ty:?}",
            bytes.len() - consumed
        )));
    }
    Ok(value)
}

fn decode_inner(ty: &AbiType, bytes: &[u8]) -> Result<(AbiValue, usize), AlgodError> {
    let short = || AlgodError::Abi(format!("truncated value while decoding {ty:?}"));
    match ty {
        AbiType::Uint(bits) => {
            let width = usize::from(bits / 8);
            let raw = bytes.get(..width).ok_or_else(short)?;
            let mut value = 0u64;
            for byte in raw {
                value = value << 8 | u64::from(*byte);
            }
            Ok((AbiValue::Uint(value), width))
        }
        AbiType::Address => {
            let raw = bytes.get(..32).ok_or_else(short)?;
            Ok((AbiValue::Address(Address::try_from(raw)?), 32))
        }
        AbiType::FixedBytes(len) => {
            let raw = bytes.get(..*len).ok_or_else(short)?;
            Ok((AbiValue::FixedBytes(raw.to_vec()), *len))
        }
        AbiType::StaticArray(element, len) => {
            let mut offset = 0;
            let mut elements = Vec::with_capacity(*len);
            for _ in 0..*len {
                let rest = bytes.get(offset..).ok_or_else(short)?;
                let (value, consumed) = decode_inner(element, rest)?;
                elements.push(value);
                offset += consumed;
            }
            Ok((AbiValue::Array(elements), offset))
        }
        AbiType::DynamicArray(element) => {
            // Only arrays of statically-sized elements appear in the
            // contract surface this client consumes.
            let element_size = element.static_size()?;
            let count_raw = bytes.get(..2).ok_or_else(short)?;
            let count = usize::from(u16::from_be_bytes([count_raw[0], count_raw[1]]));
            let mut offset = 2;
            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                let slice = bytes.get(offset..offset + element_size).ok_or_else(short)?;
                let (value, _) = decode_inner(element, slice)?;
                elements.push(value);
                offset += element_size;
            }
            Ok((AbiValue::Array(elements), offset))
        }
        AbiType::Tuple(fields) => {
            let mut offset = 0;
            let mut elements = Vec::with_capacity(fields.len());
            for field in fields {
                let rest = bytes.get(offset..).ok_or_else(short)?;
                let (value, consumed) = decode_inner(field, rest)?;
                elements.push(value);
                offset += consumed;
            }
            Ok((AbiValue::Tuple(elements), offset))
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn selector_is_first_four_digest_bytes() {
        // Spot-check against the known selector of the canonical ARC-4
        // example method.
        let method = AbiMethod::new("add(uint64,uint64)uint128");
        assert_eq!(method.selector(), [0x8a, 0xa3, 0xb6, 0x1f]);
        assert_eq!(method.name(), "add");
    }

    #[test]
    fn uint_args_encode_big_endian() {
        assert_eq!(
            AbiValue::Uint(0x01_02).encode().unwrap(),
            vec![0, 0, 0, 0, 0, 0, 1, 2]
        );
    }

    #[test]
    fn dynamic_bytes_carry_length_prefix() {
        assert_eq!(
            AbiValue::Bytes(b"abc".to_vec()).encode().unwrap(),
            vec![0, 3, b'a', b'b', b'c']
        );
    }

    #[test]
    fn decodes_dynamic_array_of_static_tuples() {
        // Two (uint64, uint16, uint64) records, the shape of a pool list.
        let ty = AbiType::DynamicArray(Box::new(AbiType::Tuple(vec![
            AbiType::Uint(64),
            AbiType::Uint(16),
            AbiType::Uint(64),
        ])));
        let mut bytes = 2u16.to_be_bytes().to_vec();
        for (a, b, c) in [(10u64, 3u16, 500u64), (11, 0, 0)] {
            bytes.extend_from_slice(&a.to_be_bytes());
            bytes.extend_from_slice(&b.to_be_bytes());
            bytes.extend_from_slice(&c.to_be_bytes());
        }
        let decoded = decode(&ty, &bytes).unwrap().into_elements().unwrap();
        assert_eq!(decoded.len(), 2);
        let first = decoded[0].clone().into_elements().unwrap();
        assert_eq!(first[0].as_uint().unwrap(), 10);
        assert_eq!(first[1].as_uint().unwrap(), 3);
        assert_eq!(first[2].as_uint().unwrap(), 500);
    }

    #[test]
    fn rejects_trailing_bytes() {
        let bytes = [0u8; 9];
        assert_matches!(
            decode(&AbiType::Uint(64), &bytes),
            Err(AlgodError::Abi(_))
        );
    }

    #[test]
    fn rejects_truncated_tuple() {
        let ty = AbiType::Tuple(vec![AbiType::Uint(64), AbiType::Address]);
        assert_matches!(decode(&ty, &[0u8; 12]), Err(AlgodError::Abi(_)));
    }
}
