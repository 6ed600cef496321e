//! Minimal DER writer and reader.
//!
//! The writer assembles the fixed CMS profile from pre-encoded parts; the
//! reader walks attestation records whose context tags exceed what the
//! `der` crate's tag model covers (tag numbers above 30).

use crate::domain::constants;
use crate::infra::error::{SigningError, SigningResult};

/// Encode a DER length (short form below 128, long form up to 4 bytes).
#[must_use]
pub fn encode_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len <= 0xFF {
        vec![constants::DER_LONG_FORM_1_BYTE, len as u8]
    } else if len <= 0xFFFF {
        vec![
            constants::DER_LONG_FORM_2_BYTE,
            (len >> 8) as u8,
            (len & 0xFF) as u8,
        ]
    } else if len <= 0xFF_FFFF {
        vec![
            constants::DER_LONG_FORM_3_BYTE,
            (len >> 16) as u8,
            ((len >> 8) & 0xFF) as u8,
            (len & 0xFF) as u8,
        ]
    } else {
        vec![
            constants::DER_LONG_FORM_4_BYTE,
            ((len >> 24) & 0xFF) as u8,
            ((len >> 16) & 0xFF) as u8,
            ((len >> 8) & 0xFF) as u8,
            (len & 0xFF) as u8,
        ]
    }
}

/// Wrap `content` in a tag + length header.
#[must_use]
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let len = encode_len(content.len());
    let mut out = Vec::with_capacity(1 + len.len() + content.len());
    out.push(tag);
    out.extend_from_slice(&len);
    out.extend_from_slice(content);
    out
}

/// Concatenate already-encoded parts and wrap them with `tag`.
#[must_use]
pub fn constructed(tag: u8, parts: &[&[u8]]) -> Vec<u8> {
    tlv(tag, &parts.concat())
}

/// Small non-negative INTEGER.
#[must_use]
pub fn small_integer(value: u8) -> Vec<u8> {
    if value & 0x80 != 0 {
        tlv(constants::ASN1_INTEGER_TAG, &[0x00, value])
    } else {
        tlv(constants::ASN1_INTEGER_TAG, &[value])
    }
}

/// OBJECT IDENTIFIER from its content octets.
#[must_use]
pub fn oid(content: &[u8]) -> Vec<u8> {
    tlv(constants::ASN1_OID_TAG, content)
}

/// `AlgorithmIdentifier` SEQUENCE, with NULL parameters or none.
#[must_use]
pub fn algorithm_identifier(oid_content: &[u8], null_params: bool) -> Vec<u8> {
    let mut body = oid(oid_content);
    if null_params {
        body.extend_from_slice(constants::ASN1_NULL);
    }
    tlv(constants::ASN1_SEQUENCE_TAG, &body)
}

/// Render OID content octets in dotted-decimal form.
#[must_use]
pub fn oid_to_dotted(content: &[u8]) -> String {
    let mut arcs: Vec<u64> = Vec::new();
    let mut acc: u64 = 0;
    for (i, byte) in content.iter().enumerate() {
        acc = (acc << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            if arcs.is_empty() {
                let first = if acc < 40 {
                    0
                } else if acc < 80 {
                    1
                } else {
                    2
                };
                arcs.push(first);
                arcs.push(acc - first * 40);
            } else {
                arcs.push(acc);
            }
            acc = 0;
        } else if i == content.len() - 1 {
            // truncated subidentifier; render what we have
            arcs.push(acc);
        }
    }
    arcs.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Tag class bits of the identifier octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

/// One decoded TLV borrowed from the input.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Universal-class tag check.
    #[must_use]
    pub fn is_universal(&self, number: u32) -> bool {
        self.class == TagClass::Universal && self.number == number
    }

    /// Interpret a universal INTEGER or ENUMERATED as an unsigned value.
    pub fn as_u64(&self) -> SigningResult<u64> {
        if self.value.is_empty() || self.value.len() > 9 {
            return Err(SigningError::Asn1Error(format!(
                "integer of {} bytes out of range",
                self.value.len()
            )));
        }
        if self.value[0] & 0x80 != 0 {
            return Err(SigningError::Asn1Error("negative integer".into()));
        }
        Ok(self
            .value
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Iterate the children of a constructed value.
    #[must_use]
    pub fn children(&self) -> DerReader<'a> {
        DerReader::new(self.value)
    }
}

/// Sequential TLV reader over a byte slice.
pub struct DerReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    #[must_use]
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Read the next element.
    pub fn read(&mut self) -> SigningResult<Tlv<'a>> {
        let first = self.next_byte()?;
        let class = match first >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        let constructed = first & 0x20 != 0;
        let mut number = u32::from(first & 0x1f);
        if number == 0x1f {
            number = 0;
            loop {
                let b = self.next_byte()?;
                if number > (u32::MAX >> 7) {
                    return Err(SigningError::Asn1Error("tag number overflow".into()));
                }
                number = (number << 7) | u32::from(b & 0x7f);
                if b & 0x80 == 0 {
                    break;
                }
            }
        }

        let len_byte = self.next_byte()?;
        let len = if len_byte & 0x80 == 0 {
            usize::from(len_byte)
        } else {
            let count = usize::from(len_byte & 0x7f);
            if count == 0 {
                return Err(SigningError::Asn1Error(
                    "indefinite lengths are not DER".into(),
                ));
            }
            if count > 4 {
                return Err(SigningError::Asn1Error(format!(
                    "length of {count} octets not supported"
                )));
            }
            let mut len = 0usize;
            for _ in 0..count {
                len = (len << 8) | usize::from(self.next_byte()?);
            }
            len
        };

        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| {
                SigningError::Asn1Error(format!(
                    "element of {len} bytes overruns input at offset {}",
                    self.pos
                ))
            })?;
        let value = &self.input[self.pos..end];
        self.pos = end;
        Ok(Tlv {
            class,
            constructed,
            number,
            value,
        })
    }

    fn next_byte(&mut self) -> SigningResult<u8> {
        let b = self
            .input
            .get(self.pos)
            .copied()
            .ok_or_else(|| SigningError::Asn1Error("unexpected end of DER input".into()))?;
        self.pos += 1;
        Ok(b)
    }
}
