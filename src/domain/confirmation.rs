//! Confirmation prompt data: nonce, presented prompt and the confirmed
//! payload that is the only input ever handed to a signer.
//!
//! A trusted display returns the data it confirmed either as the raw
//! extra-data bytes or as a CBOR map `{"prompt": text, "extra": bytes}`.

use std::fmt;

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};

use crate::infra::error::{SigningError, SigningResult};

/// Per-cycle random value bound into what gets signed (UUID v4 text form).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an externally chosen value (tests, replay of a known cycle).
    #[must_use]
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.0)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text shown on the trusted display plus the nonce sent as extra data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedPrompt {
    text: String,
    nonce: Nonce,
}

impl PresentedPrompt {
    #[must_use]
    pub fn new(text: impl Into<String>, nonce: Nonce) -> Self {
        Self {
            text: text.into(),
            nonce,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Bytes passed to the display as extra data.
    #[must_use]
    pub fn extra_data(&self) -> &[u8] {
        self.nonce.as_bytes()
    }

    /// Check what the display reports as confirmed against this prompt.
    ///
    /// Raw form: the bytes must equal the nonce. CBOR form: `extra` must equal
    /// the nonce and `prompt` the displayed text.
    ///
    /// # Errors
    /// `PayloadMismatch` for any other content.
    pub fn accept(&self, confirmed: Vec<u8>) -> SigningResult<ConfirmedPayload> {
        let form = if confirmed.as_slice() == self.extra_data() {
            ConfirmedDataForm::RawExtraData
        } else {
            let record = decode_confirmed_record(&confirmed).ok_or_else(|| {
                SigningError::PayloadMismatch(format!(
                    "confirmed data ({} bytes) is neither the nonce nor a prompt record",
                    confirmed.len()
                ))
            })?;
            if record.extra != self.extra_data() {
                return Err(SigningError::PayloadMismatch(
                    "confirmed extra data does not match the nonce".to_string(),
                ));
            }
            if record.prompt != self.text {
                return Err(SigningError::PayloadMismatch(
                    "confirmed prompt text differs from the displayed text".to_string(),
                ));
            }
            ConfirmedDataForm::PromptRecord
        };
        Ok(ConfirmedPayload {
            text: self.text.clone(),
            nonce: self.nonce.clone(),
            bytes: confirmed,
            form,
        })
    }
}

/// Shape of the data the display returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmedDataForm {
    RawExtraData,
    PromptRecord,
}

/// Authentic confirmed bytes for one cycle.
///
/// Not `Clone`. Only [`PresentedPrompt::accept`] creates one, and the
/// protocol keeps it local to the cycle that presented the prompt.
#[derive(PartialEq, Eq)]
pub struct ConfirmedPayload {
    text: String,
    nonce: Nonce,
    bytes: Vec<u8>,
    form: ConfirmedDataForm,
}

impl ConfirmedPayload {
    /// Exact bytes the display confirmed; these are what gets signed.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    #[must_use]
    pub fn form(&self) -> ConfirmedDataForm {
        self.form
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Debug for ConfirmedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmedPayload")
            .field("nonce", &self.nonce)
            .field("len", &self.bytes.len())
            .field("form", &self.form)
            .finish()
    }
}

/// Decoded `{"prompt", "extra"}` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedRecord {
    pub prompt: String,
    pub extra: Vec<u8>,
}

/// Decode a CBOR prompt record; `None` if the bytes are not one.
#[must_use]
pub fn decode_confirmed_record(bytes: &[u8]) -> Option<ConfirmedRecord> {
    let mut dec = Decoder::new(bytes);
    let len = dec.map().ok()??;
    let mut prompt = None;
    let mut extra = None;
    for _ in 0..len {
        if dec.datatype().ok()? != Type::String {
            dec.skip().ok()?;
            dec.skip().ok()?;
            continue;
        }
        match dec.str().ok()? {
            "prompt" => prompt = Some(dec.str().ok()?.to_string()),
            "extra" => extra = Some(dec.bytes().ok()?.to_vec()),
            _ => dec.skip().ok()?,
        }
    }
    if dec.position() != bytes.len() {
        return None;
    }
    Some(ConfirmedRecord {
        prompt: prompt?,
        extra: extra?,
    })
}

/// Encode a prompt record the way trusted displays report confirmed data.
///
/// # Errors
/// `Asn1Error` if CBOR encoding fails.
pub fn encode_confirmed_record(prompt: &str, extra: &[u8]) -> SigningResult<Vec<u8>> {
    let mut enc = Encoder::new(Vec::new());
    enc.map(2)
        .and_then(|e| e.str("prompt"))
        .and_then(|e| e.str(prompt))
        .and_then(|e| e.str("extra"))
        .and_then(|e| e.bytes(extra))
        .map_err(|e| SigningError::Asn1Error(format!("CBOR encoding failed: {e}")))?;
    Ok(enc.into_writer())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> PresentedPrompt {
        PresentedPrompt::new(
            "vote=yes",
            Nonce::from_string("3465ef23-328b-4beb-93da-43240370346f"),
        )
    }

    #[test]
    fn generated_nonces_are_uuid_text() {
        let a = Nonce::generate();
        let b = Nonce::generate();
        assert_eq!(a.as_bytes().len(), 36);
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn raw_nonce_is_accepted() {
        let p = prompt();
        let payload = p.accept(p.extra_data().to_vec()).unwrap();
        assert_eq!(payload.as_bytes(), p.nonce().as_bytes());
        assert_eq!(payload.form(), ConfirmedDataForm::RawExtraData);
        assert_eq!(payload.text(), "vote=yes");
    }

    #[test]
    fn cbor_record_is_accepted_and_kept_verbatim() {
        let p = prompt();
        let blob = encode_confirmed_record("vote=yes", p.extra_data()).unwrap();
        let payload = p.accept(blob.clone()).unwrap();
        assert_eq!(payload.form(), ConfirmedDataForm::PromptRecord);
        assert_eq!(payload.as_bytes(), blob.as_slice());
    }

    #[test]
    fn mismatches_are_rejected() {
        let p = prompt();
        assert!(matches!(
            p.accept(b"some-other-nonce".to_vec()),
            Err(SigningError::PayloadMismatch(_))
        ));
        let wrong_text = encode_confirmed_record("vote=no", p.extra_data()).unwrap();
        assert!(matches!(
            p.accept(wrong_text),
            Err(SigningError::PayloadMismatch(_))
        ));
        let wrong_extra = encode_confirmed_record("vote=yes", b"stale").unwrap();
        assert!(matches!(
            p.accept(wrong_extra),
            Err(SigningError::PayloadMismatch(_))
        ));
    }

    #[test]
    fn record_decoder_rejects_garbage() {
        assert!(decode_confirmed_record(b"").is_none());
        assert!(decode_confirmed_record(&[0xa1, 0x01, 0x02]).is_none());
        let mut blob = encode_confirmed_record("x", b"y").unwrap();
        blob.push(0x00);
        assert!(decode_confirmed_record(&blob).is_none());
    }
}
