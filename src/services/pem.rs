//! PEM framing for packaged messages and certificates.

use base64::Engine;

use crate::domain::constants;
use crate::infra::error::{SigningError, SigningResult};

fn frame(header: &str, footer: &str, der: &[u8]) -> String {
    let body = base64::engine::general_purpose::STANDARD.encode(der);
    let mut out = String::with_capacity(body.len() + body.len() / constants::PEM_LINE_WIDTH + 64);
    out.push_str(header);
    out.push('\n');
    let mut rest = body.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(constants::PEM_LINE_WIDTH));
        out.push_str(line);
        out.push('\n');
        rest = tail;
    }
    out.push_str(footer);
    out.push('\n');
    out
}

fn unframe(header: &str, footer: &str, text: &str) -> SigningResult<Vec<u8>> {
    let start = text
        .find(header)
        .ok_or_else(|| SigningError::ValidationError(format!("missing '{header}' line")))?
        + header.len();
    let end = text[start..]
        .find(footer)
        .ok_or_else(|| SigningError::ValidationError(format!("missing '{footer}' line")))?
        + start;
    let body: String = text[start..end]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| SigningError::ValidationError(format!("invalid base64 body: {e}")))
}

/// `-----BEGIN PKCS7-----` text form of a signed message.
#[must_use]
pub fn encode_pkcs7_pem(der: &[u8]) -> String {
    frame(constants::PEM_PKCS7_HEADER, constants::PEM_PKCS7_FOOTER, der)
}

/// Recover the DER from PKCS#7 text; tolerant of line width and trailing blanks.
pub fn decode_pkcs7_pem(text: &str) -> SigningResult<Vec<u8>> {
    unframe(constants::PEM_PKCS7_HEADER, constants::PEM_PKCS7_FOOTER, text)
}

#[must_use]
pub fn encode_certificate_pem(der: &[u8]) -> String {
    frame(
        constants::PEM_CERTIFICATE_HEADER,
        constants::PEM_CERTIFICATE_FOOTER,
        der,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkcs7_framing() {
        let der: Vec<u8> = (0..100u8).collect();
        let pem = encode_pkcs7_pem(&der);
        assert!(pem.starts_with("-----BEGIN PKCS7-----\n"));
        assert!(pem.ends_with("-----END PKCS7-----\n"));
        assert!(pem.lines().all(|l| l.len() <= constants::PEM_LINE_WIDTH));
        assert_eq!(decode_pkcs7_pem(&pem).unwrap(), der);
    }

    #[test]
    fn decode_tolerates_trailing_space_after_footer() {
        let pem = "-----BEGIN PKCS7-----\nAQID\n-----END PKCS7----- \n";
        assert_eq!(decode_pkcs7_pem(pem).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn decode_rejects_missing_delimiters() {
        assert!(decode_pkcs7_pem("AQID").is_err());
        assert!(decode_pkcs7_pem("-----BEGIN PKCS7-----\nAQID\n").is_err());
        assert!(decode_pkcs7_pem("-----BEGIN PKCS7-----\n!!!\n-----END PKCS7-----").is_err());
    }

    #[test]
    fn certificate_framing() {
        let pem = encode_certificate_pem(&[0x30, 0x00]);
        assert_eq!(pem, "-----BEGIN CERTIFICATE-----\nMAA=\n-----END CERTIFICATE-----\n");
    }
}
