//! PKCS#7 builder service with inline component assembly.
//! Implements the detached `SignedData` profile used for confirmed messages.
//!
//! The signature is taken as computed directly over the content ("direct
//! signature"): no signed attributes, no unsigned attributes, no digest is
//! recomputed here. One `SignerInfo`, full chain embedded, content detached
//! unless encapsulation is switched on.

use der::Encode;

use crate::{
    domain::{
        confirmation::ConfirmedPayload,
        constants,
        crypto::{AlgorithmIdentifier, CertificateChain, RawSignature},
        der as tlv,
        pkcs7::{
            Pkcs7Certificates, Pkcs7DigestAlgorithms, Pkcs7EncapsulatedContentInfo,
            Pkcs7SignerInfos, SignedMessage, SignerIdentifier,
        },
    },
    services::pem,
    services::signer::{ContentSigner, ExternalSignatureAdapter},
    SigningError, SigningResult,
};

#[derive(Debug, Clone, Default)]
pub struct DetachedSignaturePackager {
    encapsulate_content: bool,
}

impl DetachedSignaturePackager {
    /// Detached-content packager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed the content inside the container instead of leaving it detached.
    #[must_use]
    pub fn with_encapsulated_content(mut self, encapsulate: bool) -> Self {
        self.encapsulate_content = encapsulate;
        self
    }

    #[must_use]
    pub fn encapsulates_content(&self) -> bool {
        self.encapsulate_content
    }

    /// Package a confirmed payload with its externally produced signature.
    pub fn package(
        &self,
        payload: &ConfirmedPayload,
        signature: &RawSignature,
        chain: &CertificateChain,
    ) -> SigningResult<SignedMessage> {
        self.package_bytes(payload.as_bytes(), signature, chain)
    }

    /// Same as [`Self::package`] for content that did not pass through a
    /// confirmation prompt.
    pub fn package_bytes(
        &self,
        content: &[u8],
        signature: &RawSignature,
        chain: &CertificateChain,
    ) -> SigningResult<SignedMessage> {
        let signer = ExternalSignatureAdapter::new(signature.clone()).map_err(|e| match e {
            SigningError::AlgorithmNotFound(msg) => SigningError::PackagingError(msg),
            other => other,
        })?;
        self.package_with_signer(content, &signer, chain)
    }

    /// Assemble `ContentInfo { signedData, [0] SignedData }` around `signer`.
    ///
    /// # Errors
    /// `PackagingError` for an empty chain, an unparsable leaf certificate or
    /// an empty signature.
    pub fn package_with_signer(
        &self,
        content: &[u8],
        signer: &dyn ContentSigner,
        chain: &CertificateChain,
    ) -> SigningResult<SignedMessage> {
        if chain.is_empty() {
            return Err(SigningError::PackagingError(
                "certificate chain is empty; no signer can be identified".to_string(),
            ));
        }
        let algorithm = *signer.algorithm_identifier();
        let signature_bytes = signer.signature(content)?;
        if signature_bytes.is_empty() {
            return Err(SigningError::PackagingError("signature is empty".to_string()));
        }
        let signer_id = Self::signer_identifier(chain)?;

        // version INTEGER (1)
        let mut signed_data_content = tlv::small_integer(constants::CMS_SIGNED_DATA_VERSION);

        // digestAlgorithms
        signed_data_content
            .extend_from_slice(self.build_digest_algorithms_component(&algorithm).as_der());

        // encapContentInfo
        signed_data_content.extend_from_slice(self.build_content_info(content).as_der());

        // certificates [0] IMPLICIT
        signed_data_content.extend_from_slice(self.build_certificates_component(chain).as_der());

        // signerInfos
        signed_data_content.extend_from_slice(
            self.build_signer_infos(&signer_id, &algorithm, &signature_bytes)
                .as_der(),
        );

        let signed_data_seq = tlv::tlv(constants::ASN1_SEQUENCE_TAG, &signed_data_content);

        // Outer ContentInfo: OID signedData + [0] EXPLICIT SignedData
        let pkcs7 = tlv::constructed(
            constants::ASN1_SEQUENCE_TAG,
            &[
                &tlv::oid(constants::PKCS7_SIGNED_DATA_OID),
                &tlv::tlv(constants::ASN1_CONTEXT_0_CONSTRUCTED_TAG, &signed_data_seq),
            ],
        );

        log::debug!(
            "Built signed message: {} bytes, {} certificate(s), {}",
            pkcs7.len(),
            chain.len(),
            algorithm
        );

        Ok(SignedMessage::new(
            pkcs7,
            chain.clone(),
            signer_id,
            algorithm,
            RawSignature::new(algorithm.to_string(), signature_bytes),
            self.encapsulate_content.then(|| content.to_vec()),
        ))
    }

    /// Package and frame as `-----BEGIN PKCS7-----` text.
    pub fn package_pem(
        &self,
        payload: &ConfirmedPayload,
        signature: &RawSignature,
        chain: &CertificateChain,
    ) -> SigningResult<String> {
        let message = self.package(payload, signature, chain)?;
        Ok(pem::encode_pkcs7_pem(message.as_der()))
    }

    /// Build digestAlgorithms (SET of one) component.
    #[must_use]
    pub fn build_digest_algorithms_component(
        &self,
        algorithm: &AlgorithmIdentifier,
    ) -> Pkcs7DigestAlgorithms {
        Pkcs7DigestAlgorithms::from_der(tlv::tlv(
            constants::ASN1_SET_TAG,
            &algorithm.digest_algorithm_der(),
        ))
    }

    /// Build encapContentInfo for id-data, with or without the content.
    #[must_use]
    pub fn build_content_info(&self, content: &[u8]) -> Pkcs7EncapsulatedContentInfo {
        let mut body = tlv::oid(constants::PKCS7_DATA_OID);
        if self.encapsulate_content {
            let octets = tlv::tlv(constants::ASN1_OCTET_STRING_TAG, content);
            body.extend_from_slice(&tlv::tlv(
                constants::ASN1_CONTEXT_0_CONSTRUCTED_TAG,
                &octets,
            ));
        }
        Pkcs7EncapsulatedContentInfo::from_der(tlv::tlv(constants::ASN1_SEQUENCE_TAG, &body))
    }

    /// Build certificates [0] IMPLICIT block, chain order preserved (leaf first).
    #[must_use]
    pub fn build_certificates_component(&self, chain: &CertificateChain) -> Pkcs7Certificates {
        let parts: Vec<&[u8]> = chain.certificates().iter().map(|c| c.as_der()).collect();
        Pkcs7Certificates::from_der(tlv::constructed(
            constants::ASN1_CONTEXT_0_CONSTRUCTED_TAG,
            &parts,
        ))
    }

    /// Build signerInfos (single `SignerInfo`) without any attribute sets.
    #[must_use]
    pub fn build_signer_infos(
        &self,
        signer_id: &SignerIdentifier,
        algorithm: &AlgorithmIdentifier,
        signature: &[u8],
    ) -> Pkcs7SignerInfos {
        let signer_info = tlv::constructed(
            constants::ASN1_SEQUENCE_TAG,
            &[
                &tlv::small_integer(constants::CMS_SIGNER_INFO_VERSION),
                &signer_id.to_der(),
                &algorithm.digest_algorithm_der(),
                &algorithm.signer_info_algorithm_der(),
                &tlv::tlv(constants::ASN1_OCTET_STRING_TAG, signature),
            ],
        );
        Pkcs7SignerInfos::from_der(tlv::tlv(constants::ASN1_SET_TAG, &signer_info))
    }

    /// Issuer + serial of the chain's leaf certificate.
    pub fn signer_identifier(chain: &CertificateChain) -> SigningResult<SignerIdentifier> {
        let leaf = chain.leaf().ok_or_else(|| {
            SigningError::PackagingError("certificate chain is empty".to_string())
        })?;
        let cert = leaf.parse().map_err(|e| {
            SigningError::PackagingError(format!("leaf certificate is not parsable: {e}"))
        })?;
        let issuer_der = cert.tbs_certificate.issuer.to_der().map_err(|e| {
            SigningError::PackagingError(format!("Failed to get issuer DER: {e}"))
        })?;
        let serial_der = cert.tbs_certificate.serial_number.to_der().map_err(|e| {
            SigningError::PackagingError(format!("Failed to get serial number: {e}"))
        })?;
        Ok(SignerIdentifier::new(issuer_der, serial_der))
    }
}
