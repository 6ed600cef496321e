//! Centralized constants for commonly repeated DER/OID bytes and tags.
//! Keep this intentionally small; only broadly reused literals should live here.

// === ASN.1 DER Constants ===

/// ASN.1 NULL value (tag + length + null)
pub const ASN1_NULL: &[u8] = &[0x05, 0x00];

/// ASN.1 BOOLEAN tag
pub const ASN1_BOOLEAN_TAG: u8 = 0x01;

/// ASN.1 INTEGER tag
pub const ASN1_INTEGER_TAG: u8 = 0x02;

/// ASN.1 OCTET STRING tag
pub const ASN1_OCTET_STRING_TAG: u8 = 0x04;

/// ASN.1 NULL tag
pub const ASN1_NULL_TAG: u8 = 0x05;

/// ASN.1 OBJECT IDENTIFIER tag
pub const ASN1_OID_TAG: u8 = 0x06;

/// ASN.1 ENUMERATED tag
pub const ASN1_ENUMERATED_TAG: u8 = 0x0a;

/// ASN.1 SEQUENCE tag
pub const ASN1_SEQUENCE_TAG: u8 = 0x30;

/// ASN.1 SET tag
pub const ASN1_SET_TAG: u8 = 0x31;

/// ASN.1 context-specific constructed tag [0]
pub const ASN1_CONTEXT_0_CONSTRUCTED_TAG: u8 = 0xa0;

/// DER long form length encoding: 1-byte length follows
pub const DER_LONG_FORM_1_BYTE: u8 = 0x81;

/// DER long form length encoding: 2-byte length follows
pub const DER_LONG_FORM_2_BYTE: u8 = 0x82;

/// DER long form length encoding: 3-byte length follows
pub const DER_LONG_FORM_3_BYTE: u8 = 0x83;

/// DER long form length encoding: 4-byte length follows
pub const DER_LONG_FORM_4_BYTE: u8 = 0x84;

// === CMS / PKCS#7 ===

/// `SignedData` version for issuerAndSerialNumber signers, id-data content and no attribute certs
pub const CMS_SIGNED_DATA_VERSION: u8 = 1;

/// `SignerInfo` version when the signer is identified by issuer and serial number
pub const CMS_SIGNER_INFO_VERSION: u8 = 1;

/// PKCS#7 `SignedData` OID (1.2.840.113549.1.7.2)
pub const PKCS7_SIGNED_DATA_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];

/// PKCS#7 data OID (1.2.840.113549.1.7.1)
pub const PKCS7_DATA_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01];

// === Digest Algorithm OIDs ===

/// SHA-1 algorithm OID (1.3.14.3.2.26)
pub const SHA1_ALGORITHM_OID: &[u8] = &[0x2b, 0x0e, 0x03, 0x02, 0x1a];

/// SHA-256 algorithm OID (2.16.840.1.101.3.4.2.1)
pub const SHA256_ALGORITHM_OID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

// === Signature Algorithm OIDs ===

/// ecdsa-with-SHA256 (1.2.840.10045.4.3.2)
pub const ECDSA_WITH_SHA256_OID: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];

/// sha256WithRSAEncryption (1.2.840.113549.1.1.11)
pub const SHA256_WITH_RSA_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b];

/// sha1WithRSAEncryption (1.2.840.113549.1.1.5)
pub const SHA1_WITH_RSA_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x05];

/// rsaEncryption (1.2.840.113549.1.1.1)
pub const RSA_ENCRYPTION_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

// === Android key attestation ===

/// Key attestation extension OID (1.3.6.1.4.1.11129.2.1.17) in dotted form
pub const KEY_ATTESTATION_EXTENSION_OID: &str = "1.3.6.1.4.1.11129.2.1.17";

/// `AuthorizationList` tag: purpose
pub const KM_TAG_PURPOSE: u32 = 1;

/// `AuthorizationList` tag: algorithm
pub const KM_TAG_ALGORITHM: u32 = 2;

/// `AuthorizationList` tag: key size
pub const KM_TAG_KEY_SIZE: u32 = 3;

/// `AuthorizationList` tag: EC curve
pub const KM_TAG_EC_CURVE: u32 = 10;

/// `AuthorizationList` tag: noAuthRequired
pub const KM_TAG_NO_AUTH_REQUIRED: u32 = 503;

/// `AuthorizationList` tag: userAuthType
pub const KM_TAG_USER_AUTH_TYPE: u32 = 504;

/// `AuthorizationList` tag: trustedConfirmationRequired
pub const KM_TAG_TRUSTED_CONFIRMATION_REQUIRED: u32 = 508;

/// `AuthorizationList` tag: unlockedDeviceRequired
pub const KM_TAG_UNLOCKED_DEVICE_REQUIRED: u32 = 509;

// === PEM ===

/// Header line of the PKCS#7 text form
pub const PEM_PKCS7_HEADER: &str = "-----BEGIN PKCS7-----";

/// Footer line of the PKCS#7 text form
pub const PEM_PKCS7_FOOTER: &str = "-----END PKCS7-----";

/// Header line of a PEM certificate
pub const PEM_CERTIFICATE_HEADER: &str = "-----BEGIN CERTIFICATE-----";

/// Footer line of a PEM certificate
pub const PEM_CERTIFICATE_FOOTER: &str = "-----END CERTIFICATE-----";

/// Base64 characters per PEM body line
pub const PEM_LINE_WIDTH: usize = 64;

// === Key store ===

/// Alias under which the signing key is stored
pub const DEFAULT_KEY_ALIAS: &str = "BFH_APC_DEMO";

/// Display name placed in the certificate subject
pub const DEFAULT_KEY_DISPLAY_NAME: &str = "APC Demo App";
