pub mod attestation;
pub mod confirmation;
pub mod constants;
pub mod crypto;
pub mod der; // TLV writer + reader for the fixed CMS profile and attestation records
pub mod keys;
pub mod pkcs7;
pub mod protocol;
pub mod questionnaire;
