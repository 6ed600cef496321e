//! Shared helpers for integration tests: scripted capabilities standing in
//! for the trusted display, the authorization dialog and the backend, plus
//! a sample key-store certificate.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tokio::sync::oneshot;

use confirm_signer::adapters::{
    AuthorizationOutcome, ConfirmationOutcome, DeliveryConfig, DeliveryService, HttpTransport,
    KeyHandle, KeyStore, MemoryClipboard, PromptInfo, SecondaryAuthorizer, SoftwareKeyStore,
    TrustedConfirmation,
};
use confirm_signer::domain::confirmation::encode_confirmed_record;
use confirm_signer::{
    AuthorizationRequirement, CertificateChain, ConfirmationSigningProtocol, ProtectionLevel,
    RawSignature, SigningError, SigningKeyDescriptor, SigningResult,
};

pub const TEST_ALIAS: &str = "test-key";

/// Key-store certificate produced on a device with a secure element:
/// EC P-256, tee-enforced trusted confirmation, no user authentication.
pub const SAMPLE_ATTESTATION_CERT_B64: &str = concat!(
    "MIIDRTCCAuygAwIBAgIBATAKBggqhkjOPQQDAjA/MRIwEAYDVQQMDAlTdHJvbmdC",
    "b3gxKTAnBgNVBAUTIDA2ODQyZjg0YmNiYWRiZDE5NjQwNWJmZDZhNjM0OWViMB4X",
    "DTIzMDMyOTA4MzgzNloXDTI0MDMyOTA5MzgzNlowSzELMAkGA1UEBhMCQ0gxDDAK",
    "BgNVBAsTA0JGSDETMBEGA1UECxMKU2VjdXJlVm90ZTEZMBcGA1UEAxMQQkZIIEFQ",
    "QyBEZW1vIEFwcDBZMBMGByqGSM49AgEGCCqGSM49AwEHA0IABFejuuikx8MU+Q8J",
    "4LjJgfuCis1gTDzWSS/8NEtnSp5oKmo4v3L8dV9pvi0+qga/SQcvtkWZKkKuZc8A",
    "0t8IbmejggHLMIIBxzAOBgNVHQ8BAf8EBAMCB4AwggGzBgorBgEEAdZ5AgERBIIB",
    "ozCCAZ8CAWQKAQICAWQKAQIEJDM0NjVlZjIzLTMyOGItNGJlYi05M2RhLTQzMjQw",
    "MzcwMzQ2ZgQAMHa/gxAIAgYBhyyE2oC/gxEIAgYBjomTUQC/gxIIAgYBjomTUQC/",
    "hT0IAgYBhyyE2oy/hUVCBEAwPjEYMBYEEWNoLmJmaC5zZWN1cmV2b3RlAgERMSIE",
    "IFYx474QeKzzVsCZ+B2voFpQ4h6VXlOp47FXcc0LnJA2MIHwoQUxAwIBAqIDAgED",
    "owQCAgEApQsxCQIBBAIBBQIBBqoDAgEBv4N3AgUAv4N8AgUAv4N9AgUAv4U+AwIB",
    "AL+FQEwwSgQgD251yAGDtd7AdLAFTUJx6ZOJ6+SxNrCBneHxULoP+dcBAf8KAQAE",
    "IDYnS2BR96N8t7nyRg9VMwfDNGcxqcQ5e0a71CNEiUsIv4VBBQIDAfvQv4VCBQID",
    "AxY/v4VGCAQGZ29vZ2xlv4VHCAQGb3Jpb2xlv4VICAQGb3Jpb2xlv4VMCAQGR29v",
    "Z2xlv4VNCQQHUGl4ZWwgNr+FTgYCBAE0sKG/hU8GAgQBNLChMAoGCCqGSM49BAMC",
    "A0cAMEQCIFJGWP8TcvC6eKK2bXEkpm5lKbJj957GdHvHSh50S+4BAiAo46oHHJ2V",
    "cv6WCdcDOjRsCJOVq2RoSwEK2qaA2uiZ3w==",
);

pub const SAMPLE_ATTESTATION_CHALLENGE: &str = "3465ef23-328b-4beb-93da-43240370346f";

pub fn sample_attestation_cert_der() -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(SAMPLE_ATTESTATION_CERT_B64)
        .expect("sample certificate base64")
}

/// How the scripted display answers.
#[derive(Debug, Clone)]
pub enum ConfirmationScript {
    /// Return the extra data unchanged.
    ConfirmNonce,
    /// Return a CBOR prompt record built from what was presented.
    ConfirmRecord,
    /// Return these bytes regardless of what was presented.
    ConfirmBytes(Vec<u8>),
    Dismiss,
    Cancel,
    Error(String),
    /// Refuse presentation as busy.
    Busy,
}

pub struct ScriptedConfirmation {
    supported: bool,
    script: ConfirmationScript,
    pub presented: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedConfirmation {
    pub fn new(script: ConfirmationScript) -> Self {
        Self {
            supported: true,
            script,
            presented: Mutex::new(Vec::new()),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(ConfirmationScript::ConfirmNonce)
        }
    }

    pub fn present_count(&self) -> usize {
        self.presented.lock().unwrap().len()
    }

    pub fn last_extra_data(&self) -> Vec<u8> {
        self.presented.lock().unwrap().last().expect("presented").1.clone()
    }
}

impl TrustedConfirmation for ScriptedConfirmation {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn present_prompt(
        &self,
        text: &str,
        extra_data: &[u8],
    ) -> SigningResult<oneshot::Receiver<ConfirmationOutcome>> {
        if let ConfirmationScript::Busy = self.script {
            return Err(SigningError::CapabilityBusy("prompt showing".into()));
        }
        self.presented
            .lock()
            .unwrap()
            .push((text.to_string(), extra_data.to_vec()));
        let outcome = match &self.script {
            ConfirmationScript::ConfirmNonce => ConfirmationOutcome::Confirmed(extra_data.to_vec()),
            ConfirmationScript::ConfirmRecord => {
                ConfirmationOutcome::Confirmed(encode_confirmed_record(text, extra_data)?)
            }
            ConfirmationScript::ConfirmBytes(bytes) => ConfirmationOutcome::Confirmed(bytes.clone()),
            ConfirmationScript::Dismiss => ConfirmationOutcome::Dismissed,
            ConfirmationScript::Cancel => ConfirmationOutcome::Canceled,
            ConfirmationScript::Error(e) => ConfirmationOutcome::Error(e.clone()),
            ConfirmationScript::Busy => unreachable!(),
        };
        let (tx, rx) = oneshot::channel();
        tx.send(outcome).expect("receiver alive");
        Ok(rx)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AuthorizationScript {
    Approve,
    Reject,
    NegativeButton,
    Error,
}

pub struct ScriptedAuthorizer {
    script: AuthorizationScript,
    pub calls: AtomicUsize,
}

impl ScriptedAuthorizer {
    pub fn new(script: AuthorizationScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SecondaryAuthorizer for ScriptedAuthorizer {
    fn authenticate(
        &self,
        _prompt: &PromptInfo,
        signer: Box<dyn KeyHandle>,
    ) -> oneshot::Receiver<AuthorizationOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.script {
            AuthorizationScript::Approve => AuthorizationOutcome::Succeeded(signer),
            AuthorizationScript::Reject => AuthorizationOutcome::Failed,
            AuthorizationScript::NegativeButton => AuthorizationOutcome::Error {
                code: confirm_signer::adapters::authorization::AUTH_ERROR_NEGATIVE_BUTTON,
                message: "Cancel".into(),
            },
            AuthorizationScript::Error => AuthorizationOutcome::Error {
                code: 7,
                message: "Too many attempts".into(),
            },
        };
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        rx
    }
}

/// Presents prompts but only answers when the test releases them.
#[derive(Default)]
pub struct HeldConfirmation {
    pending: Mutex<Option<(oneshot::Sender<ConfirmationOutcome>, Vec<u8>)>>,
}

impl HeldConfirmation {
    pub fn is_presenting(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    /// Confirm the held prompt with the nonce it was presented with.
    pub fn release(&self) {
        let (tx, nonce) = self.pending.lock().unwrap().take().expect("a held prompt");
        let _ = tx.send(ConfirmationOutcome::Confirmed(nonce));
    }
}

impl TrustedConfirmation for HeldConfirmation {
    fn is_supported(&self) -> bool {
        true
    }

    fn present_prompt(
        &self,
        _text: &str,
        extra_data: &[u8],
    ) -> SigningResult<oneshot::Receiver<ConfirmationOutcome>> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock().unwrap() = Some((tx, extra_data.to_vec()));
        Ok(rx)
    }
}

/// Records every request; optionally fails them all.
#[derive(Default)]
pub struct RecordingTransport {
    pub fail: bool,
    pub posts: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn posts_to(&self, url_suffix: &str) -> Vec<Vec<(String, String)>> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.ends_with(url_suffix))
            .map(|(_, fields)| fields.clone())
            .collect()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        _timeout: Duration,
    ) -> SigningResult<()> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), fields.to_vec()));
        if self.fail {
            Err(SigningError::NetworkError("connection refused".into()))
        } else {
            Ok(())
        }
    }

    async fn get_json(&self, _url: &str, _timeout: Duration) -> SigningResult<serde_json::Value> {
        Err(SigningError::NetworkError("offline".into()))
    }
}

/// Wraps a store, counting signatures and optionally cutting chains to the
/// leaf certificate.
pub struct SpyStore {
    inner: Arc<SoftwareKeyStore>,
    leaf_only: bool,
    pub signatures: Arc<Mutex<Vec<RawSignature>>>,
}

impl SpyStore {
    pub fn new(inner: Arc<SoftwareKeyStore>, leaf_only: bool) -> Self {
        Self {
            inner,
            leaf_only,
            signatures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sign_count(&self) -> usize {
        self.signatures.lock().unwrap().len()
    }
}

struct SpyHandle {
    inner: Box<dyn KeyHandle>,
    signatures: Arc<Mutex<Vec<RawSignature>>>,
}

impl KeyHandle for SpyHandle {
    fn alias(&self) -> &str {
        self.inner.alias()
    }

    fn algorithm_name(&self) -> &str {
        self.inner.algorithm_name()
    }

    fn protection_level(&self) -> ProtectionLevel {
        self.inner.protection_level()
    }

    fn requirements(&self) -> &BTreeSet<AuthorizationRequirement> {
        self.inner.requirements()
    }

    fn sign(&self, data: &[u8]) -> SigningResult<RawSignature> {
        let signature = self.inner.sign(data)?;
        self.signatures.lock().unwrap().push(signature.clone());
        Ok(signature)
    }
}

impl KeyStore for SpyStore {
    fn generate(&self, descriptor: &SigningKeyDescriptor) -> SigningResult<Box<dyn KeyHandle>> {
        self.inner.generate(descriptor)
    }

    fn get_chain(&self, alias: &str) -> SigningResult<CertificateChain> {
        let chain = self.inner.get_chain(alias)?;
        if self.leaf_only {
            Ok(CertificateChain::new(
                chain.leaf().into_iter().cloned().collect(),
            ))
        } else {
            Ok(chain)
        }
    }

    fn delete(&self, alias: &str) -> SigningResult<bool> {
        self.inner.delete(alias)
    }

    fn list_aliases(&self) -> SigningResult<Vec<String>> {
        self.inner.list_aliases()
    }

    fn key_handle(&self, alias: &str) -> SigningResult<Box<dyn KeyHandle>> {
        Ok(Box::new(SpyHandle {
            inner: self.inner.key_handle(alias)?,
            signatures: Arc::clone(&self.signatures),
        }))
    }
}

/// In-memory store holding one EC key under [`TEST_ALIAS`].
pub fn store_with_key(requirements: &[AuthorizationRequirement]) -> Arc<SoftwareKeyStore> {
    let store = SoftwareKeyStore::in_memory(ProtectionLevel::HardwareIsolated);
    let mut builder = SigningKeyDescriptor::builder(TEST_ALIAS).challenge(b"test".to_vec());
    for requirement in requirements {
        builder = builder.require(*requirement);
    }
    store
        .generate(&builder.build().expect("descriptor"))
        .expect("generate test key");
    Arc::new(store)
}

pub fn delivery(
    transport: Arc<RecordingTransport>,
    clipboard: Arc<MemoryClipboard>,
    connected: bool,
) -> DeliveryService {
    DeliveryService::new(
        transport,
        clipboard,
        DeliveryConfig {
            connected,
            p7m_url: "http://backend.test/api/p7m".into(),
            failure_url: "http://backend.test/api/failure".into(),
            post_timeout: Duration::from_millis(2000),
            device_info: "integration-test".into(),
        },
    )
}

/// Everything a protocol test wants to look at afterwards.
pub struct Harness {
    pub protocol: ConfirmationSigningProtocol,
    pub confirmation: Arc<ScriptedConfirmation>,
    pub authorizer: Arc<ScriptedAuthorizer>,
    pub store: Arc<SpyStore>,
    pub transport: Arc<RecordingTransport>,
    pub clipboard: Arc<MemoryClipboard>,
}

pub struct HarnessBuilder {
    confirmation: ScriptedConfirmation,
    authorization: AuthorizationScript,
    requirements: Vec<AuthorizationRequirement>,
    leaf_only: bool,
    connected: bool,
    failing_transport: bool,
}

impl HarnessBuilder {
    pub fn new(confirmation: ScriptedConfirmation) -> Self {
        Self {
            confirmation,
            authorization: AuthorizationScript::Approve,
            requirements: Vec::new(),
            leaf_only: false,
            connected: false,
            failing_transport: false,
        }
    }

    pub fn authorization(mut self, script: AuthorizationScript) -> Self {
        self.authorization = script;
        self
    }

    pub fn require(mut self, requirement: AuthorizationRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn leaf_only(mut self) -> Self {
        self.leaf_only = true;
        self
    }

    pub fn connected(mut self) -> Self {
        self.connected = true;
        self
    }

    /// Every POST fails; only meaningful together with `connected()`.
    pub fn failing_transport(mut self) -> Self {
        self.failing_transport = true;
        self
    }

    pub fn build(self) -> Harness {
        let confirmation = Arc::new(self.confirmation);
        let authorizer = Arc::new(ScriptedAuthorizer::new(self.authorization));
        let store = Arc::new(SpyStore::new(
            store_with_key(&self.requirements),
            self.leaf_only,
        ));
        let transport = Arc::new(if self.failing_transport {
            RecordingTransport::failing()
        } else {
            RecordingTransport::default()
        });
        let clipboard = Arc::new(MemoryClipboard::new());
        let protocol = ConfirmationSigningProtocol::new(
            confirmation.clone(),
            authorizer.clone(),
            store.clone(),
            delivery(transport.clone(), clipboard.clone(), self.connected),
            TEST_ALIAS,
        );
        Harness {
            protocol,
            confirmation,
            authorizer,
            store,
            transport,
            clipboard,
        }
    }
}

/// Give spawned fire-and-forget tasks a chance to run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Verify a detached (or attached, with `content == None`) PKCS#7 message
/// with OpenSSL, trusting the embedded certificates as-is.
pub fn openssl_verify(der: &[u8], content: Option<&[u8]>) -> Result<(), openssl::error::ErrorStack> {
    use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
    use openssl::stack::Stack;
    use openssl::x509::store::X509StoreBuilder;
    use openssl::x509::X509;

    let pkcs7 = Pkcs7::from_der(der)?;
    let certs = Stack::<X509>::new()?;
    let store = X509StoreBuilder::new()?.build();
    pkcs7.verify(&certs, &store, content, None, Pkcs7Flags::NOVERIFY)
}
