// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(missing_docs)]

//! Handshake (Auth): builds the sign-in request, verifies the controller's
//! reply, extracts the session key, and pins the controller identity.
//!
//! `verify_master` is written as a single explicit function implementing
//! the nine-row decision table, rather than scattered conditionals.

use std::path::{Path, PathBuf};

use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crypto::envelope::EnvelopeError;
use crate::crypto::rsa_ops::{self, RsaOpError};
use crate::identity::keystore::{self, KeyHandle, KeyStoreError};

/// Separator the session-key string uses to carry extra data alongside the
/// AES/HMAC key material.
const KEY_STRING_EXTRA_SEPARATOR: &str = "_|-";

/// Handshake errors.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Underlying Identity Store failure.
    #[error("key store: {0}")]
    KeyStore(#[from] KeyStoreError),
    /// Envelope construction/validation failure.
    #[error("envelope: {0}")]
    Envelope(#[from] EnvelopeError),
    /// Underlying RSA operation failure (OAEP transport or signature).
    #[error("rsa: {0}")]
    Rsa(#[from] RsaOpError),
    /// Pinned controller key changed without a valid replacement signature
    /// (possible MITM).
    #[error("controller key changed")]
    ControllerKeyChanged,
    /// A required signature was absent from the reply.
    #[error("missing required signature")]
    MissingSignature,
    /// Controller explicitly rejected this identity, no retry.
    #[error("rejected by controller")]
    RejectedByController,
    /// Controller reported it is at capacity.
    #[error("capacity full")]
    CapacityFull,
    /// The controller's reply failed to authenticate (bad `sig`, absent
    /// `aes`/`token` fields, or an echoed token that does not match).
    #[error("token/session proof mismatch")]
    TokenMismatch,
}

/// The inner `load` object of the sign-in payload.
#[derive(Debug, Clone, Serialize)]
pub struct SignInLoad {
    /// Always `"_auth"`.
    pub cmd: String,
    /// This agent's configured id.
    pub id: String,
    /// PEM-encoded agent public key.
    #[serde(rename = "pub")]
    pub pub_key: String,
    /// RSA-OAEP-encrypted agent token, present once a controller key is pinned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Vec<u8>>,
}

/// The sign-in payload sent to the controller.
#[derive(Debug, Clone, Serialize)]
pub struct SignInPayload {
    /// Always `"clear"`: this payload is not itself encrypted under the
    /// session envelope (there is no session yet).
    pub enc: String,
    /// The nested load.
    pub load: SignInLoad,
}

/// Build the sign-in payload for this attempt. If `pinned_pub_pem` is
/// `None` (no controller key pinned yet), `token` is omitted; otherwise it
/// is RSA-OAEP-encrypted under the pinned key.
pub fn minion_sign_in_payload(
    id: &str,
    identity: &KeyHandle,
    pinned_pub_pem: Option<&str>,
    token: &[u8; 32],
) -> Result<SignInPayload, HandshakeError> {
    let pub_pem = identity.public_pem()?;
    let token_ciphertext = match pinned_pub_pem {
        Some(pem) => {
            let pinned_pub =
                RsaPublicKey::from_pkcs1_pem(pem).map_err(|_| KeyStoreError::KeyParseError)?;
            Some(rsa_ops::oaep_encrypt(&pinned_pub, token)?)
        }
        None => None,
    };
    Ok(SignInPayload {
        enc: "clear".to_string(),
        load: SignInLoad {
            cmd: "_auth".to_string(),
            id: id.to_string(),
            pub_key: pub_pem,
            token: token_ciphertext,
        },
    })
}

/// The `load.ret` field of a pending/rejecting reply: either a bool or an
/// opaque string such as `"full"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RetValue {
    /// `false` (terminal rejection, unless `rejected_retry`) or `true`.
    Bool(bool),
    /// `"full"` (capacity) or any other truthy string (pending approval).
    Str(String),
}

/// The optional `load` envelope of a reply carrying a disposition rather
/// than session-key material.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReplyLoad {
    /// Disposition signal, if present.
    pub ret: Option<RetValue>,
}

/// The controller's sign-in reply.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SignInReply {
    /// Session-key string, RSA-OAEP-encrypted under the agent's public key.
    pub aes: Option<Vec<u8>>,
    /// RSA-PKCS#1-v1.5 recoverable signature over `sha256(session_key_string)`.
    pub sig: Option<Vec<u8>>,
    /// Agent token, RSA-OAEP-encrypted back as proof of controller identity.
    pub token: Option<Vec<u8>>,
    /// PEM-encoded controller identity public key, possibly new.
    pub pub_key: Option<String>,
    /// Base64 signature over `pub_key` under the controller signing key.
    pub pub_sig: Option<String>,
    /// Port the controller publishes command traffic on.
    pub publish_port: Option<u16>,
    /// Disposition envelope, present instead of session-key fields when the
    /// controller is not yet ready to admit this agent.
    pub load: Option<ReplyLoad>,
}

/// What to do with a reply before (or instead of) calling `verify_master`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Reply carries session-key material; call `verify_master`.
    Proceed,
    /// Retry the handshake (soft rejection, or recoverable failure).
    Retry,
    /// Retry with a wait, because the key is pending approval.
    PendingApproval,
    /// Controller is at capacity; caller should back off.
    Full,
    /// Controller explicitly rejected this identity with no retry.
    Terminal,
}

/// Inspect `reply.load.ret`, if present, to decide the disposition before
/// calling `verify_master`.
pub fn reply_disposition(reply: &SignInReply, rejected_retry: bool) -> Disposition {
    let Some(load) = &reply.load else {
        return Disposition::Proceed;
    };
    match &load.ret {
        None => Disposition::Proceed,
        Some(RetValue::Bool(false)) => {
            if rejected_retry {
                Disposition::Retry
            } else {
                Disposition::Terminal
            }
        }
        Some(RetValue::Bool(true)) => Disposition::PendingApproval,
        Some(RetValue::Str(s)) if s == "full" => Disposition::Full,
        Some(RetValue::Str(_)) => Disposition::PendingApproval,
    }
}

/// Which pinned-key file this agent's role uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinnedKeyRole {
    /// Ordinary agent: `minion_master.pub`.
    Minion,
    /// Intermediate controller acting as agent: `syndic_master.pub`.
    Syndic,
    /// Alerting/monitoring agent: `monitor_master.pub`.
    Monitor,
}

impl PinnedKeyRole {
    /// The pinned-key file name for this role.
    pub fn file_name(self) -> &'static str {
        match self {
            PinnedKeyRole::Minion => "minion_master.pub",
            PinnedKeyRole::Syndic => "syndic_master.pub",
            PinnedKeyRole::Monitor => "monitor_master.pub",
        }
    }
}

/// Everything `verify_master` needs that is not in the reply itself.
pub struct HandshakeContext<'a> {
    /// This agent's own identity keypair (used to OAEP-decrypt `aes`/`token`).
    pub identity: &'a KeyHandle,
    /// Path to the pinned controller public key file for this role.
    pub pinned_pub_path: PathBuf,
    /// `open_mode`: disables the TOFU/pinning check entirely.
    pub open_mode: bool,
    /// `verify_master_pubkey_sign`: require/verify `pub_sig` on key changes.
    pub sig_enabled: bool,
    /// `always_verify_signature`: re-verify `pub_sig` even with no key change.
    pub always_verify_signature: bool,
    /// PEM of the pre-installed controller *signing* public key, required
    /// when `sig_enabled` is set.
    pub signer_pub_pem: Option<String>,
    /// This attempt's fresh 32-byte token, echoed back by the controller.
    pub token: [u8; 32],
}

/// Implements the nine-row `verify_master` decision table.
/// On success, returns the session-key string ready for
/// `Envelope::new`/`generate_key_string` consumers.
pub fn verify_master(ctx: &HandshakeContext<'_>, reply: &SignInReply) -> Result<String, HandshakeError> {
    let pinned_exists = ctx.pinned_pub_path.is_file() && !ctx.open_mode;

    if !pinned_exists {
        if ctx.sig_enabled {
            let pub_key = reply.pub_key.as_deref().ok_or(HandshakeError::MissingSignature)?;
            let pub_sig = reply.pub_sig.as_deref().ok_or(HandshakeError::MissingSignature)?;
            verify_pub_sig(ctx, pub_key, pub_sig)?;
            persist_pinned(&ctx.pinned_pub_path, pub_key)?;
            info!(role = ?ctx.pinned_pub_path, "pinned controller key via verified signature (no prior pin)");
            return decrypt_aes(ctx, reply, false);
        }
        // Trust-on-first-use.
        let pub_key = reply.pub_key.as_deref().ok_or(HandshakeError::TokenMismatch)?;
        persist_pinned(&ctx.pinned_pub_path, pub_key)?;
        info!("pinned controller key via trust-on-first-use");
        return decrypt_aes(ctx, reply, false);
    }

    let pinned_pem = std::fs::read_to_string(&ctx.pinned_pub_path)
        .map_err(|_| HandshakeError::KeyStore(KeyStoreError::Io))?;
    let pinned_pem_trimmed = pinned_pem.trim();

    let key_changed = match reply.pub_key.as_deref() {
        Some(new_key) => new_key.trim() != pinned_pem_trimmed,
        None => false,
    };

    if key_changed {
        let new_key = reply.pub_key.as_deref().expect("key_changed implies Some");
        if ctx.sig_enabled {
            match reply.pub_sig.as_deref() {
                Some(pub_sig) => {
                    verify_pub_sig(ctx, new_key, pub_sig)?;
                    persist_pinned(&ctx.pinned_pub_path, new_key)?;
                    info!("controller key rotated under a verified signature");
                    decrypt_aes(ctx, reply, false)
                }
                None => Err(HandshakeError::MissingSignature),
            }
        } else {
            warn!("controller public key changed without signature verification enabled: possible MITM");
            Err(HandshakeError::ControllerKeyChanged)
        }
    } else {
        if ctx.sig_enabled {
            let pub_sig = reply.pub_sig.as_deref().ok_or(HandshakeError::MissingSignature)?;
            if ctx.always_verify_signature {
                let key_bytes = reply.pub_key.as_deref().unwrap_or(pinned_pem_trimmed);
                verify_pub_sig(ctx, key_bytes, pub_sig)?;
            }
        } else if reply.pub_sig.is_some() {
            // Signed reply but this agent is not configured to verify
            // signatures: refuse rather than silently ignore `pub_sig`.
            warn!("controller reply carried pub_sig but verify_master_pubkey_sign is disabled");
            return Err(HandshakeError::MissingSignature);
        }
        let (aes, token) = decrypt_aes_raw(ctx, reply, true)?;
        match token {
            Some(t) if t == ctx.token => Ok(aes),
            _ => Err(HandshakeError::TokenMismatch),
        }
    }
}

fn verify_pub_sig(ctx: &HandshakeContext<'_>, pub_key_pem: &str, pub_sig_b64: &str) -> Result<(), HandshakeError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    let signer_pub_pem = ctx.signer_pub_pem.as_deref().ok_or(HandshakeError::MissingSignature)?;
    let sig = STANDARD
        .decode(pub_sig_b64.trim())
        .map_err(|_| HandshakeError::ControllerKeyChanged)?;
    let ok = keystore::verify(signer_pub_pem, pub_key_pem.as_bytes(), &sig)
        .map_err(HandshakeError::KeyStore)?;
    if ok {
        Ok(())
    } else {
        Err(HandshakeError::ControllerKeyChanged)
    }
}

fn persist_pinned(path: &Path, pem: &str) -> Result<(), HandshakeError> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    std::fs::write(&tmp, pem).map_err(|_| HandshakeError::KeyStore(KeyStoreError::Io))?;
    std::fs::rename(&tmp, path).map_err(|_| HandshakeError::KeyStore(KeyStoreError::Io))?;
    Ok(())
}

/// Convenience wrapper returning just the session-key string (the common
/// `master_pub_known=false` call site from `verify_master`'s TOFU/first-sig
/// branches).
fn decrypt_aes(
    ctx: &HandshakeContext<'_>,
    reply: &SignInReply,
    master_pub_known: bool,
) -> Result<String, HandshakeError> {
    decrypt_aes_raw(ctx, reply, master_pub_known).map(|(aes, _)| aes)
}

/// RSA-OAEP-decrypt `reply.aes`, optionally cross-check `reply.sig` against
/// the pinned controller key, split the `"_|-"`-delimited extra field if
/// present, and otherwise recover the echoed token.
///
/// A verified key rotation calls this with `master_pub_known=false`, which
/// skips the `sig` cross-check because the freshly-pinned key is not yet
/// trusted for that purpose. This is intentional and is not silently
/// hardened here.
fn decrypt_aes_raw(
    ctx: &HandshakeContext<'_>,
    reply: &SignInReply,
    master_pub_known: bool,
) -> Result<(String, Option<Vec<u8>>), HandshakeError> {
    let aes_ct = reply.aes.as_ref().ok_or(HandshakeError::TokenMismatch)?;
    let key_str_bytes = rsa_ops::oaep_decrypt(ctx.identity.private_key(), aes_ct)?;

    if let Some(sig) = &reply.sig {
        if master_pub_known && ctx.pinned_pub_path.is_file() && !ctx.open_mode {
            let pinned_pem = std::fs::read_to_string(&ctx.pinned_pub_path)
                .map_err(|_| HandshakeError::KeyStore(KeyStoreError::Io))?;
            let pinned_pub =
                RsaPublicKey::from_pkcs1_pem(&pinned_pem).map_err(|_| KeyStoreError::KeyParseError)?;
            if rsa_ops::verify_recoverable(&pinned_pub, &key_str_bytes, sig).is_err() {
                debug!("decrypt_aes: sig cross-check against pinned key failed");
                return Err(HandshakeError::TokenMismatch);
            }
        }
    }

    let key_str = String::from_utf8(key_str_bytes).map_err(|_| HandshakeError::TokenMismatch)?;

    if let Some((aes, extra)) = key_str.split_once(KEY_STRING_EXTRA_SEPARATOR) {
        return Ok((aes.to_string(), Some(extra.as_bytes().to_vec())));
    }

    if let Some(token_ct) = &reply.token {
        let token = rsa_ops::oaep_decrypt(ctx.identity.private_key(), token_ct)?;
        return Ok((key_str, Some(token)));
    }

    if !master_pub_known {
        return Ok((key_str, None));
    }

    Err(HandshakeError::TokenMismatch)
}

/// Compare a freshly computed fingerprint of the pinned controller key
/// against a pre-shared hex fingerprint.
pub fn fingerprint_matches(pinned_pub_path: &Path, expected_hex: &str) -> Result<bool, HandshakeError> {
    let actual = keystore::pem_fingerprint(pinned_pub_path)?;
    Ok(actual.eq_ignore_ascii_case(expected_hex.trim()))
}
