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

//! Session Driver (SAuth): the retry loop wrapping [`crate::auth::handshake`]
//! that yields a ready [`Envelope`].
//!
//! Exit-code mapping is exposed as a pure function
//! ([`SessionError::exit_code`]) rather than called directly here: calling
//! `std::process::exit` is left to the binary/caller that owns process
//! lifecycle.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use rand::RngCore;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::handshake::{
    fingerprint_matches, minion_sign_in_payload, reply_disposition, verify_master, Disposition,
    HandshakeContext, HandshakeError, PinnedKeyRole,
};
use crate::crypto::envelope::Envelope;
use crate::identity::keystore::KeyHandle;
use crate::metrics::Metrics;
use crate::transport::{AuthTransport, TransportError};

/// Session Driver errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying handshake failed (bad reply, rejected key, MITM, ...).
    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),
    /// The handshake did not complete within `auth_timeout` and
    /// `auth_safemode` is disabled.
    #[error("timeout")]
    Timeout,
    /// Post-auth fingerprint check failed.
    #[error("fingerprint mismatch")]
    FingerprintMismatch,
    /// The transport itself failed (not a timeout).
    #[error("transport failure")]
    Transport,
    /// One-shot "caller" mode received a RETRY signal on its first attempt.
    #[error("caller mode: sign-in pending, not retrying")]
    CallerRetry,
    /// `auth_tries` was exhausted without reaching a terminal state.
    #[error("auth_tries exhausted")]
    TriesExhausted,
}

impl SessionError {
    /// The process exit code this error maps to.
    /// Terminal rejection without retry is `0`; caller-mode retry is `2`;
    /// fingerprint mismatch or controller-authentication failure is `42`;
    /// anything else reported here is an ordinary non-zero failure (`1`),
    /// left to the caller's own conventions.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::Handshake(HandshakeError::RejectedByController) => 0,
            SessionError::CallerRetry => 2,
            SessionError::FingerprintMismatch => 42,
            SessionError::Handshake(HandshakeError::ControllerKeyChanged) => 42,
            SessionError::Handshake(HandshakeError::MissingSignature) => 42,
            SessionError::Handshake(HandshakeError::TokenMismatch) => 42,
            _ => 1,
        }
    }
}

/// Everything the Session Driver needs beyond the transport and identity.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// This agent's configured id, sent in the sign-in payload.
    pub id: String,
    /// PKI directory holding the pinned controller key file.
    pub pki_dir: PathBuf,
    /// Which pinned-key file this agent's role uses.
    pub role: PinnedKeyRole,
    /// `open_mode`: disables the TOFU/pinning check entirely.
    pub open_mode: bool,
    /// `verify_master_pubkey_sign`.
    pub sig_enabled: bool,
    /// `always_verify_signature`.
    pub always_verify_signature: bool,
    /// PEM of the pre-installed controller signing public key.
    pub signer_pub_pem: Option<String>,
    /// `rejected_retry`.
    pub rejected_retry: bool,
    /// Initial backoff wait on RETRY/FULL/PendingApproval.
    pub acceptance_wait_time: Duration,
    /// Cap on the geometric backoff.
    pub acceptance_wait_time_max: Duration,
    /// Per-attempt transport timeout budget.
    pub auth_timeout: Duration,
    /// `auth_safemode`: treat `Timeout` as RETRY instead of a hard failure.
    pub auth_safemode: bool,
    /// `auth_tries`: cap on sign-in attempts; `None` retries indefinitely.
    pub auth_tries: Option<u32>,
    /// One-shot "caller" mode: the first RETRY/PendingApproval/Full signal
    /// returns [`SessionError::CallerRetry`] instead of backing off.
    pub caller: bool,
    /// AES key size in bits used to size the resulting [`Envelope`].
    pub key_size: usize,
    /// Pre-shared hex fingerprint pin (`master_finger`/`syndic_finger`),
    /// checked after a successful handshake.
    pub fingerprint: Option<String>,
}

/// The retry loop wrapping [`crate::auth::handshake`], yielding a ready
/// [`Envelope`] on success.
pub struct SessionDriver<'a, T: AuthTransport> {
    transport: &'a T,
    identity: &'a KeyHandle,
    config: SessionConfig,
    metrics: Option<&'a Metrics>,
}

impl<'a, T: AuthTransport> SessionDriver<'a, T> {
    /// Build a driver for this agent's identity and configuration.
    pub fn new(transport: &'a T, identity: &'a KeyHandle, config: SessionConfig) -> Self {
        Self {
            transport,
            identity,
            config,
            metrics: None,
        }
    }

    /// Attach a [`Metrics`] handle so this driver's attempts/outcomes are
    /// counted.
    pub fn with_metrics(mut self, metrics: &'a Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Path to the pinned controller public key file for this agent's role.
    pub fn pinned_pub_path(&self) -> PathBuf {
        self.config.pki_dir.join(self.config.role.file_name())
    }

    /// Run the handshake to completion, retrying with geometric backoff on
    /// recoverable dispositions, and return a ready [`Envelope`] on success.
    pub fn run(&self) -> Result<Envelope, SessionError> {
        let mut wait = self.config.acceptance_wait_time;
        let mut tries: u32 = 0;
        let mut first_attempt = true;

        loop {
            tries += 1;
            if let Some(max) = self.config.auth_tries {
                if tries > max {
                    return Err(SessionError::TriesExhausted);
                }
            }

            let pinned_path = self.pinned_pub_path();
            let pinned_pem = std::fs::read_to_string(&pinned_path).ok();
            let token = fresh_token();

            let payload =
                minion_sign_in_payload(&self.config.id, self.identity, pinned_pem.as_deref(), &token)?;

            if let Some(metrics) = self.metrics {
                metrics.sign_in_attempts_total.inc();
            }

            let reply = match self
                .transport
                .send_sign_in(&payload, self.config.auth_timeout)
            {
                Ok(reply) => reply,
                Err(TransportError::Timeout) => {
                    if !self.config.auth_safemode {
                        return Err(SessionError::Timeout);
                    }
                    warn!("handshake attempt timed out, retrying (auth_safemode)");
                    self.back_off_or_caller_exit(&mut wait, first_attempt)?;
                    first_attempt = false;
                    continue;
                }
                Err(TransportError::Failed) => return Err(SessionError::Transport),
            };

            match reply_disposition(&reply, self.config.rejected_retry) {
                Disposition::Proceed => {}
                Disposition::Retry | Disposition::PendingApproval => {
                    if let Some(metrics) = self.metrics {
                        metrics.sign_in_soft_rejected_total.inc();
                    }
                    info!("sign-in not yet accepted, backing off before retry");
                    self.back_off_or_caller_exit(&mut wait, first_attempt)?;
                    first_attempt = false;
                    continue;
                }
                Disposition::Full => {
                    if let Some(metrics) = self.metrics {
                        metrics.sign_in_capacity_full_total.inc();
                    }
                    info!("controller at capacity, backing off before retry");
                    self.back_off_or_caller_exit(&mut wait, first_attempt)?;
                    first_attempt = false;
                    continue;
                }
                Disposition::Terminal => {
                    if let Some(metrics) = self.metrics {
                        metrics.sign_in_terminal_rejected_total.inc();
                    }
                    return Err(SessionError::Handshake(HandshakeError::RejectedByController));
                }
            }

            let ctx = HandshakeContext {
                identity: self.identity,
                pinned_pub_path: pinned_path.clone(),
                open_mode: self.config.open_mode,
                sig_enabled: self.config.sig_enabled,
                always_verify_signature: self.config.always_verify_signature,
                signer_pub_pem: self.config.signer_pub_pem.clone(),
                token,
            };

            let session_key = verify_master(&ctx, &reply)?;

            if let Some(expected) = &self.config.fingerprint {
                if !fingerprint_matches(&pinned_path, expected)? {
                    if let Some(metrics) = self.metrics {
                        metrics.fingerprint_mismatch_total.inc();
                    }
                    warn!("controller pinned-key fingerprint mismatch: possible MITM");
                    return Err(SessionError::FingerprintMismatch);
                }
            }

            if let Some(metrics) = self.metrics {
                metrics.sign_in_success_total.inc();
            }
            info!("sign-in succeeded, session envelope ready");
            return Ok(Envelope::new(&session_key, self.config.key_size)
                .map_err(HandshakeError::Envelope)?);
        }
    }

    fn back_off_or_caller_exit(
        &self,
        wait: &mut Duration,
        first_attempt: bool,
    ) -> Result<(), SessionError> {
        if self.config.caller && first_attempt {
            return Err(SessionError::CallerRetry);
        }
        thread::sleep(*wait);
        *wait = (*wait * 2).min(self.config.acceptance_wait_time_max);
        Ok(())
    }
}

fn fresh_token() -> [u8; 32] {
    let mut token = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut token);
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::handshake::{ReplyLoad, RetValue, SignInReply};
    use crate::crypto::envelope::generate_key_string;
    use crate::crypto::rsa_ops;
    use crate::transport::test_support::ScriptedTransport;
    use tempfile::tempdir;

    fn identity(dir: &std::path::Path, name: &str) -> KeyHandle {
        KeyHandle::load_or_generate(dir, name, 2048, None).unwrap()
    }

    fn base_config(dir: &std::path::Path) -> SessionConfig {
        SessionConfig {
            id: "agent-01".to_string(),
            pki_dir: dir.to_path_buf(),
            role: PinnedKeyRole::Minion,
            open_mode: false,
            sig_enabled: false,
            always_verify_signature: false,
            signer_pub_pem: None,
            rejected_retry: false,
            acceptance_wait_time: Duration::from_millis(1),
            acceptance_wait_time_max: Duration::from_millis(4),
            auth_timeout: Duration::from_millis(50),
            auth_safemode: false,
            auth_tries: None,
            caller: false,
            key_size: 192,
            fingerprint: None,
        }
    }

    fn happy_reply(agent: &KeyHandle, master: &KeyHandle, key_string: &str) -> SignInReply {
        let aes_ct = rsa_ops::oaep_encrypt(agent.public_key(), key_string.as_bytes()).unwrap();
        SignInReply {
            aes: Some(aes_ct),
            sig: None,
            token: None,
            pub_key: Some(master.public_pem().unwrap()),
            pub_sig: None,
            publish_port: Some(4505),
            load: None,
        }
    }

    #[test]
    fn happy_path_yields_envelope() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");
        let master = identity(dir.path(), "master");
        let key_string = generate_key_string(192);
        let reply = happy_reply(&agent, &master, &key_string);

        let transport = ScriptedTransport::new(vec![Ok(reply)]);
        let driver = SessionDriver::new(&transport, &agent, base_config(dir.path()));

        let envelope = driver.run().unwrap();
        let ct = envelope.encrypt(b"ping").unwrap();
        assert_eq!(envelope.decrypt(&ct).unwrap(), b"ping");
    }

    #[test]
    fn retries_then_succeeds() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");
        let master = identity(dir.path(), "master");
        let key_string = generate_key_string(192);

        let pending = SignInReply {
            load: Some(ReplyLoad {
                ret: Some(RetValue::Bool(true)),
            }),
            ..Default::default()
        };
        let success = happy_reply(&agent, &master, &key_string);

        let transport = ScriptedTransport::new(vec![Ok(pending), Ok(success)]);
        let driver = SessionDriver::new(&transport, &agent, base_config(dir.path()));

        let envelope = driver.run().unwrap();
        assert_eq!(envelope.decrypt(&envelope.encrypt(b"x").unwrap()).unwrap(), b"x");
    }

    #[test]
    fn terminal_rejection_maps_to_exit_code_zero() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");

        let rejected = SignInReply {
            load: Some(ReplyLoad {
                ret: Some(RetValue::Bool(false)),
            }),
            ..Default::default()
        };
        let transport = ScriptedTransport::new(vec![Ok(rejected)]);
        let driver = SessionDriver::new(&transport, &agent, base_config(dir.path()));

        let err = driver.run().unwrap_err();
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn caller_mode_returns_on_first_retry_without_sleeping() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");

        let pending = SignInReply {
            load: Some(ReplyLoad {
                ret: Some(RetValue::Bool(true)),
            }),
            ..Default::default()
        };
        let transport = ScriptedTransport::new(vec![Ok(pending)]);
        let mut cfg = base_config(dir.path());
        cfg.caller = true;
        let driver = SessionDriver::new(&transport, &agent, cfg);

        let err = driver.run().unwrap_err();
        assert!(matches!(err, SessionError::CallerRetry));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn fingerprint_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");
        let master = identity(dir.path(), "master");
        let key_string = generate_key_string(192);
        let reply = happy_reply(&agent, &master, &key_string);

        let transport = ScriptedTransport::new(vec![Ok(reply)]);
        let mut cfg = base_config(dir.path());
        cfg.fingerprint = Some("deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef".to_string());
        let driver = SessionDriver::new(&transport, &agent, cfg);

        let err = driver.run().unwrap_err();
        assert!(matches!(err, SessionError::FingerprintMismatch));
        assert_eq!(err.exit_code(), 42);
    }

    #[test]
    fn timeout_without_safemode_is_fatal() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");
        let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout)]);
        let driver = SessionDriver::new(&transport, &agent, base_config(dir.path()));
        assert!(matches!(driver.run().unwrap_err(), SessionError::Timeout));
    }

    #[test]
    fn timeout_with_safemode_retries() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");
        let master = identity(dir.path(), "master");
        let key_string = generate_key_string(192);
        let success = happy_reply(&agent, &master, &key_string);

        let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout), Ok(success)]);
        let mut cfg = base_config(dir.path());
        cfg.auth_safemode = true;
        let driver = SessionDriver::new(&transport, &agent, cfg);
        assert!(driver.run().is_ok());
    }

    #[test]
    fn metrics_count_attempts_and_success() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");
        let master = identity(dir.path(), "master");
        let key_string = generate_key_string(192);
        let reply = happy_reply(&agent, &master, &key_string);

        let transport = ScriptedTransport::new(vec![Ok(reply)]);
        let metrics = crate::metrics::Metrics::new().unwrap();
        let driver = SessionDriver::new(&transport, &agent, base_config(dir.path()))
            .with_metrics(&metrics);

        driver.run().unwrap();
        assert_eq!(metrics.sign_in_attempts_total.get(), 1);
        assert_eq!(metrics.sign_in_success_total.get(), 1);
        assert_eq!(metrics.sign_in_terminal_rejected_total.get(), 0);
    }

    #[test]
    fn metrics_count_terminal_rejection() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");

        let rejected = SignInReply {
            load: Some(ReplyLoad {
                ret: Some(RetValue::Bool(false)),
            }),
            ..Default::default()
        };
        let transport = ScriptedTransport::new(vec![Ok(rejected)]);
        let metrics = crate::metrics::Metrics::new().unwrap();
        let driver = SessionDriver::new(&transport, &agent, base_config(dir.path()))
            .with_metrics(&metrics);

        assert!(driver.run().is_err());
        assert_eq!(metrics.sign_in_terminal_rejected_total.get(), 1);
    }

    #[test]
    fn auth_tries_exhausted() {
        let dir = tempdir().unwrap();
        let agent = identity(dir.path(), "minion");
        let pending = SignInReply {
            load: Some(ReplyLoad {
                ret: Some(RetValue::Bool(true)),
            }),
            ..Default::default()
        };
        let transport = ScriptedTransport::new(vec![Ok(pending)]);
        let mut cfg = base_config(dir.path());
        cfg.auth_tries = Some(2);
        let driver = SessionDriver::new(&transport, &agent, cfg);
        assert!(matches!(driver.run().unwrap_err(), SessionError::TriesExhausted));
    }
}
