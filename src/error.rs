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

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Crate-wide error taxonomy.

use thiserror::Error;

use crate::auth::handshake::HandshakeError;
use crate::auth::session::SessionError;
use crate::crypto::envelope::EnvelopeError;
use crate::crypto::rsa_ops::RsaOpError;
use crate::identity::keystore::KeyStoreError;
use crate::rotation::dropfile::DropfileError;

/// Top-level error aggregating every subsystem's error type.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed key material.
    #[error("invalid key")]
    InvalidKey,
    /// Key file could not be parsed.
    #[error("key parse error")]
    KeyParseError,
    /// Filesystem I/O failure touching identity or rotation state.
    #[error("io error")]
    IoError,
    /// Filesystem permission problem on PKI or cache directories.
    #[error("permission denied")]
    PermissionDenied,
    /// Envelope MAC verification failed.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// Handshake attempt exceeded its time budget.
    #[error("timeout")]
    Timeout,
    /// Controller explicitly rejected this identity.
    #[error("rejected by controller")]
    RejectedByController,
    /// Pinned controller key changed without a valid replacement signature.
    #[error("controller key changed")]
    ControllerKeyChanged,
    /// Post-auth fingerprint check failed.
    #[error("fingerprint mismatch")]
    FingerprintMismatch,
    /// Controller reported it is at capacity.
    #[error("capacity full")]
    CapacityFull,
}

impl From<KeyStoreError> for AuthError {
    fn from(e: KeyStoreError) -> Self {
        match e {
            KeyStoreError::InvalidKey => AuthError::InvalidKey,
            KeyStoreError::KeyParseError => AuthError::KeyParseError,
            KeyStoreError::Io => AuthError::IoError,
            KeyStoreError::PermissionDenied => AuthError::PermissionDenied,
        }
    }
}

impl From<EnvelopeError> for AuthError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::InvalidKey => AuthError::InvalidKey,
            EnvelopeError::AuthenticationFailed => AuthError::AuthenticationFailed,
        }
    }
}

impl From<RsaOpError> for AuthError {
    fn from(e: RsaOpError) -> Self {
        match e {
            RsaOpError::OaepEncrypt | RsaOpError::Sign => AuthError::InvalidKey,
            RsaOpError::OaepDecrypt | RsaOpError::Verify => AuthError::AuthenticationFailed,
        }
    }
}

impl From<HandshakeError> for AuthError {
    fn from(e: HandshakeError) -> Self {
        match e {
            HandshakeError::KeyStore(inner) => inner.into(),
            HandshakeError::Envelope(inner) => inner.into(),
            HandshakeError::Rsa(inner) => inner.into(),
            HandshakeError::ControllerKeyChanged => AuthError::ControllerKeyChanged,
            HandshakeError::MissingSignature => AuthError::ControllerKeyChanged,
            HandshakeError::RejectedByController => AuthError::RejectedByController,
            HandshakeError::CapacityFull => AuthError::CapacityFull,
            HandshakeError::TokenMismatch => AuthError::AuthenticationFailed,
        }
    }
}

impl From<SessionError> for AuthError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Handshake(inner) => inner.into(),
            SessionError::Timeout => AuthError::Timeout,
            SessionError::FingerprintMismatch => AuthError::FingerprintMismatch,
            SessionError::Transport => AuthError::IoError,
            SessionError::CallerRetry => AuthError::Timeout,
            SessionError::TriesExhausted => AuthError::Timeout,
        }
    }
}

impl From<DropfileError> for AuthError {
    fn from(e: DropfileError) -> Self {
        match e {
            DropfileError::Io => AuthError::IoError,
            DropfileError::PermissionDenied => AuthError::PermissionDenied,
            DropfileError::RaceWindow => AuthError::IoError,
        }
    }
}
