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
#![warn(missing_docs)]

//! Agentcore - cryptographic authentication and session-encryption core for
//! an agent/controller remote-execution system.
//!
//! This crate provides:
//! - Long-term RSA identity key management for controllers and agents, with
//!   optional "sign the signer" key rotation defense.
//! - The sign-in handshake state machine, including identity pinning
//!   (trust-on-first-use) and recoverable-signature verification.
//! - An authenticated-encryption envelope ("Crypticle") for post-handshake
//!   traffic: AES-CBC encrypt-then-HMAC-SHA256 with constant-time verify.
//! - Controller-side session-key rotation signalling via an atomically
//!   published dropfile observed by worker processes.
//!
//! The request/reply transport, inner payload codec, CLI, configuration
//! loading, logging subscriber wiring and process lifecycle of controller
//! workers are external collaborators; this crate specifies and consumes
//! only the interfaces it needs from them (see [`transport`]).

/// Crate-wide error taxonomy.
pub mod error;

/// Cryptographic primitives: the authenticated envelope and shared RSA ops.
pub mod crypto;

/// On-disk RSA identity management for agents and controllers.
pub mod identity;

/// The sign-in handshake and its retrying session driver.
pub mod auth;

/// Controller-side session-key rotation signalling (dropfile).
pub mod rotation;

/// Configuration structs covering the recognized options.
pub mod config;

/// Ambient observability counters.
pub mod metrics;

/// The request/reply transport boundary consumed by `auth`.
pub mod transport;

pub use error::AuthError;
