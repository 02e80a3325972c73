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

//! The request/reply transport boundary consumed by [`crate::auth::session`].
//!
//! The real transport (ZeroMQ-style request/reply, TLS framing, retries at
//! the socket level) is an external collaborator; this module
//! specifies only the interface the Session Driver needs from it.

use crate::auth::handshake::{SignInPayload, SignInReply};

/// Failure sending/receiving a single sign-in round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The round trip did not complete within the caller's time budget.
    Timeout,
    /// The transport itself failed (connection reset, malformed reply, ...).
    Failed,
}

/// A blocking request/reply channel to the controller's sign-in endpoint.
///
/// Implementations own connection setup, retries below the handshake
/// level, and transport-specific framing; they hand the Session Driver a
/// single synchronous call per attempt.
pub trait AuthTransport {
    /// Send `payload` to the controller's sign-in endpoint and block for a
    /// reply, bounded by `timeout`.
    fn send_sign_in(
        &self,
        payload: &SignInPayload,
        timeout: std::time::Duration,
    ) -> Result<SignInReply, TransportError>;
}

#[cfg(test)]
pub mod test_support {
    //! An in-memory [`AuthTransport`] double for tests and doc examples.

    use super::*;
    use std::sync::Mutex;

    /// A canned reply or transport error returned in sequence to successive
    /// calls, then the last entry repeats for any further call.
    pub struct ScriptedTransport {
        replies: Mutex<Vec<Result<SignInReply, TransportError>>>,
    }

    impl ScriptedTransport {
        /// Build a transport that returns each of `replies` in order.
        pub fn new(replies: Vec<Result<SignInReply, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    impl AuthTransport for ScriptedTransport {
        fn send_sign_in(
            &self,
            _payload: &SignInPayload,
            _timeout: std::time::Duration,
        ) -> Result<SignInReply, TransportError> {
            let mut replies = self.replies.lock().expect("scripted transport lock");
            if replies.len() > 1 {
                replies.remove(0)
            } else if let Some(last) = replies.first() {
                last.clone()
            } else {
                Err(TransportError::Failed)
            }
        }
    }
}
