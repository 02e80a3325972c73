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

//! The sign-in handshake state machine and its retrying session driver.

/// Builds sign-in requests, verifies controller replies, extracts session
/// keys, and pins the controller identity.
pub mod handshake;
/// Retry loop wrapping the handshake; yields a ready [`crate::crypto::envelope::Envelope`].
pub mod session;
