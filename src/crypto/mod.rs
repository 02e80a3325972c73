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

//! Cryptographic primitives shared by identity, handshake and envelope code.

/// The authenticated-encryption envelope ("Crypticle") used for all
/// post-handshake traffic.
pub mod envelope;
/// PKCS#7 padding for the envelope's AES-CBC layer.
pub mod padding;
/// Shared RSA-OAEP and recoverable-PKCS#1-v1.5 primitives.
pub mod rsa_ops;
