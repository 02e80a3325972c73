// Copyright (c) 2026 Amunchain
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use agentcore::auth::handshake::SignInReply;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Best-effort: ensure reply parsing never panics on attacker-controlled
    // JSON from an untrusted transport. Field-level semantics are covered
    // by unit tests; here we focus on deserializer robustness.
    if let Ok(s) = std::str::from_utf8(data) {
        let _: Result<SignInReply, _> = serde_json::from_str(s);
    }
});
