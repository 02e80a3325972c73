// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use agentcore::crypto::envelope::{generate_key_string, Envelope, EnvelopeError};
use proptest::prelude::*;

proptest! {
    #[test]
    fn encrypt_decrypt_is_identity(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
        let env = Envelope::new(&generate_key_string(192), 192).unwrap();
        let ct = env.encrypt(&plaintext).unwrap();
        let pt = env.decrypt(&ct).unwrap();
        prop_assert_eq!(pt, plaintext);
    }

    #[test]
    fn any_single_byte_flip_fails_closed(
        plaintext in proptest::collection::vec(any::<u8>(), 1..256),
        flip_index in 0usize..512,
    ) {
        let env = Envelope::new(&generate_key_string(192), 192).unwrap();
        let mut ct = env.encrypt(&plaintext).unwrap();
        let idx = flip_index % ct.len();
        ct[idx] ^= 0x01;
        prop_assert!(matches!(env.decrypt(&ct), Err(EnvelopeError::AuthenticationFailed)));
    }

}

#[test]
fn generate_key_string_round_trips_through_envelope_new() {
    for key_size in [128usize, 192, 256] {
        let s = generate_key_string(key_size);
        assert!(Envelope::new(&s, key_size).is_ok());
    }
}

#[test]
fn tampered_ciphertext_never_yields_partial_plaintext() {
    let env = Envelope::new(&generate_key_string(192), 192).unwrap();
    let ct = env.encrypt(b"top secret command payload").unwrap();

    for i in 0..ct.len() {
        let mut tampered = ct.clone();
        tampered[i] ^= 0xff;
        assert!(
            matches!(env.decrypt(&tampered), Err(EnvelopeError::AuthenticationFailed)),
            "byte {i} flip must fail closed"
        );
    }
}

#[test]
fn mac_comparison_timing_is_independent_of_mismatch_position() {
    // Statistical smoke test: comparing tags that differ at the first byte
    // vs. the last byte should not show a gross, reproducible timing skew.
    // This is not a rigorous constant-time proof, just a regression guard
    // against accidentally replacing `subtle::ConstantTimeEq` with a
    // short-circuiting comparison.
    use std::time::Instant;

    let env = Envelope::new(&generate_key_string(192), 192).unwrap();
    let ct = env.encrypt(&vec![0u8; 4096]).unwrap();
    let len = ct.len();

    let mut early_flip = ct.clone();
    early_flip[len - 32] ^= 0x01; // first MAC byte
    let mut late_flip = ct.clone();
    late_flip[len - 1] ^= 0x01; // last MAC byte

    const ROUNDS: usize = 2000;
    let start_early = Instant::now();
    for _ in 0..ROUNDS {
        let _ = env.decrypt(&early_flip);
    }
    let early_elapsed = start_early.elapsed();

    let start_late = Instant::now();
    for _ in 0..ROUNDS {
        let _ = env.decrypt(&late_flip);
    }
    let late_elapsed = start_late.elapsed();

    let ratio = early_elapsed.as_secs_f64() / late_elapsed.as_secs_f64().max(1e-9);
    assert!(
        (0.2..5.0).contains(&ratio),
        "gross timing skew between early/late MAC mismatch: {ratio}"
    );
}

#[test]
fn dumps_loads_session_mixup_yields_empty_object_not_error() {
    let env = Envelope::new(&generate_key_string(192), 192).unwrap();
    let ct = env.encrypt(b"not wrapped with the magic prefix").unwrap();
    let recovered = env.loads(&ct).unwrap();
    assert!(recovered.is_empty());
}
