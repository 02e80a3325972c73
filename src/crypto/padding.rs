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

//! PKCS#7 padding for the Envelope's AES-CBC layer.

use crate::crypto::envelope::EnvelopeError;

/// Pad `data` to a `block_size` boundary, always appending at least one byte.
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad = block_size - (data.len() % block_size);
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.resize(data.len() + pad, pad as u8);
    out
}

/// Strip and validate PKCS#7 padding, rejecting any malformed trailer.
pub fn pkcs7_unpad(data: &[u8], block_size: usize) -> Result<Vec<u8>, EnvelopeError> {
    if data.is_empty() || data.len() % block_size != 0 {
        return Err(EnvelopeError::AuthenticationFailed);
    }

    let pad = data[data.len() - 1] as usize;
    if pad == 0 || pad > block_size || pad > data.len() {
        return Err(EnvelopeError::AuthenticationFailed);
    }

    for &byte in &data[data.len() - pad..] {
        if byte as usize != pad {
            return Err(EnvelopeError::AuthenticationFailed);
        }
    }

    Ok(data[..data.len() - pad].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_unpad_round_trip() {
        for len in 0..=48 {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let padded = pkcs7_pad(&data, 16);
            assert_eq!(padded.len() % 16, 0);
            assert!(padded.len() > data.len());
            let unpadded = pkcs7_unpad(&padded, 16).unwrap();
            assert_eq!(unpadded, data);
        }
    }

    #[test]
    fn pad_exact_block_adds_full_block() {
        let data = [0u8; 16];
        let padded = pkcs7_pad(&data, 16);
        assert_eq!(padded.len(), 32);
        assert!(padded[16..].iter().all(|&b| b == 16));
    }

    #[test]
    fn unpad_empty_fails() {
        assert!(pkcs7_unpad(&[], 16).is_err());
    }

    #[test]
    fn unpad_bad_pad_value_zero() {
        let mut block = [0u8; 16];
        block[15] = 0;
        assert!(pkcs7_unpad(&block, 16).is_err());
    }

    #[test]
    fn unpad_bad_pad_value_too_large() {
        let mut block = [0u8; 16];
        block[15] = 17;
        assert!(pkcs7_unpad(&block, 16).is_err());
    }

    #[test]
    fn unpad_inconsistent_padding() {
        let mut block = [0u8; 16];
        block[15] = 4;
        block[14] = 4;
        block[13] = 4;
        block[12] = 99;
        assert!(pkcs7_unpad(&block, 16).is_err());
    }

    #[test]
    fn unpad_not_block_aligned() {
        assert!(pkcs7_unpad(&[0u8; 15], 16).is_err());
    }
}
