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

//! Stand-alone identity keypair generator: exercises
//! `identity::keystore::KeyHandle::load_or_generate` as a CLI for operators
//! bootstrapping a new agent or controller host.
//!
//! Usage: `identity_gen <pki_dir> <name> [keysize] [user]`

use anyhow::{Context, Result};
use std::path::PathBuf;

use agentcore::identity::keystore::KeyHandle;

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_target(false).compact().try_init();

    let mut args = std::env::args().skip(1);
    let pki_dir = args
        .next()
        .context("usage: identity_gen <pki_dir> <name> [keysize] [user]")?;
    let name = args
        .next()
        .context("usage: identity_gen <pki_dir> <name> [keysize] [user]")?;
    let keysize: usize = args
        .next()
        .map(|s| s.parse())
        .transpose()
        .context("keysize must be an integer")?
        .unwrap_or(2048);
    let user = args.next();

    let dir = PathBuf::from(pki_dir);
    let handle = KeyHandle::load_or_generate(&dir, &name, keysize, user.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load/generate {name}: {e}"))?;

    let fingerprint =
        agentcore::identity::keystore::pem_fingerprint(&agentcore::identity::keystore::public_key_path(
            &dir, &name,
        ))
        .map_err(|e| anyhow::anyhow!("failed to fingerprint {name}.pub: {e}"))?;

    println!("{}.pub fingerprint: {}", handle.name(), fingerprint);
    Ok(())
}
