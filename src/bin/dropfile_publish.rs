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

//! Stand-alone controller-side tool that performs one rotation-signal
//! publish (`rotation::dropfile::publish`), env-driven, with explicit exit
//! codes.
//!
//! Environment: `AGENTCORE_CACHEDIR` (default `./cache`), `AGENTCORE_KEYSIZE`
//! (default `192`), `AGENTCORE_USER` (optional chown target).

use std::path::PathBuf;

use tracing::{error, info};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() {
    let _ = tracing_subscriber::fmt().with_target(false).compact().try_init();

    let cachedir = PathBuf::from(env("AGENTCORE_CACHEDIR", "./cache"));
    let keysize: usize = env("AGENTCORE_KEYSIZE", "192").parse().unwrap_or(192);
    let user = std::env::var("AGENTCORE_USER").ok();

    let metrics = agentcore::metrics::Metrics::new().ok();

    match agentcore::rotation::dropfile::publish(&cachedir, keysize, user.as_deref()) {
        Ok(_) => {
            if let Some(m) = &metrics {
                m.dropfile_publish_total.inc();
            }
            info!(cachedir = %cachedir.display(), "published new rotation dropfile");
        }
        Err(e) => {
            if matches!(e, agentcore::rotation::dropfile::DropfileError::RaceWindow) {
                if let Some(m) = &metrics {
                    m.dropfile_race_window_total.inc();
                }
            }
            error!(cachedir = %cachedir.display(), error = %e, "dropfile publish failed");
            std::process::exit(1);
        }
    }
}
