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

//! Ambient observability counters for sign-in attempts, rejections, and
//! dropfile rotations.

use prometheus::{IntCounter, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric failed to construct or register with the registry.
    #[error("prometheus")]
    Prom,
}

/// Authentication and rotation metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry all counters below are registered against.
    pub registry: Registry,

    /// Total sign-in attempts sent to the controller.
    pub sign_in_attempts_total: IntCounter,
    /// Sign-ins that yielded a ready session envelope.
    pub sign_in_success_total: IntCounter,
    /// Soft rejections (pending approval / retryable `ret`).
    pub sign_in_soft_rejected_total: IntCounter,
    /// Terminal rejections (`ret: false` without `rejected_retry`).
    pub sign_in_terminal_rejected_total: IntCounter,
    /// Controller-reported capacity-full backoffs.
    pub sign_in_capacity_full_total: IntCounter,
    /// Post-auth fingerprint mismatches (possible MITM).
    pub fingerprint_mismatch_total: IntCounter,
    /// Controller-side rotation dropfile publishes.
    pub dropfile_publish_total: IntCounter,
    /// Dropfile publishes that hit the same-second race window.
    pub dropfile_race_window_total: IntCounter,
}

impl Metrics {
    /// Create and register all counters against a fresh [`Registry`].
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let sign_in_attempts_total =
            IntCounter::new("agentcore_sign_in_attempts_total", "Total sign-in attempts")
                .map_err(|_| MetricsError::Prom)?;
        let sign_in_success_total = IntCounter::new(
            "agentcore_sign_in_success_total",
            "Sign-ins that yielded a session envelope",
        )
        .map_err(|_| MetricsError::Prom)?;
        let sign_in_soft_rejected_total = IntCounter::new(
            "agentcore_sign_in_soft_rejected_total",
            "Soft rejections pending controller approval",
        )
        .map_err(|_| MetricsError::Prom)?;
        let sign_in_terminal_rejected_total = IntCounter::new(
            "agentcore_sign_in_terminal_rejected_total",
            "Terminal controller rejections",
        )
        .map_err(|_| MetricsError::Prom)?;
        let sign_in_capacity_full_total = IntCounter::new(
            "agentcore_sign_in_capacity_full_total",
            "Controller-reported capacity-full backoffs",
        )
        .map_err(|_| MetricsError::Prom)?;
        let fingerprint_mismatch_total = IntCounter::new(
            "agentcore_fingerprint_mismatch_total",
            "Post-auth fingerprint mismatches",
        )
        .map_err(|_| MetricsError::Prom)?;
        let dropfile_publish_total = IntCounter::new(
            "agentcore_dropfile_publish_total",
            "Controller-side rotation dropfile publishes",
        )
        .map_err(|_| MetricsError::Prom)?;
        let dropfile_race_window_total = IntCounter::new(
            "agentcore_dropfile_race_window_total",
            "Dropfile publishes that hit the same-second race window",
        )
        .map_err(|_| MetricsError::Prom)?;

        for metric in [
            &sign_in_attempts_total,
            &sign_in_success_total,
            &sign_in_soft_rejected_total,
            &sign_in_terminal_rejected_total,
            &sign_in_capacity_full_total,
            &fingerprint_mismatch_total,
            &dropfile_publish_total,
            &dropfile_race_window_total,
        ] {
            registry
                .register(Box::new(metric.clone()))
                .map_err(|_| MetricsError::Prom)?;
        }

        Ok(Self {
            registry,
            sign_in_attempts_total,
            sign_in_success_total,
            sign_in_soft_rejected_total,
            sign_in_terminal_rejected_total,
            sign_in_capacity_full_total,
            fingerprint_mismatch_total,
            dropfile_publish_total,
            dropfile_race_window_total,
        })
    }
}
