// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Instrumentation mode policy and its configuration surface.

use faststr::FastStr;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How much of a pipeline the hook wraps automatically.
///
/// Read once when the hook strategy is installed and immutable afterwards;
/// changing the mode means installing a new strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstrumentationMode {
    /// Wrap every stage. Context is visible at every operator boundary, at a
    /// per-signal cost proportional to pipeline depth.
    WrapEach,
    /// Wrap only the subscription-time boundary stage. Inner operators rely
    /// on the ambient context persisting across their (usually same-thread)
    /// execution; an internal thread hop that bypasses the scheduler
    /// wrapper loses the context.
    WrapBoundaryOnly,
    /// No automatic wrapping. The boundary decorator still binds the store
    /// handle into the flow context; propagation is the caller's job.
    Manual,
}

impl Default for InstrumentationMode {
    fn default() -> Self {
        InstrumentationMode::WrapEach
    }
}

impl InstrumentationMode {
    /// The canonical configuration spelling of this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentationMode::WrapEach => "wrap-each",
            InstrumentationMode::WrapBoundaryOnly => "wrap-boundary-only",
            InstrumentationMode::Manual => "manual",
        }
    }
}

impl FromStr for InstrumentationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wrap-each" | "wrap_each" => Ok(InstrumentationMode::WrapEach),
            "wrap-boundary-only" | "wrap_boundary_only" => Ok(InstrumentationMode::WrapBoundaryOnly),
            "manual" => Ok(InstrumentationMode::Manual),
            other => Err(ConfigError::UnknownMode(FastStr::new(other))),
        }
    }
}

/// Errors raised while building a propagation configuration.
///
/// Unrecognized values fail here, at configuration time, before any pipeline
/// is constructed; nothing silently falls back to another mode.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The instrumentation mode string matched none of the known modes.
    #[error("Unknown instrumentation mode: {0:?} (expected one of wrap-each, wrap-boundary-only, manual)")]
    UnknownMode(FastStr),
}

/// Settings that control how pipelines are instrumented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct PropagationConfig {
    /// The instrumentation mode.
    /// Default is [`InstrumentationMode::WrapEach`].
    pub mode: InstrumentationMode,
}

impl PropagationConfig {
    /// Returns the default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instrumentation mode.
    pub fn with_mode(mut self, mode: InstrumentationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Parse the instrumentation mode from a configuration string,
    /// failing fast on unknown values.
    pub fn with_mode_str(mut self, mode: &str) -> Result<Self, ConfigError> {
        self.mode = mode.parse()?;
        Ok(self)
    }
}
