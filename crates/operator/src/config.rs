//! Configuration for the sequence mask operator.
//!
//! A [`SequenceMaskConfig`] is built once when the operator is constructed
//! and then shared read-only by every forward and backward call. It can be
//! deserialized from JSON or TOML, assembled from string key/value pairs, and
//! adjusted through environment variables.

use std::{env, fs, path::Path};

use masking::MaskParams;
use serde::{Deserialize, Serialize};

use crate::errors::{MaskError, Result};

/// Environment variable forcing a backend (`auto`, `host` or `device`).
pub const BACKEND_ENV: &str = "SEQUENCE_MASK_BACKEND";
/// Environment variable selecting the length policy (`clamp` or `reject`).
pub const LENGTH_POLICY_ENV: &str = "SEQUENCE_MASK_LENGTH_POLICY";

/// Which kernel family the operator binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendSelection {
    /// Host kernels for CPU tensors, device kernels otherwise.
    #[default]
    Auto,
    /// Always use the host kernels; only valid for CPU tensors.
    HostOnly,
    /// Always use the device formulation, even for CPU tensors.
    DeviceOnly,
}

impl BackendSelection {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "host" | "host_only" | "cpu" => Some(Self::HostOnly),
            "device" | "device_only" | "gpu" => Some(Self::DeviceOnly),
            _ => None,
        }
    }
}

/// How lengths outside `[0, max_sequence_length]` are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Negative lengths mask the whole sequence, oversized ones mask nothing.
    #[default]
    Clamp,
    /// Out-of-range lengths fail with [`MaskError::OutOfRangeLength`].
    Reject,
}

impl LengthPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "clamp" => Some(Self::Clamp),
            "reject" | "strict" => Some(Self::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequenceMaskConfig {
    /// Read per-batch lengths from a second input. When `false` the operator
    /// is the identity.
    pub use_sequence_length: bool,
    /// Constant written at masked positions.
    pub value: f64,
    /// Time axis: `0` for `[T, B, ...]`, `1` for `[B, T, ...]`.
    pub axis: usize,
    pub backend: BackendSelection,
    pub length_policy: LengthPolicy,
}

impl Default for SequenceMaskConfig {
    fn default() -> Self {
        Self {
            use_sequence_length: false,
            value: 0.0,
            axis: 0,
            backend: BackendSelection::Auto,
            length_policy: LengthPolicy::Clamp,
        }
    }
}

impl SequenceMaskConfig {
    /// Loads a config file; `.json` is parsed as JSON, anything else as TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: SequenceMaskConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | Some("tml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(MaskError::config(format!(
                    "unsupported configuration extension '{other}'"
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from string parameters such as
    /// `[("use_sequence_length", "True"), ("value", "1")]`.
    pub fn from_kwargs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets a single option from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || MaskError::config(format!("invalid value '{value}' for '{key}'"));
        match key.trim() {
            "use_sequence_length" => {
                self.use_sequence_length = parse_bool(value).ok_or_else(invalid)?;
            }
            "value" => {
                self.value = value.trim().parse().map_err(|_| invalid())?;
            }
            "axis" => {
                self.axis = value.trim().parse().map_err(|_| invalid())?;
            }
            "backend" => {
                self.backend = BackendSelection::parse(value).ok_or_else(invalid)?;
            }
            "length_policy" => {
                self.length_policy = LengthPolicy::parse(value).ok_or_else(invalid)?;
            }
            other => {
                return Err(MaskError::config(format!("unknown option '{other}'")));
            }
        }
        Ok(())
    }

    /// Applies `SEQUENCE_MASK_*` environment overrides. Unparseable values are
    /// logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var(BACKEND_ENV) {
            match BackendSelection::parse(&value) {
                Some(backend) => self.backend = backend,
                None => log::warn!("ignoring {BACKEND_ENV}={value}: expected auto, host or device"),
            }
        }
        if let Ok(value) = env::var(LENGTH_POLICY_ENV) {
            match LengthPolicy::parse(&value) {
                Some(policy) => self.length_policy = policy,
                None => log::warn!("ignoring {LENGTH_POLICY_ENV}={value}: expected clamp or reject"),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.axis > 1 {
            errors.push(format!("axis must be 0 or 1, got {}", self.axis));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MaskError::Config(errors))
        }
    }

    /// Number of inputs the operator expects.
    pub fn num_inputs(&self) -> usize {
        self.input_names().len()
    }

    pub fn input_names(&self) -> &'static [&'static str] {
        if self.use_sequence_length {
            &["data", "sequence_length"]
        } else {
            &["data"]
        }
    }

    /// Index of the time dimension and of the batch dimension.
    pub fn time_and_batch_dims(&self) -> (usize, usize) {
        if self.axis == 0 {
            (0, 1)
        } else {
            (1, 0)
        }
    }

    pub fn params(&self) -> MaskParams {
        MaskParams {
            use_sequence_length: self.use_sequence_length,
            value: self.value,
            axis: self.axis,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
