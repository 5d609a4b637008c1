use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GasError, Result};

/// How replica ownership is elected after loading.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverMode {
    /// One collective round per vertex id from 0 to the global maximum.
    IdRange,
    /// Ids are hashed to an owner rank that elects masters for the ids it receives.
    HashExchange,
}

/// Tunables shared by the loader, the communication engine, and the analytics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// In-flight send slots for scalar gather and apply.
    pub scalar_send_slots: usize,
    /// In-flight send slots for vector gather and apply.
    pub vector_send_slots: usize,
    /// In-flight send slots for `exchange_vec_data`.
    pub exchange_send_slots: usize,
    /// In-degree cut-off for the two-phase strategies.
    pub two_phase_threshold: usize,
    /// Denominator smoothing for the HDRF balance term.
    pub hdrf_epsilon: f64,
    /// Base seed for random walks; each rank adds its own rank.
    pub walk_seed: u64,
    /// Replica election protocol.
    pub resolver: ResolverMode,
    /// Dial attempts before a TCP peer is declared unreachable.
    pub connect_retries: u32,
    /// Pause between dial attempts in milliseconds.
    pub connect_backoff_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineOptions {
    /// Creates options with the engine defaults.
    pub fn new() -> Self {
        Self {
            scalar_send_slots: 1024,
            vector_send_slots: 8,
            exchange_send_slots: 8,
            two_phase_threshold: 100,
            hdrf_epsilon: 0.01,
            walk_seed: 0,
            resolver: ResolverMode::IdRange,
            connect_retries: 50,
            connect_backoff_ms: 20,
        }
    }

    /// Sets the scalar send slot count.
    pub fn scalar_send_slots(mut self, slots: usize) -> Self {
        self.scalar_send_slots = slots;
        self
    }

    /// Sets the vector send slot count.
    pub fn vector_send_slots(mut self, slots: usize) -> Self {
        self.vector_send_slots = slots;
        self
    }

    /// Sets the exchange send slot count.
    pub fn exchange_send_slots(mut self, slots: usize) -> Self {
        self.exchange_send_slots = slots;
        self
    }

    /// Sets the two-phase in-degree threshold.
    pub fn two_phase_threshold(mut self, threshold: usize) -> Self {
        self.two_phase_threshold = threshold;
        self
    }

    /// Sets the HDRF epsilon.
    pub fn hdrf_epsilon(mut self, epsilon: f64) -> Self {
        self.hdrf_epsilon = epsilon;
        self
    }

    /// Sets the random walk seed.
    pub fn walk_seed(mut self, seed: u64) -> Self {
        self.walk_seed = seed;
        self
    }

    /// Selects the replica election protocol.
    pub fn resolver(mut self, mode: ResolverMode) -> Self {
        self.resolver = mode;
        self
    }

    /// Sets TCP dial retry behaviour.
    pub fn connect_retries(mut self, retries: u32, backoff_ms: u64) -> Self {
        self.connect_retries = retries;
        self.connect_backoff_ms = backoff_ms;
        self
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, slots) in [
            ("scalar_send_slots", self.scalar_send_slots),
            ("vector_send_slots", self.vector_send_slots),
            ("exchange_send_slots", self.exchange_send_slots),
        ] {
            if slots == 0 {
                return Err(GasError::InvalidArgument(format!("{name} must be positive")));
            }
        }
        if self.hdrf_epsilon.is_nan() || self.hdrf_epsilon <= 0.0 {
            return Err(GasError::InvalidArgument(
                "hdrf_epsilon must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Parses TOML; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: Self = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
