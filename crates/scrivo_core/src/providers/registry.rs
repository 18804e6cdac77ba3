//! Static provider registration.
//!
//! Providers are resolved from a name string through a compile-time
//! constructor table. New vendors register a constructor at startup; no
//! runtime module scanning is involved.

use std::collections::BTreeMap;

use crate::models::JobConfig;

use super::{ProviderError, RefinementProvider, TranscriptionProvider};

/// Constructor for a transcription provider.
pub type TranscriberCtor = fn(&JobConfig) -> Result<Box<dyn TranscriptionProvider>, ProviderError>;
/// Constructor for a refinement provider.
pub type RefinerCtor = fn(&JobConfig) -> Result<Box<dyn RefinementProvider>, ProviderError>;

/// Name-to-constructor table for both provider capabilities.
#[derive(Default)]
pub struct ProviderRegistry {
    transcribers: BTreeMap<String, TranscriberCtor>,
    refiners: BTreeMap<String, RefinerCtor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_transcriber(&mut self, name: impl Into<String>, ctor: TranscriberCtor) {
        self.transcribers.insert(name.into(), ctor);
    }

    pub fn register_refiner(&mut self, name: impl Into<String>, ctor: RefinerCtor) {
        self.refiners.insert(name.into(), ctor);
    }

    pub fn create_transcriber(
        &self,
        name: &str,
        config: &JobConfig,
    ) -> Result<Box<dyn TranscriptionProvider>, ProviderError> {
        let ctor = self.transcribers.get(name).ok_or_else(|| {
            ProviderError::InvalidRequest(format!(
                "unknown transcription provider '{}' (registered: {})",
                name,
                self.transcriber_names().join(", ")
            ))
        })?;
        ctor(config)
    }

    pub fn create_refiner(
        &self,
        name: &str,
        config: &JobConfig,
    ) -> Result<Box<dyn RefinementProvider>, ProviderError> {
        let ctor = self.refiners.get(name).ok_or_else(|| {
            ProviderError::InvalidRequest(format!(
                "unknown refinement provider '{}' (registered: {})",
                name,
                self.refiner_names().join(", ")
            ))
        })?;
        ctor(config)
    }

    pub fn transcriber_names(&self) -> Vec<String> {
        self.transcribers.keys().cloned().collect()
    }

    pub fn refiner_names(&self) -> Vec<String> {
        self.refiners.keys().cloned().collect()
    }
}
