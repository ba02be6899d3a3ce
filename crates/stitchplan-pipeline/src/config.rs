//! Aggregate configuration for the analyze, decide and prescale stages.

use serde::{Deserialize, Serialize};

use crate::analyze::AnalyzeParams;
use crate::decision::DecisionParams;
use crate::prescale::PrescaleParams;
use crate::types::PipelineError;

/// Parameters for every engine stage.
///
/// Missing sections and fields take their defaults when deserialized, so
/// `{}` is a complete configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub analyze: AnalyzeParams,
    pub decision: DecisionParams,
    pub prescale: PrescaleParams,
}

impl PipelineConfig {
    /// Parse a JSON document and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the document does not
    /// parse, or [`PipelineError::InvalidArgument`] if a field is out of range.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first section's validation error.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.analyze.validate()?;
        self.decision.validate()?;
        self.prescale.validate()
    }
}
