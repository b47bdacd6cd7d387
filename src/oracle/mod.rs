/// Seams to the external decision-making collaborators.
///
/// Every oracle exchanges free text; parsing of replies happens on this side
/// of the boundary.
use async_trait::async_trait;

use crate::agent_engine::tools::ToolRunner;
use crate::errors::PilotResult;
use crate::session::EncodedImage;

pub mod llm_oracles;

pub use llm_oracles::{LlmBboxOracle, LlmExecutionOracle, LlmGridOracle, LlmPlanningOracle};

/// Decides the next basic step toward `goal`, or replies `complete`.
#[async_trait]
pub trait PlanningOracle: Send + Sync {
    async fn next_step(&self, frame: &EncodedImage, goal: &str) -> PilotResult<String>;
}

/// Carries out one instruction through the desktop tool set.
#[async_trait]
pub trait ExecutionOracle: Send + Sync {
    async fn perform(
        &self,
        frame: &EncodedImage,
        instruction: &str,
        tools: &dyn ToolRunner,
    ) -> PilotResult<String>;
}

/// Picks the grid cell containing an element; `-1` if not visible.
#[async_trait]
pub trait GridOracle: Send + Sync {
    async fn choose_cell(&self, annotated: &EncodedImage, description: &str) -> PilotResult<String>;
}

/// Returns free text containing a bounding box or point for an element.
#[async_trait]
pub trait BboxOracle: Send + Sync {
    async fn locate_bbox(&self, frame: &EncodedImage, description: &str) -> PilotResult<String>;
}
