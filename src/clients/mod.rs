pub mod llm_scoring;
pub mod scoring_client;

pub use llm_scoring::LlmScoringClient;
pub use scoring_client::{HttpScoringClient, ScoringClient};
