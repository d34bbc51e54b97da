pub mod artifact;
pub mod candidate;
pub mod loaders;
pub mod loop_state;
pub mod platform;
pub mod scoring;

pub use artifact::{Artifact, Fingerprint};
pub use candidate::{Candidate, DiscoveryReason, TypePriority};
pub use loop_state::{LoopEvent, LoopState, Phase};
pub use platform::{PlatformId, PlatformProfile};
pub use scoring::{ScoreItem, ScoringContext, ScoringResult};
