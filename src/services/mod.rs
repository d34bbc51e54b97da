pub mod candidate_locator;
pub mod fingerprint;
pub mod image_extractor;
pub mod image_processing;
pub mod page_context;
pub mod profile_resolver;
pub mod score_writer;

pub use candidate_locator::CandidateLocator;
pub use image_extractor::ImageExtractor;
pub use profile_resolver::ProfileResolver;
pub use score_writer::{ScoreWriter, SubmissionMode, SubmitOptions, WriteStrategy};
