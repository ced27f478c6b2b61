pub mod index;
pub mod normalize;
pub mod ranker;

pub use index::{LEVEL_SEPARATOR, Taxonomy, trailing_segment};
pub use normalize::normalize;
pub use ranker::{CandidateRanker, RankedCandidate};
