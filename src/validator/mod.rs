pub mod history;
pub mod sample_validator;
pub mod state;

pub use history::FrameHistory;
pub use sample_validator::SampleValidator;
pub use state::{DistanceRange, ValidatedState};
