pub mod config;
pub mod jobs;
pub mod page_range;
pub mod pdf;
pub mod selection;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod worker;

pub use config::Config;
pub use jobs::{JobError, JobKind, JobState};
pub use selection::{PageEntry, Projection};
pub use session::{JobUpdate, Session, SessionError};
