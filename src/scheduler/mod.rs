pub mod dispatch;
pub mod job;
pub mod store;

pub use dispatch::{Dispatcher, RouteRequest, Submission};
pub use job::{Job, JobState, JobTask};
pub use store::{FallbackOutcome, JobStore};
