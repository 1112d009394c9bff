//! Activity timeline for Betafarm.
//!
//! Every stored entry gets one activity; timelines list them per project or
//! across the projects a profile follows.

pub mod repository;
pub mod service;
pub mod types;

pub use repository::{insert_activity, ActivityRepository};
pub use service::ActivityService;
pub use types::{Activity, ActivityItem, ActivityPage, ActivitySource};
