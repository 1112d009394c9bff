//! Projects, profiles and links for Betafarm.
//!
//! Projects own links; profiles follow projects. Links flagged for
//! subscription feed the push pipeline.

pub mod repository;
pub mod service;
pub mod types;

pub use repository::{LinkRepository, ProfileRepository, ProjectRepository};
pub use service::ProjectService;
pub use types::{Link, NewLink, NewProject, Profile, Project, MAX_LINK_NAME_LENGTH};
