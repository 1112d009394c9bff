//! Betafarm - project feed subscriptions and activity timelines.
//!
//! Projects attach links to external pages. A subscribing link's feed is
//! discovered and followed through a PubSubHubbub hub; pushed items become
//! sanitized entries, and every entry is broadcast as an activity on the
//! project's timeline and on the dashboards of its followers.

pub mod activity;
pub mod config;
pub mod db;
pub mod error;
pub mod feeds;
pub mod logging;
pub mod project;
pub mod web;

pub use config::Config;
pub use db::Database;
pub use error::{BetafarmError, Result};
