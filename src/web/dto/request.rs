//! Request DTOs for the web API.

use serde::Deserialize;
use validator::Validate;

use crate::project::NewLink;

/// Link creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLinkRequest {
    #[validate(length(min = 1, max = 100, message = "Must be 1 to 100 characters"))]
    pub name: String,
    #[validate(url(message = "Must be a valid URL"))]
    pub url: String,
    #[serde(default)]
    pub blog: bool,
    /// Follow the link's feed through a hub.
    #[serde(default)]
    pub subscribe: bool,
    #[serde(default)]
    pub featured: bool,
}

impl CreateLinkRequest {
    /// Convert into a new link; the project is attached by the service.
    pub fn into_new_link(self) -> NewLink {
        let mut link = NewLink::new(self.name.trim(), self.url);
        if self.blog {
            link = link.blog();
        }
        if self.subscribe {
            link = link.subscribed();
        }
        if self.featured {
            link = link.featured();
        }
        link
    }
}

/// Follow or unfollow request.
#[derive(Debug, Deserialize, Validate)]
pub struct FollowRequest {
    #[validate(length(min = 1, max = 100, message = "Must be 1 to 100 characters"))]
    pub username: String,
}

/// Page selection for timelines.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// 1-based page number; missing or zero means the first page.
    #[serde(default)]
    pub page: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }
}

/// Hub verification query (`hub.*` parameters).
#[derive(Debug, Deserialize)]
pub struct HubVerification {
    #[serde(rename = "hub.mode")]
    pub mode: String,
    #[serde(rename = "hub.topic")]
    pub topic: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
    #[serde(rename = "hub.verify_token", default)]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.lease_seconds", default)]
    pub lease_seconds: Option<u64>,
}
