// ABOUTME: Ownership labels stamped on every resource a site creates.
// ABOUTME: Teardown and status find site resources through these labels alone.

use crate::types::SiteName;
use std::collections::HashMap;

pub const MANAGED: &str = "siteforge.managed";
pub const SITE: &str = "siteforge.site";
pub const COMPONENT: &str = "siteforge.component";
pub const CREDENTIAL: &str = "siteforge.credential";

/// Labels marking a resource as belonging to `site`.
pub fn owned(site: &SiteName) -> HashMap<String, String> {
    HashMap::from([
        (MANAGED.to_string(), "true".to_string()),
        (SITE.to_string(), site.to_string()),
    ])
}

/// Labels for the container of `deployment`.
pub fn component(site: &SiteName, deployment: &str) -> HashMap<String, String> {
    let mut labels = owned(site);
    labels.insert(COMPONENT.to_string(), deployment.to_string());
    labels
}
