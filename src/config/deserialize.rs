// ABOUTME: Custom serde deserializers for site file types.
// ABOUTME: Handles site names, image refs, host lists and memory sizes.

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::types::{ImageRef, SiteName};

pub fn deserialize_site_name<'de, D>(deserializer: D) -> Result<SiteName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    SiteName::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageRef::parse(&s).map_err(serde::de::Error::custom)
}

/// An optional host list that, when given, must not be empty.
pub fn deserialize_hosts_option<'de, D>(deserializer: D) -> Result<Option<NonEmpty<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<Vec<String>> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(hosts) => NonEmpty::from_vec(hosts)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("ingress hosts list cannot be empty")),
    }
}

pub fn deserialize_memory_option<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    opt.map(|s| {
        parse_memory(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid memory size: {s}")))
    })
    .transpose()
}

/// Parse a memory string like "512m" or "1g" into bytes.
pub fn parse_memory(spec: &str) -> Option<u64> {
    let spec = spec.trim().to_lowercase();
    let (num_str, multiplier) = if let Some(n) = spec.strip_suffix('g') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = spec.strip_suffix('m') {
        (n, 1024 * 1024)
    } else if let Some(n) = spec.strip_suffix('k') {
        (n, 1024)
    } else {
        (spec.as_str(), 1)
    };
    num_str.parse::<u64>().ok()?.checked_mul(multiplier)
}
