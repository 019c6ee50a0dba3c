// ABOUTME: Site name validation.
// ABOUTME: Site names become container name prefixes and DNS labels, so they follow RFC 1123.

use super::network_alias::NetworkAlias;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SiteNameError {
    #[error("site name cannot be empty")]
    Empty,

    #[error("site name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("site name must start and end with a letter or digit")]
    BadEdge,

    #[error("invalid character in site name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteName(String);

impl SiteName {
    pub fn new(value: &str) -> Result<Self, SiteNameError> {
        if value.is_empty() {
            return Err(SiteNameError::Empty);
        }
        if value.len() > 63 {
            return Err(SiteNameError::TooLong);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(SiteNameError::InvalidChar(c));
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(SiteNameError::BadEdge);
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Site names are a subset of the alias alphabet.
    pub fn to_alias(&self) -> NetworkAlias {
        match NetworkAlias::new(&self.0) {
            Ok(alias) => alias,
            Err(_) => unreachable!("validated site name is a valid alias"),
        }
    }
}

impl fmt::Display for SiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SiteName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SiteName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SiteName::new(&raw).map_err(serde::de::Error::custom)
    }
}
