// ABOUTME: Network alias under which a site component is reachable.
// ABOUTME: Aliases must be non-empty DNS-friendly strings.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkAliasError {
    #[error("network alias cannot be empty")]
    Empty,

    #[error("invalid character in network alias: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkAlias(String);

impl NetworkAlias {
    pub fn new(value: &str) -> Result<Self, NetworkAliasError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(NetworkAliasError::Empty);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(NetworkAliasError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_accepts_dotted_aliases() {
        let alias = NetworkAlias::new(" router.west ").unwrap();
        assert_eq!(alias.as_str(), "router.west");
    }

    #[test]
    fn rejects_spaces_inside() {
        assert_eq!(
            NetworkAlias::new("router west"),
            Err(NetworkAliasError::InvalidChar(' '))
        );
    }
}
