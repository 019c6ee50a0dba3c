// ABOUTME: XDG base directories used for the endpoint pointer, locks and startup artifacts.
// ABOUTME: Resolved once from the environment and passed down explicitly.

use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// `$XDG_CONFIG_HOME/siteforge`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/siteforge`
    pub data_dir: PathBuf,
    /// `$XDG_STATE_HOME/siteforge`
    pub state_dir: PathBuf,
    /// `$XDG_CONFIG_HOME/systemd/user`
    pub systemd_user_dir: PathBuf,
}

impl Paths {
    pub fn from_env() -> Result<Self> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let xdg = |var: &str, fallback: &str, what: &'static str| -> Result<PathBuf> {
            match std::env::var_os(var) {
                Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
                _ => home
                    .as_ref()
                    .map(|h| h.join(fallback))
                    .ok_or(Error::NoHomeDir(what)),
            }
        };
        let config_home = xdg("XDG_CONFIG_HOME", ".config", "config")?;
        Ok(Self {
            config_dir: config_home.join("siteforge"),
            data_dir: xdg("XDG_DATA_HOME", ".local/share", "data")?.join("siteforge"),
            state_dir: xdg("XDG_STATE_HOME", ".local/state", "state")?.join("siteforge"),
            systemd_user_dir: config_home.join("systemd/user"),
        })
    }

    /// Everything under one root; used for dry runs and tests.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            state_dir: root.join("state"),
            systemd_user_dir: root.join("systemd"),
        }
    }

    pub fn endpoint_file(&self) -> PathBuf {
        self.config_dir.join(super::endpoint::ENDPOINT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honours_xdg_variables() {
        temp_env::with_vars(
            [
                ("HOME", Some("/home/tester")),
                ("XDG_CONFIG_HOME", Some("/cfg")),
                ("XDG_DATA_HOME", None),
                ("XDG_STATE_HOME", None),
            ],
            || {
                let paths = Paths::from_env().unwrap();
                assert_eq!(paths.config_dir, PathBuf::from("/cfg/siteforge"));
                assert_eq!(paths.systemd_user_dir, PathBuf::from("/cfg/systemd/user"));
                assert_eq!(
                    paths.data_dir,
                    PathBuf::from("/home/tester/.local/share/siteforge")
                );
                assert_eq!(
                    paths.endpoint_file(),
                    PathBuf::from("/cfg/siteforge/runtime.yml")
                );
            },
        );
    }

    #[test]
    fn fails_without_home_or_xdg() {
        temp_env::with_vars(
            [
                ("HOME", None::<&str>),
                ("XDG_CONFIG_HOME", None),
                ("XDG_DATA_HOME", None),
                ("XDG_STATE_HOME", None),
            ],
            || {
                assert!(matches!(Paths::from_env(), Err(Error::NoHomeDir(_))));
            },
        );
    }
}
