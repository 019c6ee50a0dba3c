// ABOUTME: Persistence of the router configuration document inside the site's config volume.
// ABOUTME: Its metadata block is the source of truth for site identity, mode and version.

use super::volume_files::{self, VolumeFileError};
use super::layout::{
    CERTS_PATH, EDGE_TARGET_PORT, INTER_ROUTER_TARGET_PORT, LOCAL_CA, LOCAL_SERVER_CREDENTIAL,
    SITE_CA, SITE_SERVER_CREDENTIAL,
};
use super::{Mode, Site, SiteInfo, labels};
use crate::runtime::{VolumeError, VolumeOps};
use crate::types::SiteName;
use serde::{Deserialize, Serialize};

pub const ROUTER_CONFIG_FILE: &str = "skrouterd.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterMetadata {
    /// Site name.
    pub id: String,
    pub mode: Mode,
    pub site_id: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    pub role: String,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslProfile {
    pub name: String,
    pub ca_cert_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    pub metadata: RouterMetadata,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub ssl_profiles: Vec<SslProfile>,
}

const LOCAL_AMQPS_PORT: u16 = 5671;

impl RouterConfig {
    /// The configuration a freshly created site starts with.
    pub fn initial(site: &Site) -> Self {
        let profile = |name: &str, ca: &str| SslProfile {
            name: name.to_string(),
            ca_cert_file: format!("{CERTS_PATH}/{ca}/ca.crt"),
            cert_file: Some(format!("{CERTS_PATH}/{name}/tls.crt")),
            private_key_file: Some(format!("{CERTS_PATH}/{name}/tls.key")),
        };
        let listener = |name: &str, role: &str, port: u16, ssl_profile: &str| Listener {
            name: name.to_string(),
            role: role.to_string(),
            host: String::new(),
            port,
            ssl_profile: Some(ssl_profile.to_string()),
        };
        RouterConfig {
            metadata: RouterMetadata {
                id: site.name().to_string(),
                mode: site.info.mode,
                site_id: site.info.id.clone(),
                version: site.info.version.clone(),
            },
            listeners: vec![
                listener("amqps", "normal", LOCAL_AMQPS_PORT, LOCAL_SERVER_CREDENTIAL),
                listener(
                    "interior-listener",
                    "inter-router",
                    INTER_ROUTER_TARGET_PORT,
                    SITE_SERVER_CREDENTIAL,
                ),
                listener("edge-listener", "edge", EDGE_TARGET_PORT, SITE_SERVER_CREDENTIAL),
            ],
            ssl_profiles: vec![
                profile(LOCAL_SERVER_CREDENTIAL, LOCAL_CA),
                profile(SITE_SERVER_CREDENTIAL, SITE_CA),
            ],
        }
    }

    pub fn info(&self) -> Result<SiteInfo, RouterConfigError> {
        let name = SiteName::new(&self.metadata.id)
            .map_err(|e| RouterConfigError::Invalid(format!("metadata id: {e}")))?;
        Ok(SiteInfo {
            name,
            id: self.metadata.site_id.clone(),
            version: self.metadata.version.clone(),
            mode: self.metadata.mode,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterConfigError {
    #[error("router configuration not found in volume {0}")]
    NotFound(String),

    #[error(transparent)]
    File(#[from] VolumeFileError),

    #[error("invalid router configuration: {0}")]
    Invalid(String),
}

impl From<VolumeError> for RouterConfigError {
    fn from(e: VolumeError) -> Self {
        RouterConfigError::File(VolumeFileError::Volume(e))
    }
}

/// Router configuration stored as JSON in a dedicated volume.
pub struct RouterConfigStore<'a, R: ?Sized> {
    runtime: &'a R,
    site: &'a SiteName,
}

impl<'a, R: VolumeOps + ?Sized> RouterConfigStore<'a, R> {
    pub fn new(runtime: &'a R, site: &'a SiteName) -> Self {
        Self { runtime, site }
    }

    pub fn volume(&self) -> String {
        super::volume_name(self.site, super::ROUTER_CONFIG_VOLUME)
    }

    pub async fn get(&self) -> Result<RouterConfig, RouterConfigError> {
        let volume = self.volume();
        let raw = match volume_files::read_file(self.runtime, &volume, ROUTER_CONFIG_FILE).await {
            Ok(raw) => raw,
            Err(VolumeFileError::Volume(VolumeError::NotFound(_))) => {
                return Err(RouterConfigError::NotFound(volume));
            }
            Err(VolumeFileError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                return Err(RouterConfigError::NotFound(volume));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|e| RouterConfigError::Invalid(e.to_string()))
    }

    /// Write the document, creating the volume on first save.
    pub async fn save(&self, config: &RouterConfig) -> Result<(), RouterConfigError> {
        let volume = self.volume();
        volume_files::ensure_volume(self.runtime, &volume, &labels::owned(self.site)).await?;
        let json = serde_json::to_vec_pretty(config)
            .map_err(|e| RouterConfigError::Invalid(e.to_string()))?;
        volume_files::write_file(self.runtime, &volume, ROUTER_CONFIG_FILE, &json).await?;
        tracing::debug!(%volume, version = %config.metadata.version, "router configuration saved");
        Ok(())
    }

    /// Remove the configuration volume; absent is not an error.
    pub async fn remove(&self) -> Result<(), RouterConfigError> {
        match self.runtime.remove_volume(&self.volume(), true).await {
            Ok(()) | Err(VolumeError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_uses_camel_case_keys() {
        let config = RouterConfig {
            metadata: RouterMetadata {
                id: "west".into(),
                mode: Mode::Interior,
                site_id: "abc".into(),
                version: "0.3.0".into(),
            },
            listeners: Vec::new(),
            ssl_profiles: Vec::new(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["metadata"]["siteId"], "abc");
        assert_eq!(json["metadata"]["mode"], "interior");

        let info = config.info().unwrap();
        assert_eq!(info.name.as_str(), "west");
        assert_eq!(info.version, "0.3.0");
    }

    #[test]
    fn invalid_site_name_in_metadata_is_rejected() {
        let config: RouterConfig = serde_json::from_str(
            r#"{"metadata":{"id":"Not Valid","mode":"interior","siteId":"x","version":"1.0.0"}}"#,
        )
        .unwrap();
        assert!(matches!(config.info(), Err(RouterConfigError::Invalid(_))));
    }
}
