// ABOUTME: Certificate authority and credential bookkeeping for a site.
// ABOUTME: The volume-backed handler keeps one volume per CA or credential with a JSON descriptor.

use super::labels;
use super::volume_files::{self, VolumeFileError};
use crate::runtime::{VolumeError, VolumeFilters, VolumeOps};
use crate::types::SiteName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

pub const DESCRIPTOR_FILE: &str = "descriptor.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateAuthority {
    pub name: String,
    pub subject: String,
    /// Bumped each time the CA is reissued; anything signed by an older serial is revoked.
    #[serde(default)]
    pub serial: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    /// Name of the issuing certificate authority.
    pub ca: String,
    pub subject: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub client: bool,
    #[serde(default)]
    pub serial: u64,
}

impl CertificateAuthority {
    /// The same authority, reissued.
    pub fn reissued(&self) -> Self {
        Self {
            serial: self.serial + 1,
            ..self.clone()
        }
    }
}

impl Credential {
    /// The same credential, reissued.
    pub fn reissued(&self) -> Self {
        Self {
            serial: self.serial + 1,
            ..self.clone()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("certificate authority {0} does not exist")]
    UnknownCa(String),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    File(#[from] VolumeFileError),

    #[error("corrupt descriptor in {volume}: {reason}")]
    Corrupt { volume: String, reason: String },
}

#[async_trait]
pub trait CredentialHandler: Send + Sync {
    async fn create_ca(&self, ca: &CertificateAuthority) -> Result<(), CredentialError>;

    async fn delete_ca(&self, name: &str) -> Result<(), CredentialError>;

    async fn create_credential(&self, credential: &Credential) -> Result<(), CredentialError>;

    async fn delete_credential(&self, name: &str) -> Result<(), CredentialError>;

    async fn list_cas(&self) -> Result<Vec<CertificateAuthority>, CredentialError>;

    async fn list_credentials(&self) -> Result<Vec<Credential>, CredentialError>;
}

#[derive(Clone, Copy)]
enum Kind {
    Ca,
    Credential,
}

impl Kind {
    fn label(self) -> &'static str {
        match self {
            Kind::Ca => "ca",
            Kind::Credential => "credential",
        }
    }
}

/// Stores descriptors in volumes named `<site>-<name>`.
pub struct VolumeCredentialHandler<'a, R: ?Sized> {
    runtime: &'a R,
    site: &'a SiteName,
}

impl<'a, R: VolumeOps + ?Sized> VolumeCredentialHandler<'a, R> {
    pub fn new(runtime: &'a R, site: &'a SiteName) -> Self {
        Self { runtime, site }
    }

    pub fn volume_for(&self, name: &str) -> String {
        super::volume_name(self.site, name)
    }

    async fn store<T: Serialize + Sync>(
        &self,
        kind: Kind,
        name: &str,
        descriptor: &T,
    ) -> Result<(), CredentialError> {
        let volume = self.volume_for(name);
        let mut volume_labels = labels::owned(self.site);
        volume_labels.insert(labels::CREDENTIAL.to_string(), kind.label().to_string());
        volume_files::ensure_volume(self.runtime, &volume, &volume_labels).await?;
        let json = serde_json::to_vec_pretty(descriptor).map_err(|e| CredentialError::Corrupt {
            volume: volume.clone(),
            reason: e.to_string(),
        })?;
        volume_files::write_file(self.runtime, &volume, DESCRIPTOR_FILE, &json).await?;
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, volume: &str) -> Result<T, CredentialError> {
        let raw = volume_files::read_file(self.runtime, volume, DESCRIPTOR_FILE).await?;
        serde_json::from_slice(&raw).map_err(|e| CredentialError::Corrupt {
            volume: volume.to_string(),
            reason: e.to_string(),
        })
    }

    async fn list<T: DeserializeOwned + Send>(&self, kind: Kind) -> Result<Vec<T>, CredentialError> {
        let mut filters = VolumeFilters {
            labels: labels::owned(self.site),
        };
        filters
            .labels
            .insert(labels::CREDENTIAL.to_string(), kind.label().to_string());
        let mut out = Vec::new();
        for volume in self.runtime.list_volumes(&filters).await? {
            out.push(self.load(&volume.name).await?);
        }
        Ok(out)
    }

    async fn delete(&self, name: &str) -> Result<(), CredentialError> {
        match self.runtime.remove_volume(&self.volume_for(name), true).await {
            Ok(()) | Err(VolumeError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<R: VolumeOps + ?Sized> CredentialHandler for VolumeCredentialHandler<'_, R> {
    async fn create_ca(&self, ca: &CertificateAuthority) -> Result<(), CredentialError> {
        self.store(Kind::Ca, &ca.name, ca).await?;
        tracing::debug!(ca = %ca.name, "certificate authority recorded");
        Ok(())
    }

    async fn delete_ca(&self, name: &str) -> Result<(), CredentialError> {
        self.delete(name).await
    }

    async fn create_credential(&self, credential: &Credential) -> Result<(), CredentialError> {
        let ca_volume = self.volume_for(&credential.ca);
        if !self.runtime.volume_exists(&ca_volume).await? {
            return Err(CredentialError::UnknownCa(credential.ca.clone()));
        }
        self.store(Kind::Credential, &credential.name, credential)
            .await?;
        tracing::debug!(credential = %credential.name, ca = %credential.ca, "credential recorded");
        Ok(())
    }

    async fn delete_credential(&self, name: &str) -> Result<(), CredentialError> {
        self.delete(name).await
    }

    async fn list_cas(&self) -> Result<Vec<CertificateAuthority>, CredentialError> {
        self.list(Kind::Ca).await
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>, CredentialError> {
        self.list(Kind::Credential).await
    }
}
