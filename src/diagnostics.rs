// ABOUTME: Collects non-fatal warnings raised while provisioning or updating a site.
// ABOUTME: Each warning is logged when recorded and handed back to the caller for display.

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Startup registration partially failed (systemd unit not enabled).
    pub fn startup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Startup,
            message: message.into(),
        }
    }

    /// A replaced container's backup could not be removed.
    pub fn backup_removal(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::BackupRemoval,
            message: message.into(),
        }
    }

    /// A migration task reported a warning.
    pub fn update(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Update,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    Startup,
    BackupRemoval,
    Update,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings_in_order() {
        let mut diag = Diagnostics::default();
        diag.warn(Warning::startup("systemctl not available"));
        diag.warn(Warning::backup_removal("west-router-20260101000000 still present"));

        let kinds: Vec<_> = diag.warnings().iter().map(|w| w.kind).collect();
        assert_eq!(kinds, [WarningKind::Startup, WarningKind::BackupRemoval]);
        assert_eq!(diag.into_warnings().len(), 2);
    }

    #[test]
    fn warning_serializes_kind_in_kebab_case() {
        let json = serde_json::to_string(&Warning::backup_removal("x")).unwrap();
        assert_eq!(json, r#"{"kind":"backup-removal","message":"x"}"#);
    }

    #[test]
    fn display_is_the_bare_message() {
        let warning = Warning::update("post task skipped");
        assert_eq!(warning.kind, WarningKind::Update);
        assert_eq!(warning.to_string(), "post task skipped");
    }
}
