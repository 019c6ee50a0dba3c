// ABOUTME: Blue-green replacement of a single running container under the same name.
// ABOUTME: Any failure restores the original container; success removes it best-effort.

mod error;

pub use error::{ReplaceError, ReplaceStep};

use crate::diagnostics::Warning;
use crate::runtime::{ContainerOps, ContainerSpec, ContainerState, ImageOps};
use crate::site::compensation::Compensations;
use crate::types::{ContainerId, ImageRef};
use chrono::Local;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Suffix format for the backup and candidate container names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a successful replacement.
#[derive(Debug, Clone)]
pub struct Replaced {
    /// Spec the container now runs with.
    pub spec: ContainerSpec,
    /// Problems that did not undo the swap, such as a backup that could not be removed.
    pub warnings: Vec<Warning>,
}

/// Recreate container `name` from its own snapshot after `customize` edits it.
///
/// The candidate is created as `<name>-new-<timestamp>`, the original is
/// stopped and parked as `<name>-<timestamp>`, and the candidate takes over
/// `name` before it is started. If any of those steps fails, the steps that
/// already ran are reverted newest first, leaving the original running under
/// its name. `customize` must not touch `spec.name`.
pub async fn replace<R, F>(runtime: &R, name: &str, customize: F) -> Result<Replaced, ReplaceError>
where
    R: ContainerOps + ?Sized,
    F: FnOnce(&mut ContainerSpec) + Send,
{
    let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let candidate_name = format!("{name}-new-{stamp}");
    let backup_name = format!("{name}-{stamp}");

    let original = runtime
        .inspect_container(&ContainerId::new(name))
        .await
        .map_err(|e| ReplaceError::at(name, ReplaceStep::Inspect, e))?;

    let mut spec = original.spec.clone();
    spec.name = candidate_name.clone();
    customize(&mut spec);
    if spec.name != candidate_name {
        return Err(ReplaceError::NameChanged {
            name: name.to_string(),
            renamed: spec.name,
        });
    }

    let original_id = original.id.clone();
    let was_running = original.state == ContainerState::Running;
    let mut comps = Compensations::new();

    let candidate_id = match runtime.create_container(&spec).await {
        Ok(id) => id,
        Err(e) => return Err(ReplaceError::at(name, ReplaceStep::CreateCandidate, e)),
    };
    tracing::debug!(container = %name, candidate = %candidate_name, "created replacement");
    {
        let id = candidate_id.clone();
        comps.push(format!("remove {candidate_name}"), move || async move {
            if let Err(e) = runtime.stop_container(&id, STOP_TIMEOUT).await {
                tracing::debug!(container = %id, error = %e, "candidate did not stop, forcing removal");
            }
            runtime.remove_container(&id, true).await
        });
    }

    if let Err(e) = runtime.stop_container(&original_id, STOP_TIMEOUT).await {
        comps.unwind().await;
        return Err(ReplaceError::at(name, ReplaceStep::StopOriginal, e));
    }
    if was_running {
        let id = original_id.clone();
        comps.push(format!("restart {name}"), move || async move {
            runtime.start_container(&id).await
        });
    }

    if let Err(e) = runtime.rename_container(&original_id, &backup_name).await {
        comps.unwind().await;
        return Err(ReplaceError::at(name, ReplaceStep::RenameOriginal, e));
    }
    {
        let id = original_id.clone();
        let restored = name.to_string();
        comps.push(format!("rename {backup_name} back to {name}"), move || async move {
            runtime.rename_container(&id, &restored).await
        });
    }

    if let Err(e) = runtime.rename_container(&candidate_id, name).await {
        comps.unwind().await;
        return Err(ReplaceError::at(name, ReplaceStep::RenameCandidate, e));
    }
    {
        let id = candidate_id.clone();
        let parked = candidate_name.clone();
        comps.push(format!("rename {name} back to {candidate_name}"), move || async move {
            runtime.rename_container(&id, &parked).await
        });
    }

    if let Err(e) = runtime.start_container(&candidate_id).await {
        comps.unwind().await;
        return Err(ReplaceError::at(name, ReplaceStep::StartCandidate, e));
    }
    comps.commit();

    let mut warnings = Vec::new();
    if let Err(e) = runtime.remove_container(&original_id, true).await {
        tracing::debug!(container = %name, backup = %backup_name, error = %e, "backup left behind");
        warnings.push(Warning::backup_removal(format!(
            "could not remove previous container {backup_name}: {e}"
        )));
    }

    spec.name = name.to_string();
    tracing::info!(container = %name, image = %spec.image, "container replaced");
    Ok(Replaced { spec, warnings })
}

/// Pull `image` and then replace container `name` with only its image changed.
pub async fn replace_image<R>(
    runtime: &R,
    name: &str,
    image: &ImageRef,
    cancel: &CancellationToken,
) -> Result<Replaced, ReplaceError>
where
    R: ContainerOps + ImageOps + ?Sized,
{
    runtime
        .pull_image(image, None, cancel)
        .await
        .map_err(|source| ReplaceError::Pull {
            name: name.to_string(),
            source,
        })?;
    let image = image.to_string();
    replace(runtime, name, move |spec| spec.image = image).await
}
