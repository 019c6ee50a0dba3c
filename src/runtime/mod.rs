// ABOUTME: Runtime gateway: capability traits plus the bollard and in-memory implementations.
// ABOUTME: Also detects which local runtime socket to talk to.

mod bollard;
mod detection;
mod error;
mod memory;
pub mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use memory::{Fault, MemoryRuntime, Mutation, Op};
pub use traits::*;
pub use types::{RuntimeConfig, RuntimeEndpoint, RuntimeType};

/// Connect to the runtime described by the site configuration.
pub async fn connect(config: Option<&RuntimeConfig>) -> Result<BollardRuntime, RuntimeError> {
    let endpoint = detect_local(config)?;
    let runtime = BollardRuntime::connect(&endpoint)?;
    runtime.ping().await?;
    tracing::debug!(
        runtime = %endpoint.runtime_type,
        socket = %endpoint.socket_path,
        "connected to container runtime"
    );
    Ok(runtime)
}
