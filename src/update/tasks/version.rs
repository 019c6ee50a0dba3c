// ABOUTME: Final migration step recording this release's version in the router metadata.
// ABOUTME: Runs last and only for sites with a known, older version.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::TaskContext;
use crate::runtime::Gateway;
use crate::site::router_config::RouterConfigStore;
use crate::update::{ANY_VERSION, Priority, UpdateResult, UpdateTask};
use crate::version::Version;

pub struct VersionUpdateTask<R: ?Sized> {
    ctx: TaskContext<R>,
}

impl<R: ?Sized> VersionUpdateTask<R> {
    pub fn new(ctx: TaskContext<R>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl<R: Gateway + ?Sized + 'static> UpdateTask for VersionUpdateTask<R> {
    fn info(&self) -> String {
        "update site version".to_string()
    }

    fn version(&self) -> &str {
        ANY_VERSION
    }

    fn applies_to(&self, current_version: &str) -> bool {
        let current = Version::parse(current_version);
        !current.is_undefined()
            && current.less_recent_than(&Version::parse(crate::version::current()))
    }

    fn priority(&self) -> Priority {
        Priority::Last
    }

    async fn run(&self, _cancel: &CancellationToken) -> UpdateResult {
        let store = RouterConfigStore::new(self.ctx.runtime.as_ref(), &self.ctx.site);
        let mut config = match store.get().await {
            Ok(config) => config,
            Err(e) => return UpdateResult::failed(e),
        };
        let previous = std::mem::replace(
            &mut config.metadata.version,
            crate::version::current().to_string(),
        );
        match store.save(&config).await {
            Ok(()) => UpdateResult::changed(format!(
                "updated site version from {previous} to {}",
                config.metadata.version
            )),
            Err(e) => UpdateResult::failed(e),
        }
    }
}
