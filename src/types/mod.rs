// ABOUTME: Validated identifiers and names shared across the crate.
// ABOUTME: Phantom-typed resource ids keep container, network and volume ids apart.

mod id;
mod image_ref;
mod network_alias;
mod site_name;

pub use id::{ContainerId, Id, NetworkId, VolumeId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use network_alias::{NetworkAlias, NetworkAliasError};
pub use site_name::{SiteName, SiteNameError};
