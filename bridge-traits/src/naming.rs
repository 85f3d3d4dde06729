//! Destination path templating.

use crate::dam::DamAssetMetadata;
use crate::tenant::NamingOptions;

/// Renders the destination path for an asset.
///
/// Implementations must be pure: the same metadata and options always yield the same path.
pub trait AssetPathTemplater: Send + Sync {
    fn render(&self, asset: &DamAssetMetadata, options: &NamingOptions) -> String;
}
