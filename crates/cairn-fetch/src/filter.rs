//! Post-fetch extension hook

use async_trait::async_trait;
use cairn_core::Fragment;

/// Sees (and may rewrite) every collected fragment before the merge. Filters
/// run in registration order.
#[async_trait]
pub trait FetchFilter: Send + Sync {
    fn name(&self) -> &str;

    async fn on_fetch(&self, fragments: &mut Vec<Fragment>) -> anyhow::Result<()>;
}
