//! Service adapter contract

use async_trait::async_trait;
use cairn_core::{Element, Fragment, TypeRegistry};

/// A connector to one external service. It hands the core pre-built
/// elements; how it obtains them is its own business.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Source name. Every element the adapter returns is owned by this source.
    fn name(&self) -> &str;

    /// Fetch the current elements of the service. Type references should be
    /// resolved through `registry` so they share the session's handles.
    async fn fetch(&self, registry: &TypeRegistry) -> anyhow::Result<Vec<Element>>;
}

/// Tag adapter elements as fragments. An element placed at a path takes the
/// path as its origin; anything else originates from the adapter itself.
pub fn into_fragments(source: &str, elements: Vec<Element>) -> Vec<Fragment> {
    elements
        .into_iter()
        .map(|element| {
            let origin = element
                .paths()
                .first()
                .map(|path| path.to_string())
                .unwrap_or_else(|| source.to_string());
            Fragment::new(element, origin)
        })
        .collect()
}
