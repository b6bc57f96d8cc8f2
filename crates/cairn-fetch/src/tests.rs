//! Unit tests for cairn-fetch

use crate::*;
use async_trait::async_trait;
use cairn_core::{
    ElemID, Element, Fragment, IdKind, InstanceElement, ObjectType, SourcePath, TypeRegistry, Values,
    WorkspaceState, load_state,
};
use cairn_merge::LayoutPolicy;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct StaticAdapter {
    name: String,
    elements: Vec<Element>,
}

impl StaticAdapter {
    fn new(name: &str, elements: Vec<Element>) -> Arc<Self> {
        Arc::new(StaticAdapter {
            name: name.to_string(),
            elements,
        })
    }
}

#[async_trait]
impl Adapter for StaticAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, registry: &TypeRegistry) -> anyhow::Result<Vec<Element>> {
        let mut elements = self.elements.clone();
        for element in &mut elements {
            registry.intern_element(element);
        }
        Ok(elements)
    }
}

struct BrokenAdapter;

#[async_trait]
impl Adapter for BrokenAdapter {
    fn name(&self) -> &str {
        "broken"
    }

    async fn fetch(&self, _registry: &TypeRegistry) -> anyhow::Result<Vec<Element>> {
        anyhow::bail!("connection refused")
    }
}

/// Tracks how many fetches run at once.
struct SlowAdapter {
    name: String,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Adapter for SlowAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _registry: &TypeRegistry) -> anyhow::Result<Vec<Element>> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![object(&self.name, "thing", &["id"])])
    }
}

struct InjectFilter;

#[async_trait]
impl FetchFilter for InjectFilter {
    fn name(&self) -> &str {
        "inject"
    }

    async fn on_fetch(&self, fragments: &mut Vec<Fragment>) -> anyhow::Result<()> {
        let type_ref = cairn_core::TypeRef::detached(ElemID::new_type("crm", "settings"));
        let mut value = Values::new();
        value.insert("enabled".to_string(), json!(true));
        fragments.push(Fragment::new(InstanceElement::new(type_ref, "global", value), "crm"));
        Ok(())
    }
}

/// Adds a copy of another source's element at a different path.
struct ForeignPathFilter;

#[async_trait]
impl FetchFilter for ForeignPathFilter {
    fn name(&self) -> &str {
        "foreign-path"
    }

    async fn on_fetch(&self, fragments: &mut Vec<Fragment>) -> anyhow::Result<()> {
        let account = ObjectType::new(ElemID::new_type("erp", "account"))
            .with_path(SourcePath::new(["erp", "side_channel", "account"]));
        fragments.push(Fragment::new(account, "erp/side_channel/account"));
        Ok(())
    }
}

struct FailingFilter;

#[async_trait]
impl FetchFilter for FailingFilter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn on_fetch(&self, _fragments: &mut Vec<Fragment>) -> anyhow::Result<()> {
        anyhow::bail!("side channel unavailable")
    }
}

fn object(adapter: &str, name: &str, fields: &[&str]) -> Element {
    let mut object = ObjectType::new(ElemID::new_type(adapter, name));
    for field in fields {
        object.add_field(*field, cairn_core::TypeRef::detached(ElemID::new_type(adapter, "string")));
    }
    let path = SourcePath::new([adapter, "objects", name]);
    Element::Object(object.with_path(path))
}

fn names(ids: &[ElemID]) -> Vec<String> {
    ids.iter().map(ElemID::full_name).collect()
}

#[tokio::test]
async fn test_fetch_all_sources() {
    let state = Arc::new(WorkspaceState::new());
    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline
        .add_adapter(StaticAdapter::new("crm", vec![object("crm", "lead", &["name"])]))
        .add_adapter(StaticAdapter::new("erp", vec![object("erp", "invoice", &["total"])]));

    let outcome = pipeline.fetch(None).await.unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.fetched, vec!["crm", "erp"]);
    assert_eq!(names(&outcome.diff.added), vec!["crm.lead", "erp.invoice"]);
    assert_eq!(outcome.diff.sequence, 1);

    assert_eq!(state.len(), 2);
    let dates = state.sources_update_dates();
    assert!(dates.contains_key("crm") && dates.contains_key("erp"));
    assert_eq!(
        state.path_index().paths(&ElemID::new_type("crm", "lead")),
        Some(&[SourcePath::new(["crm", "objects", "lead"])][..])
    );
}

#[tokio::test]
async fn test_partial_fetch_leaves_other_sources_alone() {
    let state = Arc::new(WorkspaceState::new());
    let mut first = FetchPipeline::new(state.clone());
    first
        .add_adapter(StaticAdapter::new("crm", vec![object("crm", "lead", &["name"])]))
        .add_adapter(StaticAdapter::new("erp", vec![object("erp", "invoice", &["total"])]));
    first.fetch(None).await.unwrap();

    let before = state.snapshot();
    let erp_id = ElemID::new_type("erp", "invoice");

    let mut second = FetchPipeline::new(state.clone());
    second
        .add_adapter(StaticAdapter::new("crm", vec![object("crm", "lead", &["name", "phone"])]))
        .add_adapter(StaticAdapter::new("erp", vec![]));
    let outcome = second.fetch(Some(&["crm".to_string()])).await.unwrap();

    assert_eq!(outcome.fetched, vec!["crm"]);
    assert_eq!(names(&outcome.diff.modified), vec!["crm.lead"]);

    let after = state.snapshot();
    assert_eq!(after.elements.get(&erp_id), before.elements.get(&erp_id));
    assert_eq!(after.sources_update_dates["erp"], before.sources_update_dates["erp"]);
    assert_eq!(after.path_index.paths(&erp_id), before.path_index.paths(&erp_id));
    assert!(after.sources_update_dates["crm"] >= before.sources_update_dates["crm"]);
}

#[tokio::test]
async fn test_failed_source_is_reported_and_kept() {
    let state = Arc::new(WorkspaceState::new());
    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline.add_adapter(StaticAdapter::new("broken", vec![object("broken", "old", &["x"])]));
    pipeline.fetch(None).await.unwrap();

    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline
        .add_adapter(Arc::new(BrokenAdapter))
        .add_adapter(StaticAdapter::new("crm", vec![object("crm", "lead", &["name"])]));
    let outcome = pipeline.fetch(None).await.unwrap();

    assert_eq!(outcome.fetched, vec!["crm"]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].source_name(), Some("broken"));
    assert!(outcome.failed[0].to_string().contains("connection refused"));
    assert!(state.get(&ElemID::new_type("broken", "old")).is_some());
    assert!(outcome.diff.removed.is_empty());
}

#[tokio::test]
async fn test_nothing_fetched_leaves_state() {
    let state = Arc::new(WorkspaceState::new());
    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline.add_adapter(Arc::new(BrokenAdapter));
    let outcome = pipeline.fetch(None).await.unwrap();

    assert!(outcome.fetched.is_empty());
    assert!(outcome.diff.is_empty());
    assert!(state.sources_update_dates().is_empty());
}

#[tokio::test]
async fn test_filters_see_fragments_before_merge() {
    let state = Arc::new(WorkspaceState::new());
    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline
        .add_adapter(StaticAdapter::new("crm", vec![object("crm", "lead", &["name"])]))
        .add_filter(Box::new(InjectFilter));
    pipeline.fetch(None).await.unwrap();

    let id = ElemID::new_type("crm", "settings").create_nested(IdKind::Instance, "global");
    let Some(Element::Instance(settings)) = state.get(&id) else {
        panic!("injected instance missing");
    };
    assert_eq!(settings.value["enabled"], json!(true));
}

#[tokio::test]
async fn test_partial_fetch_ignores_foreign_fragments_from_filters() {
    let state = Arc::new(WorkspaceState::new());
    let mut first = FetchPipeline::new(state.clone());
    first
        .add_adapter(StaticAdapter::new("crm", vec![object("crm", "lead", &["name"])]))
        .add_adapter(StaticAdapter::new("erp", vec![object("erp", "account", &["code"])]));
    first.fetch(None).await.unwrap();
    let before = state.snapshot();
    let account = ElemID::new_type("erp", "account");

    let mut second = FetchPipeline::new(state.clone());
    second
        .add_adapter(StaticAdapter::new("crm", vec![object("crm", "lead", &["name"])]))
        .add_filter(Box::new(ForeignPathFilter));
    second.fetch(Some(&["crm".to_string()])).await.unwrap();

    let after = state.snapshot();
    assert_eq!(after.elements.get(&account), before.elements.get(&account));
    assert_eq!(
        after.path_index.paths(&account),
        Some(&[SourcePath::new(["erp", "objects", "account"])][..])
    );
    assert_eq!(after.sources_update_dates["erp"], before.sources_update_dates["erp"]);
}

#[tokio::test]
async fn test_failing_filter_aborts_before_state_change() {
    let state = Arc::new(WorkspaceState::new());
    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline
        .add_adapter(StaticAdapter::new("crm", vec![object("crm", "lead", &["name"])]))
        .add_filter(Box::new(FailingFilter));
    let err = pipeline.fetch(None).await.unwrap_err();

    assert!(matches!(err, FetchError::Filter { .. }));
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_descriptor_promoted_during_fetch() {
    let mut value = Values::new();
    value.insert(
        "fields".to_string(),
        json!([{
            "fullName": "Status",
            "type": "Picklist",
            "valueSet": { "valueSetDefinition": { "value": [
                { "fullName": "YES", "default": "true" },
                { "fullName": "NO", "default": "false" }
            ] } }
        }]),
    );
    let descriptor = InstanceElement::new(
        cairn_core::TypeRef::detached(ElemID::new_type("crm", "CustomObject")),
        "lead",
        value,
    );

    let state = Arc::new(WorkspaceState::new());
    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline.add_adapter(StaticAdapter::new("crm", vec![Element::Instance(descriptor)]));
    let outcome = pipeline.fetch(None).await.unwrap();

    assert!(outcome.conflicts.is_empty());
    let Some(Element::Object(lead)) = state.get(&ElemID::new_type("crm", "lead")) else {
        panic!("expected promoted object type");
    };
    let status = lead.field("Status").unwrap();
    assert_eq!(status.annotations["_values"], json!(["YES", "NO"]));
    assert_eq!(status.annotations["_default"], json!("YES"));
}

#[tokio::test]
async fn test_split_elements_keep_field_paths() {
    let Element::Object(lead) = object("crm", "lead", &["dummy", "CustomField__c"]) else {
        unreachable!();
    };
    let parts: Vec<Element> = LayoutPolicy::default()
        .split_object(&lead)
        .into_iter()
        .map(Element::Object)
        .collect();

    let state = Arc::new(WorkspaceState::new());
    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline.add_adapter(StaticAdapter::new("crm", parts));
    pipeline.fetch(None).await.unwrap();

    let Some(Element::Object(merged)) = state.get(&ElemID::new_type("crm", "lead")) else {
        panic!("expected merged object type");
    };
    assert_eq!(merged.fields.len(), 2);
    let index = state.path_index();
    assert_eq!(
        index.paths(&merged.elem_id.create_nested(IdKind::Field, "CustomField__c")),
        Some(&[SourcePath::new(["crm", "objects", "custom", "lead"])][..])
    );
    assert_eq!(
        index.paths(&merged.elem_id.create_nested(IdKind::Field, "dummy")),
        Some(&[SourcePath::new(["crm", "objects", "standard", "lead"])][..])
    );
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let state = Arc::new(WorkspaceState::new());
    let mut pipeline = FetchPipeline::with_options(
        state.clone(),
        FetchOptions {
            max_concurrency: 2,
            ..Default::default()
        },
    );
    for name in ["a", "b", "c", "d", "e"] {
        pipeline.add_adapter(Arc::new(SlowAdapter {
            name: name.to_string(),
            running: running.clone(),
            peak: peak.clone(),
        }));
    }

    let outcome = pipeline.fetch(None).await.unwrap();
    assert_eq!(outcome.fetched.len(), 5);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(state.len(), 5);
}

#[tokio::test]
async fn test_persisted_after_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(WorkspaceState::new());
    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline
        .add_adapter(StaticAdapter::new("crm", vec![object("crm", "lead", &["name"])]))
        .persist_to(dir.path());
    pipeline.fetch(None).await.unwrap();

    let loaded = load_state(dir.path()).unwrap().unwrap();
    assert_eq!(loaded.hash().unwrap(), state.hash().unwrap());
    assert_eq!(loaded.list(), state.list());
}
