//! Integration tests for Cairn
//!
//! These tests drive the crates together the way a workspace is processed:
//! parse → merge → path index → state → reserialize → reparse, then a partial
//! fetch on top of the indexed state, then the CLI over a real directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use async_trait::async_trait;
use cairn_core::{
    ElemID, Element, IdKind, ObjectType, SourcePath, TypeRef, TypeRegistry, WorkspaceState, load_state, save_state,
};
use cairn_fetch::{Adapter, FetchPipeline};
use cairn_merge::merge_fragments;
use cairn_parser::{SOURCE_EXTENSION, SourceUnit, dump_elements, parse_units};
use serde_json::json;

const SOURCES: &[(&str, &str)] = &[
    (
        "salesforce/types.nacl",
        r#"
type salesforce_string is string {}
type salesforce_number is number {}
"#,
    ),
    (
        "salesforce/objects/standard/lead.nacl",
        r#"
model salesforce_lead {
  label = "Lead"
  salesforce_string name {
    label = "Name"
  }
}
"#,
    ),
    (
        "salesforce/objects/custom/lead.nacl",
        r#"
model salesforce_lead {
  salesforce_number Score__c {
    label = "Score"
  }
}
"#,
    ),
    (
        "salesforce/overrides/lead.nacl",
        r#"
model salesforce_lead {
  name {
    _required = true
  }
}
"#,
    ),
    (
        "salesforce/records/account/acme.nacl",
        r#"
instance salesforce_account acme {
  name = "Acme"
  tags = ["partner", "emea"]
}
"#,
    ),
];

fn units() -> Vec<SourceUnit> {
    SOURCES
        .iter()
        .map(|(origin, content)| SourceUnit::new(*origin, *content))
        .collect()
}

fn lead_id() -> ElemID {
    ElemID::new_type("salesforce", "lead")
}

/// Elements with paths cleared; paths are compared separately.
fn without_paths(elements: &[Element]) -> BTreeMap<ElemID, Element> {
    elements
        .iter()
        .cloned()
        .map(|mut element| {
            if let Some(paths) = element.paths_mut() {
                paths.clear();
            }
            (element.elem_id().clone(), element)
        })
        .collect()
}

#[test]
fn test_parse_merge_store_reserialize() {
    let registry = TypeRegistry::new();
    let parsed = parse_units(&units(), &registry);
    assert!(parsed.is_ok(), "unexpected errors: {:?}", parsed.errors);

    let merged = merge_fragments(&parsed.fragments, &registry);
    assert!(merged.conflicts.is_empty());
    assert_eq!(merged.elements.len(), 4);

    let Some(Element::Object(lead)) = merged.get(&lead_id()) else {
        panic!("lead missing");
    };
    assert_eq!(lead.annotations["label"], json!("Lead"));
    assert_eq!(lead.fields["name"].annotations["_required"], json!(true));
    assert_eq!(lead.fields["Score__c"].annotations["label"], json!("Score"));
    assert_eq!(lead.paths.len(), 3);

    // Store and reload.
    let dir = tempfile::tempdir().unwrap();
    let state = WorkspaceState::new();
    state.override_elements(merged.elements.clone(), None);
    state.override_path_index(&parsed.fragments);
    save_state(&state, dir.path()).unwrap();

    let loaded = load_state(dir.path()).unwrap().unwrap();
    assert_eq!(loaded.hash().unwrap(), state.hash().unwrap());
    assert_eq!(loaded.existing_sources().into_iter().collect::<Vec<_>>(), vec!["salesforce"]);
    let index = loaded.path_index();
    assert_eq!(
        index.paths(&lead_id().create_nested(IdKind::Field, "Score__c")),
        Some(&[SourcePath::new(["salesforce", "objects", "custom", "lead"])][..])
    );

    // Reserialize through the path index and parse the result again.
    let dumped = dump_elements(&loaded.get_all(), &index);
    let files: Vec<String> = dumped.keys().map(|p| p.to_file_name(SOURCE_EXTENSION)).collect();
    assert_eq!(
        files,
        vec![
            "salesforce/objects/custom/lead.nacl",
            "salesforce/objects/standard/lead.nacl",
            "salesforce/records/account/acme.nacl",
            "salesforce/types.nacl",
        ]
    );

    let reparsed_units: Vec<SourceUnit> = dumped
        .iter()
        .map(|(path, text)| SourceUnit::new(path.to_file_name(SOURCE_EXTENSION), text.clone()))
        .collect();
    let registry = TypeRegistry::new();
    let reparsed = parse_units(&reparsed_units, &registry);
    assert!(reparsed.is_ok(), "dump did not reparse: {:?}", reparsed.errors);
    let remerged = merge_fragments(&reparsed.fragments, &registry);
    assert!(remerged.conflicts.is_empty());
    assert_eq!(without_paths(&remerged.elements), without_paths(&merged.elements));

    let Some(Element::Object(relead)) = remerged.get(&lead_id()) else {
        panic!("lead missing after reparse");
    };
    assert_eq!(
        relead.paths,
        vec![
            SourcePath::new(["salesforce", "objects", "custom", "lead"]),
            SourcePath::new(["salesforce", "objects", "standard", "lead"]),
        ]
    );
}

struct HubspotAdapter;

#[async_trait]
impl Adapter for HubspotAdapter {
    fn name(&self) -> &str {
        "hubspot"
    }

    async fn fetch(&self, registry: &TypeRegistry) -> anyhow::Result<Vec<Element>> {
        let mut contact = ObjectType::new(ElemID::new_type("hubspot", "contact"));
        contact.add_field("email", registry.get_or_create("hubspot_string"));
        Ok(vec![Element::Object(
            contact.with_path(SourcePath::new(["hubspot", "objects", "contact"])),
        )])
    }
}

#[tokio::test]
async fn test_fetch_on_top_of_indexed_sources() {
    let registry = TypeRegistry::new();
    let parsed = parse_units(&units(), &registry);
    let merged = merge_fragments(&parsed.fragments, &registry);

    let state = Arc::new(WorkspaceState::new());
    state.override_elements(merged.elements, None);
    state.override_path_index(&parsed.fragments);
    let before = state.snapshot();

    let mut pipeline = FetchPipeline::new(state.clone());
    pipeline.add_adapter(Arc::new(HubspotAdapter));
    let outcome = pipeline.fetch(Some(&["hubspot".to_string()])).await.unwrap();

    assert_eq!(outcome.fetched, vec!["hubspot"]);
    assert_eq!(outcome.diff.added, vec![ElemID::new_type("hubspot", "contact")]);
    assert!(outcome.diff.removed.is_empty());

    let after = state.snapshot();
    assert_eq!(after.sources_update_dates["salesforce"], before.sources_update_dates["salesforce"]);
    for (id, element) in &before.elements {
        assert_eq!(after.elements.get(id), Some(element));
        assert_eq!(after.path_index.paths(id), before.path_index.paths(id));
    }
    assert_eq!(
        after.path_index.paths(&ElemID::new_type("hubspot", "contact")),
        Some(&[SourcePath::new(["hubspot", "objects", "contact"])][..])
    );
    let Some(Element::Object(contact)) = state.get(&ElemID::new_type("hubspot", "contact")) else {
        panic!("contact missing");
    };
    assert_eq!(contact.fields["email"].type_ref, TypeRef::detached(ElemID::new_type("hubspot", "string")));
}

// ── CLI ─────────────────────────────────────────────────

fn write_sources(root: &Path) {
    for (origin, content) in SOURCES {
        let path = root.join(origin);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

fn cairn(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_cairn"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute cairn")
}

#[test]
fn test_cli_check_index_state() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());

    let check = cairn(dir.path(), &["check"]);
    assert!(check.status.success(), "{}", String::from_utf8_lossy(&check.stdout));
    assert!(String::from_utf8_lossy(&check.stdout).contains("4 elements, 0 syntax errors, 0 conflicts"));

    let index = cairn(dir.path(), &["index"]);
    assert!(index.status.success());
    assert!(dir.path().join(".cairn/state.json").exists());

    let state = cairn(dir.path(), &["state", "--list"]);
    let stdout = String::from_utf8_lossy(&state.stdout);
    assert!(state.status.success());
    assert!(stdout.contains("version: 1"));
    assert!(stdout.contains("source salesforce: updated"));
    assert!(stdout.contains("salesforce.lead  [salesforce/objects/custom/lead"));

    let clear = cairn(dir.path(), &["clear"]);
    assert!(clear.status.success());
    assert!(!dir.path().join(".cairn/state.json").exists());
}

#[test]
fn test_cli_check_reports_syntax_errors() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    std::fs::write(dir.path().join("salesforce/broken.nacl"), "bla {\n}\n").unwrap();

    let check = cairn(dir.path(), &["check"]);
    let stdout = String::from_utf8_lossy(&check.stdout);
    assert!(!check.status.success());
    assert!(stdout.contains("salesforce/broken.nacl:1:1"), "{}", stdout);
    assert!(stdout.contains("invalid top-level syntax"));
    // The other units still merged.
    assert!(stdout.contains("4 elements, 1 syntax errors, 0 conflicts"));
}
