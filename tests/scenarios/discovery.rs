//! Test: work-unit discovery over fixture trees

use crate::helpers::*;
use batchflow::core::discovery::{discover, DiscoveryOptions};
use batchflow::OrchestratorError;

fn options() -> DiscoveryOptions {
    DiscoveryOptions::new("tree_info.yaml")
}

#[test]
fn test_discovery_is_deterministic() {
    let fixture = Fixture::standard();

    let first = discover(&fixture.project_root(), &options()).unwrap();
    let second = discover(&fixture.project_root(), &options()).unwrap();

    assert_eq!(first.len(), 12);
    assert_eq!(first, second);

    let manifests: Vec<_> = first.iter().map(|u| u.manifest_path.clone()).collect();
    let mut sorted = manifests.clone();
    sorted.sort();
    assert_eq!(manifests, sorted);
    assert_eq!(first[0].config_name, "loose");
    assert_eq!(first[0].pair_name, "piplus_pi0");
    assert_eq!(first[0].tag, DATA_TAG);
}

#[test]
fn test_manifest_without_source_is_skipped() {
    let fixture = Fixture::standard();
    let before = discover(&fixture.project_root(), &options()).unwrap().len();

    fixture.write_manifest("nominal", "piplus_pi0", MC_TAG, "ttree: events\n");
    let after = discover(&fixture.project_root(), &options()).unwrap();

    assert_eq!(after.len(), before - 1);
    assert!(!after
        .iter()
        .any(|u| u.config_name == "nominal" && u.pair_name == "piplus_pi0" && u.tag == MC_TAG));
}

#[test]
fn test_unparseable_manifest_is_skipped() {
    let fixture = Fixture::standard();
    fixture.write_manifest("tight", "piplus_piminus", DATA_TAG, "tfile: [unclosed\n");
    assert_eq!(discover(&fixture.project_root(), &options()).unwrap().len(), 11);
}

#[test]
fn test_config_filter_and_limit() {
    let fixture = Fixture::standard();

    let filtered = discover(
        &fixture.project_root(),
        &options().with_filter(&["configs/nominal.yaml".to_string()]),
    )
    .unwrap();
    assert_eq!(filtered.len(), 4);
    assert!(filtered.iter().all(|u| u.config_name == "nominal"));

    let limited = discover(&fixture.project_root(), &options().with_max_per_config(Some(1))).unwrap();
    assert_eq!(limited.len(), 3);
}

#[test]
fn test_missing_root_is_fatal() {
    let fixture = Fixture::new();
    let missing = fixture.workdir().join("out").join("nope");
    assert!(matches!(
        discover(&missing, &options()),
        Err(OrchestratorError::MissingRoot(_))
    ));
}

#[test]
fn test_empty_tree_yields_nothing() {
    let fixture = Fixture::new();
    assert!(discover(&fixture.project_root(), &options()).unwrap().is_empty());
}
