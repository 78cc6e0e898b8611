use baton::core::catalogue::{CatalogueEntry, CatalogueStore, UpsertOutcome};
use baton::core::error::BatonError;
use baton::core::store::Store;
use tempfile::tempdir;

fn entry(key: &str, by: &str, at: u64, notes: &str) -> CatalogueEntry {
    CatalogueEntry {
        key: key.to_string(),
        source_path: "/badc/ecmwf-era5/data/oper/an_sfc".into(),
        access_method: "posix-netcdf".into(),
        variables: vec!["2t".into(), "2d".into(), "10u".into(), "10v".into(), "msl".into()],
        notes: notes.to_string(),
        modified_by: by.to_string(),
        modified_at: at,
    }
}

fn fresh_store() -> (tempfile::TempDir, CatalogueStore) {
    let tmp = tempdir().unwrap();
    let store = Store::init(tmp.path()).unwrap();
    let cat = CatalogueStore::open(&store);
    (tmp, cat)
}

#[test]
fn test_upsert_insert_then_get() {
    let (_tmp, cat) = fresh_store();
    let outcome = cat.upsert(entry("era5-an-sfc", "hpc", 100, "")).unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);

    let got = cat.get("era5-an-sfc").unwrap().unwrap();
    assert_eq!(got.modified_by, "hpc");
    assert!(cat.get("era5-pl").unwrap().is_none());
}

#[test]
fn test_stale_upsert_leaves_store_unchanged() {
    let (_tmp, cat) = fresh_store();
    cat.upsert(entry("era5-an-sfc", "hpc", 200, "hourly instantaneous only"))
        .unwrap();

    let err = cat
        .upsert(entry("era5-an-sfc", "campus", 100, "older view"))
        .unwrap_err();
    match err {
        BatonError::StaleWrite {
            key,
            stored_location,
            stored_at,
        } => {
            assert_eq!(key, "era5-an-sfc");
            assert_eq!(stored_location, "hpc");
            assert_eq!(stored_at, 200);
        }
        other => panic!("expected StaleWrite, got {:?}", other),
    }

    let got = cat.get("era5-an-sfc").unwrap().unwrap();
    assert_eq!(got.notes, "hourly instantaneous only");
    assert_eq!(got.modified_at, 200);
}

#[test]
fn test_same_second_rewrite_from_same_location_applies() {
    // One location updating a key twice within the same second must not lose
    // the second write to the timestamp tie.
    let (_tmp, cat) = fresh_store();
    cat.upsert(entry("era5-an-sfc", "hpc", 100, "hourly instantaneous only"))
        .unwrap();
    let outcome = cat
        .upsert(entry("era5-an-sfc", "hpc", 100, "tp/ssrd need CDS download"))
        .unwrap();
    assert_eq!(
        outcome,
        UpsertOutcome::Overwritten {
            previous_location: "hpc".into(),
            previous_at: 100,
        }
    );
    let got = cat.get("era5-an-sfc").unwrap().unwrap();
    assert_eq!(got.notes, "tp/ssrd need CDS download");

    // an exact replay is still idempotent
    let outcome = cat
        .upsert(entry("era5-an-sfc", "hpc", 100, "tp/ssrd need CDS download"))
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Unchanged);
}

#[test]
fn test_divergent_same_second_tie_merges_to_same_winner() {
    // Two replicas hold the same key at the same (timestamp, location) but
    // with different content; sync breaks the tie identically on both sides.
    let (_tmp_a, cat_a) = fresh_store();
    let (_tmp_b, cat_b) = fresh_store();
    cat_a
        .merge(&[entry("era5-an-sfc", "hpc", 100, "first note")])
        .unwrap();
    cat_b
        .merge(&[entry("era5-an-sfc", "hpc", 100, "second note")])
        .unwrap();

    let a_entries = cat_a.list().unwrap();
    let b_entries = cat_b.list().unwrap();
    cat_a.merge(&b_entries).unwrap();
    cat_b.merge(&a_entries).unwrap();

    let final_a = cat_a.get("era5-an-sfc").unwrap().unwrap();
    let final_b = cat_b.get("era5-an-sfc").unwrap().unwrap();
    assert_eq!(final_a, final_b);
}

#[test]
fn test_overwrite_surfaces_the_losing_writer() {
    let (_tmp, cat) = fresh_store();
    cat.upsert(entry("era5-an-sfc", "campus", 100, "")).unwrap();
    let outcome = cat.upsert(entry("era5-an-sfc", "hpc", 200, "")).unwrap();
    assert_eq!(
        outcome,
        UpsertOutcome::Overwritten {
            previous_location: "campus".into(),
            previous_at: 100,
        }
    );
}

#[test]
fn test_concurrent_upsert_merges_to_same_winner_in_both_orders() {
    // Locations A and B write the same key with T1 < T2, then each merges
    // the other's replica. Both must end with B's version.
    let (_tmp_a, cat_a) = fresh_store();
    let (_tmp_b, cat_b) = fresh_store();

    cat_a.upsert(entry("era5-an-sfc", "campus", 100, "A's view"))
        .unwrap();
    cat_b.upsert(entry("era5-an-sfc", "hpc", 200, "B's view"))
        .unwrap();

    let a_entries = cat_a.list().unwrap();
    let b_entries = cat_b.list().unwrap();

    let report_a = cat_a.merge(&b_entries).unwrap();
    let report_b = cat_b.merge(&a_entries).unwrap();
    assert_eq!(report_a.adopted, 1);
    assert_eq!(report_b.kept_local, 1);

    let final_a = cat_a.get("era5-an-sfc").unwrap().unwrap();
    let final_b = cat_b.get("era5-an-sfc").unwrap().unwrap();
    assert_eq!(final_a, final_b);
    assert_eq!(final_a.notes, "B's view");
    assert_eq!(final_a.modified_by, "hpc");
}

#[test]
fn test_merge_is_associative_across_three_replicas() {
    // Same three writes merged in two different groupings converge.
    let writes = [
        entry("era5-an-sfc", "campus", 100, "a"),
        entry("era5-an-sfc", "hpc", 300, "b"),
        entry("stations-ghcnd", "laptop", 200, "c"),
        entry("stations-ghcnd", "campus", 150, "d"),
    ];

    let (_t1, left) = fresh_store();
    left.merge(&writes[0..2]).unwrap();
    left.merge(&writes[2..4]).unwrap();

    let (_t2, right) = fresh_store();
    right.merge(&writes[2..4]).unwrap();
    right.merge(&writes[0..2]).unwrap();

    assert_eq!(left.list().unwrap(), right.list().unwrap());
    assert_eq!(
        left.get("era5-an-sfc").unwrap().unwrap().notes,
        "b"
    );
    assert_eq!(
        left.get("stations-ghcnd").unwrap().unwrap().notes,
        "c"
    );
}

#[test]
fn test_merge_replay_is_idempotent() {
    let (_tmp, cat) = fresh_store();
    let writes = [entry("era5-an-sfc", "hpc", 100, "")];
    let first = cat.merge(&writes).unwrap();
    assert_eq!(first.adopted, 1);
    let second = cat.merge(&writes).unwrap();
    assert_eq!(second.adopted, 0);
    assert_eq!(second.unchanged, 1);
}

#[test]
fn test_file_is_rewritten_sorted_by_key() {
    let tmp = tempdir().unwrap();
    let store = Store::init(tmp.path()).unwrap();
    let cat = CatalogueStore::open(&store);
    cat.upsert(entry("stations-ghcnd", "hpc", 100, "")).unwrap();
    cat.upsert(entry("era5-an-sfc", "hpc", 100, "")).unwrap();

    let text = std::fs::read_to_string(store.catalogue_path()).unwrap();
    let keys: Vec<String> = text
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
        .map(|v| v["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["era5-an-sfc", "stations-ghcnd"]);
}
