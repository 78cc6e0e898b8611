use baton::core::handoff::{HandoffDraft, HandoffLog, InProgressItem, LogFilter};
use baton::core::store::Store;
use chrono::NaiveDate;
use tempfile::tempdir;

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn draft(location: &str, d: &str, next: &[&str]) -> HandoffDraft {
    let mut draft = HandoffDraft::new(location, date(d));
    draft.next_steps = next.iter().map(|s| s.to_string()).collect();
    draft
}

#[test]
fn test_append_assigns_sequence_per_location_and_date() {
    let tmp = tempdir().unwrap();
    let store = Store::init(tmp.path()).unwrap();
    let log = HandoffLog::open(&store);

    let id1 = log.append(draft("hpc", "2026-08-20", &[])).unwrap();
    let id2 = log.append(draft("hpc", "2026-08-20", &[])).unwrap();
    let id3 = log.append(draft("campus", "2026-08-20", &[])).unwrap();
    let id4 = log.append(draft("hpc", "2026-08-21", &[])).unwrap();

    assert_eq!((id1.seq, id2.seq), (1, 2));
    assert_eq!(id3.seq, 1);
    assert_eq!(id4.seq, 1);
}

#[test]
fn test_list_order_is_identity_order_not_append_order() {
    let tmp = tempdir().unwrap();
    let store = Store::init(tmp.path()).unwrap();
    let log = HandoffLog::open(&store);

    // Append out of date order; listing must come back (date, seq) ascending.
    log.append(draft("laptop", "2026-08-22", &[])).unwrap();
    log.append(draft("hpc", "2026-08-20", &[])).unwrap();
    log.append(draft("campus", "2026-08-21", &[])).unwrap();
    log.append(draft("hpc", "2026-08-20", &[])).unwrap();

    let listed = log.list(&LogFilter::default()).unwrap();
    let ids: Vec<String> = listed.iter().map(|r| r.id().to_string()).collect();
    assert_eq!(
        ids,
        vec![
            "hpc/2026-08-20/1",
            "hpc/2026-08-20/2",
            "campus/2026-08-21/1",
            "laptop/2026-08-22/1",
        ]
    );
}

#[test]
fn test_list_filters() {
    let tmp = tempdir().unwrap();
    let store = Store::init(tmp.path()).unwrap();
    let log = HandoffLog::open(&store);
    log.append(draft("hpc", "2026-08-19", &[])).unwrap();
    log.append(draft("campus", "2026-08-20", &[])).unwrap();
    log.append(draft("laptop", "2026-08-21", &[])).unwrap();

    let only_hpc = log
        .list(&LogFilter {
            location: Some("hpc".into()),
            ..LogFilter::default()
        })
        .unwrap();
    assert_eq!(only_hpc.len(), 1);
    assert_eq!(only_hpc[0].location, "hpc");

    let not_hpc = log
        .list(&LogFilter {
            exclude_location: Some("hpc".into()),
            ..LogFilter::default()
        })
        .unwrap();
    assert!(not_hpc.iter().all(|r| r.location != "hpc"));

    let recent = log
        .list(&LogFilter {
            since_date: Some(date("2026-08-20")),
            ..LogFilter::default()
        })
        .unwrap();
    assert_eq!(recent.len(), 2);
}

#[test]
fn test_merge_is_union_and_commutative() {
    let tmp_a = tempdir().unwrap();
    let tmp_b = tempdir().unwrap();
    let log_a = HandoffLog::open(&Store::init(tmp_a.path()).unwrap());
    let log_b = HandoffLog::open(&Store::init(tmp_b.path()).unwrap());

    log_a.append(draft("campus", "2026-08-20", &["QC the 2016 files"]))
        .unwrap();
    log_a.append(draft("campus", "2026-08-21", &[])).unwrap();
    log_b.append(draft("hpc", "2026-08-20", &["resubmit 2017 batch"]))
        .unwrap();

    let a_records = log_a.load().unwrap();
    let b_records = log_b.load().unwrap();

    let adopted_by_a = log_a.merge(&b_records).unwrap();
    let adopted_by_b = log_b.merge(&a_records).unwrap();
    assert_eq!(adopted_by_a, 1);
    assert_eq!(adopted_by_b, 2);

    let final_a = log_a.list(&LogFilter::default()).unwrap();
    let final_b = log_b.list(&LogFilter::default()).unwrap();
    assert_eq!(final_a, final_b);

    // merging again adopts nothing
    assert_eq!(log_a.merge(&b_records).unwrap(), 0);
}

#[test]
fn test_merged_replicas_converge_byte_for_byte() {
    let tmp_a = tempdir().unwrap();
    let tmp_b = tempdir().unwrap();
    let store_a = Store::init(tmp_a.path()).unwrap();
    let store_b = Store::init(tmp_b.path()).unwrap();
    let log_a = HandoffLog::open(&store_a);
    let log_b = HandoffLog::open(&store_b);

    log_a.append(draft("campus", "2026-08-21", &[])).unwrap();
    log_b.append(draft("hpc", "2026-08-20", &[])).unwrap();

    let a_records = log_a.load().unwrap();
    let b_records = log_b.load().unwrap();
    log_a.merge(&b_records).unwrap();
    log_b.merge(&a_records).unwrap();

    let text_a = std::fs::read_to_string(store_a.handoff_log_path()).unwrap();
    let text_b = std::fs::read_to_string(store_b.handoff_log_path()).unwrap();
    assert_eq!(text_a, text_b);
}

#[test]
fn test_superset_replica_converges_byte_for_byte() {
    // A already holds everything B has, but in append order; B's copy is
    // identity-sorted. A adopts nothing from B yet must still end up with
    // the identical file, or the transport sees spurious diffs.
    let tmp_a = tempdir().unwrap();
    let tmp_b = tempdir().unwrap();
    let store_a = Store::init(tmp_a.path()).unwrap();
    let store_b = Store::init(tmp_b.path()).unwrap();
    let log_a = HandoffLog::open(&store_a);
    let log_b = HandoffLog::open(&store_b);

    log_a.append(draft("laptop", "2026-08-22", &[])).unwrap();
    log_a.append(draft("hpc", "2026-08-20", &[])).unwrap();
    log_b.merge(&log_a.load().unwrap()).unwrap();

    let adopted = log_a.merge(&log_b.load().unwrap()).unwrap();
    assert_eq!(adopted, 0);

    let text_a = std::fs::read_to_string(store_a.handoff_log_path()).unwrap();
    let text_b = std::fs::read_to_string(store_b.handoff_log_path()).unwrap();
    assert_eq!(text_a, text_b);
}

#[test]
fn test_records_survive_round_trip_through_the_file() {
    let tmp = tempdir().unwrap();
    let store = Store::init(tmp.path()).unwrap();
    let log = HandoffLog::open(&store);

    let mut d = draft("hpc", "2026-08-20", &["QC the 2016 files"]);
    d.completed = vec!["extracted 2010-2015 for 882 cities".into()];
    d.in_progress = vec![InProgressItem {
        text: "2016-2023 extraction".into(),
        state: "job resubmitted, check quota".into(),
    }];
    d.issue_refs = vec!["HW-ER/12.3".into()];
    let id = log.append(d).unwrap();

    let loaded = log.load().unwrap();
    assert_eq!(loaded.len(), 1);
    let r = &loaded[0];
    assert_eq!(r.id(), id);
    assert_eq!(r.completed, vec!["extracted 2010-2015 for 882 cities"]);
    assert_eq!(r.in_progress[0].state, "job resubmitted, check quota");
    assert_eq!(r.issue_refs, vec!["HW-ER/12.3"]);
}

#[test]
fn test_malformed_log_line_is_an_error_not_a_skip() {
    let tmp = tempdir().unwrap();
    let store = Store::init(tmp.path()).unwrap();
    let log = HandoffLog::open(&store);
    log.append(draft("hpc", "2026-08-20", &[])).unwrap();
    std::fs::write(
        store.handoff_log_path(),
        "{\"not\": \"a record\"}\n",
    )
    .unwrap();
    assert!(log.load().is_err());
}
