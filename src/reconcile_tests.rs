use super::*;
use crate::error::QcError;
use crate::record::{write_done, CompletedResult};
use crate::test_support::{set_mtime, Fixture, CHECK};

#[test]
fn derived_paths_follow_templates() {
    let fx = Fixture::new();
    let artifact = fx.artifact("A_1_T1w.nii.gz");
    let items = fx.items();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.artifact, artifact);
    assert_eq!(item.overlay, artifact);
    assert_eq!(item.output_dir, fx.base.join("qc/A_1"));
    assert_eq!(item.done_file, fx.base.join("qc/A_1/t1.done"));
    assert_eq!(item.lock_file, fx.base.join("qc/A_1/t1.lock"));
    assert_eq!(item.variables["subj"], "A");
    assert_eq!(item.variables["sess"], "1");
    assert!(item.overlay_exists);
    assert!(!item.is_done && !item.is_locked);
    assert_eq!(item.rating, None);
}

#[test]
fn completed_result_round_trips_through_reconcile() {
    let fx = Fixture::new();
    let artifact = fx.artifact("A_1_T1w.nii.gz");
    let item = fx.item(&artifact);
    fs::create_dir_all(&item.output_dir).unwrap();
    write_done(
        &item.done_file,
        &CompletedResult {
            rating: Some(2.5),
            flagged: true,
            user: "ana".to_string(),
            timestamp: Local::now(),
        },
    )
    .unwrap();

    let items = fx.items();
    assert!(items[0].is_done);
    assert_eq!(items[0].rating, Some(2.5));
    assert_eq!(items[0].flagged, Some(true));
    assert!(items[0].done_at.is_some());
}

#[test]
fn done_record_newer_than_artifact_survives() {
    let fx = Fixture::new();
    let artifact = fx.artifact("A_1_T1w.nii.gz");
    let done = fx.done(&artifact, 3.0, Some(false));
    set_mtime(&artifact, 1_700_000_000);
    set_mtime(&done, 1_700_000_100);

    let items = fx.items();
    assert!(items[0].is_done);
    assert_eq!(items[0].rating, Some(3.0));
    assert!(done.exists());
}

#[test]
fn stale_done_record_is_deleted_and_stays_not_done() {
    let fx = Fixture::new();
    let artifact = fx.artifact("A_1_T1w.nii.gz");
    let done = fx.done(&artifact, 0.0, Some(true));
    set_mtime(&done, 1_700_000_000);
    set_mtime(&artifact, 1_700_000_100);

    let first = fx.items();
    assert!(!done.exists());
    assert!(!first[0].is_done);
    assert_eq!(first[0].rating, None);
    assert_eq!(first[0].flagged, None);
    assert!(!first[0].is_failed());

    let second = fx.items();
    assert!(!second[0].is_done);
    assert_eq!(second[0].rating, None);
}

#[test]
fn reconcile_never_touches_locks() {
    let fx = Fixture::new();
    let artifact = fx.artifact("A_1_T1w.nii.gz");
    let lock = fx.lock(&artifact);
    let items = fx.items();
    assert!(items[0].is_locked);
    assert!(lock.exists());
}

#[test]
fn missing_overlay_is_flagged_not_fatal() {
    let fx = Fixture::new();
    let spec = crate::config::CheckSpec {
        primary: "{subj}_{sess}_T1w.nii.gz".to_string(),
        overlay: "{subj}_{sess}_mask.nii.gz".to_string(),
        output_dir: "qc/{subj}".to_string(),
    };
    let def = CheckDefinition::from_spec("mask", &spec).unwrap();
    fx.artifact("A_1_T1w.nii.gz");
    let items = reconcile(&def, &fx.base, &fx.discovered()).unwrap();
    assert!(!items[0].overlay_exists);
    assert_eq!(items[0].overlay, fx.base.join("A_1_mask.nii.gz"));
}

#[test]
fn staleness_is_judged_against_the_overlay() {
    let fx = Fixture::new();
    let spec = crate::config::CheckSpec {
        primary: "{subj}_{sess}_T1w.nii.gz".to_string(),
        overlay: "{subj}_{sess}_mask.nii.gz".to_string(),
        output_dir: "qc/{subj}_{sess}".to_string(),
    };
    let def = CheckDefinition::from_spec(CHECK, &spec).unwrap();
    let artifact = fx.artifact("A_1_T1w.nii.gz");
    let overlay = fx.artifact("A_1_mask.nii.gz");
    let done = fx.done(&artifact, 3.0, Some(false));

    // A newer primary alone does not invalidate the verdict.
    set_mtime(&overlay, 1_700_000_000);
    set_mtime(&done, 1_700_000_100);
    set_mtime(&artifact, 1_700_000_200);
    let items = reconcile(&def, &fx.base, &fx.discovered()).unwrap();
    assert!(items[0].is_done);
    assert!(done.exists());

    set_mtime(&overlay, 1_700_000_300);
    let items = reconcile(&def, &fx.base, &fx.discovered()).unwrap();
    assert!(!items[0].is_done);
    assert!(!done.exists());
}

#[test]
fn path_outside_template_is_a_match_error() {
    let fx = Fixture::new();
    let stray = fx.artifact("notes.txt");
    let err = reconcile(&fx.def, &fx.base, &[stray]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<QcError>(),
        Some(QcError::Match { .. })
    ));
}
