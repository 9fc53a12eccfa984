//! Identifier policies: linear and reuse.

use adtape::values::TapeValue;
use adtape::{
    IndexManager, JacobianLinearTape, JacobianReuseTape, LinearIndexManager, ReuseIndexManager,
    TapeValues, PASSIVE,
};

#[test]
fn linear_issues_monotonic_identifiers() {
    let mut im = LinearIndexManager::default();
    let ids: Vec<_> = (0..5).map(|_| im.create()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(im.largest_created(), 5);
}

#[test]
fn linear_free_only_clears_the_handle() {
    let mut im = LinearIndexManager::default();
    let mut id = im.create();
    im.free(&mut id);
    assert_eq!(id, PASSIVE);
    assert_eq!(im.create(), 2);
}

#[test]
fn linear_assign_always_issues_new() {
    let mut im = LinearIndexManager::default();
    let mut id = PASSIVE;
    assert_eq!(im.assign(&mut id), 1);
    assert_eq!(im.assign(&mut id), 2);
    assert_eq!(id, 2);
}

#[test]
fn linear_reset_to_rewinds() {
    let mut im = LinearIndexManager::default();
    for _ in 0..3 {
        im.create();
    }
    let mark = im.largest_created();
    for _ in 0..4 {
        im.create();
    }
    im.reset_to(mark);
    assert_eq!(im.create(), 4);
    im.reset();
    assert_eq!(im.largest_created(), 0);
    assert_eq!(im.create(), 1);
}

#[test]
fn reuse_recycles_freed_identifiers() {
    let mut im = ReuseIndexManager::default();
    let mut a = im.create();
    let b = im.create();
    assert_eq!((a, b), (1, 2));

    im.free(&mut a);
    assert_eq!(a, PASSIVE);
    assert_eq!(im.unused_count(), 1);
    assert_eq!(im.create(), 1);
    assert_eq!(im.unused_count(), 0);
    assert_eq!(im.largest_created(), 2);
}

#[test]
fn reuse_free_of_passive_is_a_no_op() {
    let mut im = ReuseIndexManager::default();
    let mut id = PASSIVE;
    im.free(&mut id);
    assert_eq!(im.unused_count(), 0);
}

#[test]
fn reuse_assign_keeps_live_identifier() {
    let mut im = ReuseIndexManager::default();
    let mut id = PASSIVE;
    assert_eq!(im.assign(&mut id), 1);
    assert_eq!(im.assign(&mut id), 1);
    assert_eq!(im.largest_created(), 1);
}

#[test]
fn assign_unused_never_shares() {
    let mut im = ReuseIndexManager::default();
    let mut id = im.create();
    let before = id;
    let after = im.assign_unused(&mut id);
    // The old identifier goes back to the pool and comes straight back out.
    assert_eq!(after, before);
    assert_eq!(im.unused_count(), 0);

    let mut lin = LinearIndexManager::default();
    let mut id = lin.create();
    assert_eq!(lin.assign_unused(&mut id), 2);
}

#[test]
fn reuse_reset_keeps_identifiers() {
    let mut im = ReuseIndexManager::default();
    im.create();
    im.create();
    im.reset();
    assert_eq!(im.largest_created(), 2);
    assert_eq!(im.create(), 3);
}

#[test]
fn is_active_checks_passive() {
    assert!(!LinearIndexManager::is_active(PASSIVE));
    assert!(ReuseIndexManager::is_active(7));
}

#[test]
fn policies_report_statistics() {
    let mut im = ReuseIndexManager::default();
    let mut ids: Vec<_> = (0..4).map(|_| im.create()).collect();
    im.free(&mut ids[0]);
    let mut values = TapeValues::new("test");
    im.add_values(&mut values);
    assert_eq!(
        values.entry("Index manager", "Max. live indices"),
        Some(&TapeValue::Unsigned(4))
    );
    assert_eq!(
        values.entry("Index manager", "Cur. live indices"),
        Some(&TapeValue::Unsigned(3))
    );
    assert_eq!(
        values.entry("Index manager", "Indices stored"),
        Some(&TapeValue::Unsigned(1))
    );

    let mut lin = LinearIndexManager::default();
    lin.create();
    let mut values = TapeValues::new("test");
    lin.add_values(&mut values);
    assert_eq!(
        values.entry("Index manager", "Policy: linear, max. live indices"),
        Some(&TapeValue::Unsigned(1))
    );
}

#[test]
fn tapes_follow_their_policy() {
    let mut lin = JacobianLinearTape::<f64>::new();
    let mut id = lin.create_identifier();
    lin.free_identifier(&mut id);
    assert_eq!(lin.create_identifier(), 2);

    let mut reuse = JacobianReuseTape::<f64>::new();
    let mut id = reuse.create_identifier();
    reuse.free_identifier(&mut id);
    assert_eq!(reuse.create_identifier(), 1);
    assert_eq!(reuse.index_manager().unused_count(), 0);
}
