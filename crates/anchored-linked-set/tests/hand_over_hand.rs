#![cfg(not(loom))]
#![allow(unused_crate_dependencies, reason = "These are tests, not the main crate.")]

mod all;


use std::{collections::BTreeMap, rc::Rc};

use oorandom::Rand32;

use anchored_linked_set::{ConcurrentSortedSet as _, HandOverHandSet};
use self::all::DropTracked;


all::tests_for_all_sets!(HandOverHandSet);


// Unique to `HandOverHandSet`: removed keys are dropped right away.
#[test]
fn removed_key_is_dropped_immediately() {
    let counter = Rc::new(());
    let set = HandOverHandSet::new();

    set.insert(DropTracked(1, Rc::clone(&counter)));
    set.insert(DropTracked(2, Rc::clone(&counter)));
    assert_eq!(Rc::strong_count(&counter), 3);

    assert!(set.remove(&DropTracked(1, Rc::clone(&counter))));
    assert_eq!(Rc::strong_count(&counter), 2);
}
