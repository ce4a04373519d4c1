macro_rules! tests_for_all_sets {
    ($set:ident $(,)?) => {
        // ================================
        //  Empty Set
        // ================================

        #[test]
        fn empty_set() {
            let mut set = $set::<u32>::new();

            assert!(set.is_empty());
            assert_eq!(set.len(), 0);
            assert!(!set.contains(&0));
            assert!(!set.contains(&u32::MAX));
            assert!(!set.remove(&0));
            assert!(set.to_vec().is_empty());
            assert_eq!(set.check_invariants(), Ok(0));

            let set: $set<u32> = Default::default();
            assert!(set.is_empty());

            assert_eq!(format!("{set:?}"), "{}");
        }

        // ================================
        //  Sequential behavior
        // ================================

        #[test]
        fn insert_keeps_ascending_order() {
            let mut set = $set::new();

            set.insert(5);
            set.insert(2);
            set.insert(9);

            assert!(set.contains(&2));
            assert!(set.contains(&5));
            assert!(set.contains(&9));
            assert!(!set.contains(&7));
            assert!(!set.contains(&1));
            assert!(!set.contains(&10));

            assert_eq!(set.to_vec(), vec![2, 5, 9]);
            assert_eq!(set.len(), 3);
            assert_eq!(set.check_invariants(), Ok(3));
            assert_eq!(format!("{set:?}"), "{2, 5, 9}");
        }

        #[test]
        fn remove_then_contains() {
            let mut set = $set::new();

            set.insert(10);
            assert!(set.contains(&10));
            assert!(set.remove(&10));
            assert!(!set.contains(&10));
            assert!(!set.remove(&10));

            assert!(set.is_empty());
            assert_eq!(set.check_invariants(), Ok(0));
        }

        #[test]
        fn remove_is_idempotent() {
            let mut set = $set::new();
            for key in [3, 1, 4, 15, 9, 2, 6] {
                set.insert(key);
            }

            assert!(set.remove(&4));
            for _ in 0..5 {
                assert!(!set.remove(&4));
            }

            assert_eq!(set.to_vec(), vec![1, 2, 3, 6, 9, 15]);
            assert_eq!(set.check_invariants(), Ok(6));
        }

        #[test]
        fn remove_first_middle_last() {
            let mut set = $set::new();
            for key in 0..10_u8 {
                set.insert(key);
            }

            assert!(set.remove(&0));
            assert!(set.remove(&5));
            assert!(set.remove(&9));
            assert!(!set.remove(&10));

            assert_eq!(set.to_vec(), vec![1, 2, 3, 4, 6, 7, 8]);
            assert_eq!(set.check_invariants(), Ok(7));

            for key in 0..10_u8 {
                assert_eq!(set.contains(&key), ![0, 5, 9].contains(&key));
            }
        }

        #[test]
        fn duplicates_are_kept() {
            let mut set = $set::new();

            set.insert(4);
            set.insert(4);
            set.insert(2);
            set.insert(4);

            assert_eq!(set.to_vec(), vec![2, 4, 4, 4]);
            assert_eq!(set.len(), 4);

            // Each removal takes out one copy.
            assert!(set.remove(&4));
            assert!(set.contains(&4));
            assert!(set.remove(&4));
            assert!(set.remove(&4));
            assert!(!set.contains(&4));
            assert!(!set.remove(&4));

            assert_eq!(set.to_vec(), vec![2]);
            assert_eq!(set.check_invariants(), Ok(1));
        }

        #[test]
        fn owned_keys() {
            let mut set = $set::new();

            for word in ["pear", "apple", "fig", "banana", "cherry"] {
                set.insert(word.to_owned());
            }
            assert!(set.remove(&"fig".to_owned()));
            assert!(!set.contains(&"fig".to_owned()));
            assert!(set.contains(&"apple".to_owned()));

            assert_eq!(set.to_vec(), ["apple", "banana", "cherry", "pear"]);
            assert_eq!(set.check_invariants(), Ok(4));
        }

        #[test]
        fn random_operations_match_btree() {
            let mut set = $set::new();
            // A multiset, since duplicates are allowed.
            let mut model: BTreeMap<u16, usize> = BTreeMap::new();
            let mut prng = Rand32::new(0x5eed);

            for _ in 0..2_000 {
                let key = prng.rand_range(0..64) as u16;

                match prng.rand_range(0..3) {
                    0 => {
                        set.insert(key);
                        *model.entry(key).or_default() += 1;
                    }
                    1 => {
                        let count = model.get(&key).copied().unwrap_or(0);
                        match count {
                            0 => {}
                            1 => {
                                model.remove(&key);
                            }
                            _ => {
                                model.insert(key, count - 1);
                            }
                        }
                        assert_eq!(set.remove(&key), count > 0);
                    }
                    _ => assert_eq!(set.contains(&key), model.contains_key(&key)),
                }
            }

            let expected = model
                .iter()
                .flat_map(|(&key, &count)| std::iter::repeat_n(key, count))
                .collect::<Vec<_>>();

            assert_eq!(set.to_vec(), expected);
            assert_eq!(set.check_invariants(), Ok(expected.len()));
        }

        #[test]
        fn keys_are_dropped() {
            let counter = Rc::new(());

            {
                let set = $set::new();
                for key in 0..8 {
                    set.insert(DropTracked(key, Rc::clone(&counter)));
                }
                assert!(set.remove(&DropTracked(3, Rc::clone(&counter))));
                assert!(!set.contains(&DropTracked(3, Rc::clone(&counter))));
            }

            assert_eq!(Rc::strong_count(&counter), 1);
        }
    };
}

pub(crate) use tests_for_all_sets;


/// A key which holds a reference count, to detect whether the set dropped it.
#[derive(Debug)]
pub(crate) struct DropTracked(pub u32, pub std::rc::Rc<()>);

impl PartialEq for DropTracked {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for DropTracked {}

impl PartialOrd for DropTracked {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DropTracked {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}
