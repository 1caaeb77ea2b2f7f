use arena::{Arena, ArenaConfig, ArenaError, Offset};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Release(usize),
    Coalesce,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0_usize..96).prop_map(Op::Alloc),
        3 => any::<usize>().prop_map(Op::Release),
        1 => Just(Op::Coalesce),
    ]
}

fn check(arena: &Arena) -> Result<(), TestCaseError> {
    prop_assert!(arena.verify().is_ok(), "{:?}\n{}", arena.verify(), arena);
    let stats = arena.stats();
    prop_assert_eq!(stats.live_bytes + stats.free_bytes, stats.high_water_mark);
    for set in [arena.live(), arena.free()] {
        let starts: Vec<_> = set.iter().map(|c| c.start).collect();
        prop_assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }
    Ok(())
}

proptest! {
    #[test]
    fn invariants_hold_after_every_step(ops in proptest::collection::vec(op(), 1..200)) {
        let mut arena = Arena::new(ArenaConfig::new(2048, 32));
        let mut handed_out: Vec<Offset> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(size) => match arena.allocate(size) {
                    Ok(off) => {
                        prop_assert!(!handed_out.contains(&off));
                        prop_assert!(arena.bytes(off).unwrap().len() >= size);
                        handed_out.push(off);
                    }
                    Err(ArenaError::OutOfMemory { .. })
                    | Err(ArenaError::ConfigurationExhausted { .. }) => {}
                    Err(other) => prop_assert!(false, "unexpected {other}"),
                },
                Op::Release(pick) if !handed_out.is_empty() => {
                    let idx = pick % handed_out.len();
                    match arena.release(handed_out[idx]) {
                        Ok(()) => {
                            handed_out.swap_remove(idx);
                        }
                        Err(ArenaError::ConfigurationExhausted { .. }) => {}
                        Err(other) => prop_assert!(false, "unexpected {other}"),
                    }
                }
                Op::Release(_) => {}
                Op::Coalesce => {
                    arena.coalesce();
                }
            }
            check(&arena)?;
            prop_assert_eq!(arena.live().len(), handed_out.len());
        }
    }

    #[test]
    fn releasing_everything_reclaims(sizes in proptest::collection::vec(0_usize..128, 1..20), seed in any::<u64>()) {
        let mut arena = Arena::new(ArenaConfig::new(4096, 32));
        let mut offs: Vec<Offset> = sizes.iter().map(|&s| arena.allocate(s).unwrap()).collect();

        // deterministic shuffle from the seed
        let mut state = seed | 1;
        for i in (1..offs.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            offs.swap(i, (state % (i as u64 + 1)) as usize);
        }
        for off in offs {
            arena.release(off).unwrap();
        }
        let report = arena.coalesce();
        prop_assert!(report.reclaimed);
        prop_assert_eq!(arena.high_water_mark(), 0);
        prop_assert!(arena.free().is_empty());
    }

    #[test]
    fn double_release_always_rejected(sizes in proptest::collection::vec(1_usize..64, 1..10), pick in any::<usize>()) {
        let mut arena = Arena::new(ArenaConfig::new(1024, 16));
        let offs: Vec<Offset> = sizes.iter().map(|&s| arena.allocate(s).unwrap()).collect();
        let victim = offs[pick % offs.len()];
        arena.release(victim).unwrap();
        prop_assert_eq!(
            arena.release(victim),
            Err(ArenaError::InvalidRelease { offset: victim })
        );
    }
}
