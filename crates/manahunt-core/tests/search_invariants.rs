use manahunt_core::{SearchResult, split_reduce};
use rand::{Rng, SeedableRng, rngs::SmallRng};

fn random_result(rng: &mut SmallRng) -> SearchResult {
    let peak_mana = if rng.random_ratio(1, 10) {
        i32::MIN
    } else {
        // narrow band so ties actually happen
        rng.random_range(-1_000..1_000)
    };
    let finder = if rng.random_ratio(1, 5) {
        None
    } else {
        Some(rng.random_range(0..500))
    };
    SearchResult { peak_mana, finder }
}

#[test]
fn fold_is_associative() {
    let mut rng = SmallRng::seed_from_u64(2024);
    for _ in 0..500 {
        let a = random_result(&mut rng);
        let b = random_result(&mut rng);
        let c = random_result(&mut rng);
        assert_eq!(
            a.fold(b).fold(c),
            a.fold(b.fold(c)),
            "a={a:?} b={b:?} c={c:?}"
        );
    }
}

#[test]
fn fold_keeps_the_earlier_operand_on_equal_peaks() {
    let mut rng = SmallRng::seed_from_u64(7);
    for _ in 0..200 {
        let peak_mana = rng.random_range(-50..50);
        let a = SearchResult {
            peak_mana,
            finder: Some(rng.random_range(0..100)),
        };
        let b = SearchResult {
            peak_mana,
            finder: Some(rng.random_range(0..100)),
        };
        assert_eq!(a.fold(b), a);
        assert_eq!(b.fold(a), b);
    }
}

#[test]
fn split_reduce_sums_match_the_sequential_fold() {
    let mut rng = SmallRng::seed_from_u64(99);
    for _ in 0..50 {
        let len = rng.random_range(0..300);
        let values: Vec<i32> = (0..len)
            .map(|_| rng.random_range(-10_000..10_000))
            .collect();
        let expected: i64 = values.iter().map(|&v| i64::from(v)).sum();
        let grain = rng.random_range(0..40);

        let mut scratch = values.clone();
        let sum = split_reduce(
            &mut scratch,
            0,
            grain,
            &|chunk: &mut [i32], _| chunk.iter().map(|&v| i64::from(v)).sum::<i64>(),
            &|a, b| a + b,
        );
        assert_eq!(sum, expected, "len={len} grain={grain}");
    }
}

#[test]
fn split_reduce_walks_leaves_left_to_right() {
    let mut rng = SmallRng::seed_from_u64(4242);
    for _ in 0..50 {
        let len = rng.random_range(1..200);
        let grain = rng.random_range(0..32);
        let mut items: Vec<u8> = vec![0; len];
        let order = split_reduce(
            &mut items,
            0,
            grain,
            &|chunk: &mut [u8], offset| (offset..offset + chunk.len()).collect::<Vec<_>>(),
            &|mut left, right| {
                left.extend(right);
                left
            },
        );
        let expected: Vec<usize> = (0..len).collect();
        assert_eq!(order, expected, "len={len} grain={grain}");
    }
}

#[test]
fn reduction_shape_does_not_change_the_winner() {
    let mut rng = SmallRng::seed_from_u64(31);
    for _ in 0..50 {
        let len = rng.random_range(0..120);
        let climbs: Vec<SearchResult> = (0..len)
            .map(|i| SearchResult {
                peak_mana: rng.random_range(-100..100),
                finder: Some(i),
            })
            .collect();
        let sequential = climbs
            .iter()
            .fold(SearchResult::identity(), |acc, &next| acc.fold(next));

        for grain in [1, 3, 8, usize::MAX] {
            let mut scratch = climbs.clone();
            let reduced = split_reduce(
                &mut scratch,
                0,
                grain,
                &|chunk: &mut [SearchResult], _| {
                    chunk
                        .iter()
                        .fold(SearchResult::identity(), |acc, &next| acc.fold(next))
                },
                &|left, right| left.fold(right),
            );
            assert_eq!(reduced, sequential, "len={len} grain={grain}");
        }
    }
}
