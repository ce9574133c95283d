//! Integration tests for the selection, projection and attack pipeline

use std::path::PathBuf;

use partenc::selection::{uniqueness_score, Edge, EdgeIndex};
use partenc::{
    load_households, project, BlockLayout, BlockMetrics, Cell, Dataset, ExperimentConfig, Harness,
    HeBackendKind, Household, Marks, Progression, Quantized, StrategyKind, Target, ValueTables,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BLOCK_SIZE: usize = 1024;

/// Households whose values are drawn from a wide range, so that short
/// windows are unique with overwhelming probability.
fn random_population(households: usize, len: usize, seed: u64) -> Vec<Household> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..households)
        .map(|h| {
            let raw = (0..len).map(|_| Quantized(rng.gen_range(0..1_000_000))).collect();
            Household::new(format!("h{h}.csv"), raw)
        })
        .collect()
}

fn quick_config(ratio: f64) -> ExperimentConfig {
    ExperimentConfig {
        ratios: Some(vec![ratio]),
        atd_sizes: Progression {
            start: 24,
            step: 24,
            count: 2,
        },
        inner_cap: 300,
        macro_cap: 3,
        seed: 11,
        ..Default::default()
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("partenc-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_attack_succeeds_without_encryption() {
    let households = random_population(4, 2 * BLOCK_SIZE, 1);

    for strategy in [
        StrategyKind::GlobalGreedy,
        StrategyKind::HouseholdGreedy,
        StrategyKind::Random,
        StrategyKind::PairwiseUniqueness,
    ] {
        let config = ExperimentConfig {
            strategy,
            unique_atd: true,
            ..quick_config(0.0)
        };
        let report = Harness::new(config).unwrap().run(&households).unwrap();

        assert!(report.diagnostics.is_empty());
        assert_eq!(report.attacks.len(), 2);
        for record in &report.attacks {
            assert_eq!(record.encrypted_records, 0);
            assert!(record.trials >= 100);
            assert!((record.mean - 1.0).abs() < 1e-12, "{strategy}: {}", record.mean);
            assert_eq!(record.std_error, 0.0);
        }
    }
}

#[test]
fn test_attack_impossible_under_full_encryption() {
    let households = random_population(4, 2 * BLOCK_SIZE, 2);

    for strategy in [StrategyKind::GlobalGreedy, StrategyKind::Random] {
        let config = ExperimentConfig {
            strategy,
            min_percent_matched: vec![100.0, 50.0],
            ..quick_config(100.0)
        };
        let report = Harness::new(config).unwrap().run(&households).unwrap();

        assert_eq!(report.attacks.len(), 4);
        for record in &report.attacks {
            assert_eq!(record.encrypted_records, 4 * 2 * BLOCK_SIZE);
            assert_eq!(record.mean, 0.0);
            assert!(record.trials > 0);
        }
    }
}

#[test]
fn test_sweep_is_reproducible() {
    let households = random_population(5, 3 * BLOCK_SIZE, 3);
    let config = ExperimentConfig {
        strategy: StrategyKind::Random,
        household_counts: vec![3],
        ratios: Some(vec![0.0, 40.0]),
        ..quick_config(0.0)
    };

    let first = Harness::new(config.clone()).unwrap().run(&households).unwrap();
    let second = Harness::new(config).unwrap().run(&households).unwrap();
    assert_eq!(first, second);
    assert!(first.attacks.iter().all(|r| r.households == 3));
}

#[test]
fn test_end_to_end_from_csv_files() {
    let data_dir = scratch_dir("data");
    let output = scratch_dir("output");
    let households = random_population(3, BLOCK_SIZE + 100, 4);
    for household in &households {
        let mut text = String::from("timestamp,usage\n");
        for (i, value) in household.raw().iter().enumerate() {
            text.push_str(&format!("{},{}\r\n", i, value));
        }
        std::fs::write(data_dir.join(household.filename()), text).unwrap();
    }

    let config = ExperimentConfig {
        data_dir: Some(data_dir.clone()),
        dataset: Dataset::Electricity,
        target: Target::Transition,
        he_backend: HeBackendKind::Clear,
        ratios: None,
        ..quick_config(0.0)
    };
    let harness = Harness::new(config).unwrap();
    let loaded = load_households(&harness.config().data_dir(), harness.config().max_records).unwrap();
    assert_eq!(loaded, households);

    let report = harness.run(&loaded).unwrap();
    report.write_csv(&output).unwrap();

    // B = 2, so the ceil-steps are 0, 1 and 2 blocks per household
    assert_eq!(report.attacks.len(), 3 * 2);
    assert_eq!(report.he_timings.len(), 3);
    let total: f64 = households.iter().flat_map(|h| h.raw()).map(|v| v.to_f64()).sum();
    for timing in &report.he_timings {
        assert!((timing.sum - total).abs() < 1e-3);
        assert!(timing.variance.is_some());
    }

    let mut reader = csv::Reader::from_path(output.join("attack.csv")).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "strategy");
    assert_eq!(&headers[10], "mean");
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 6);
    assert_eq!(&rows[0][0], "global-greedy");
    assert_eq!(&rows[0][1], "electricity");
    assert!(output.join("he_timing.csv").exists());
    assert!(output.join("diagnostics.csv").exists());

    std::fs::remove_dir_all(&data_dir).unwrap();
    std::fs::remove_dir_all(&output).unwrap();
}

#[test]
fn test_edge_decode_example() {
    let index = EdgeIndex::new(3, 2);
    assert_eq!(index.count(), 12);
    assert_eq!(
        index.decode(0),
        Some(Edge {
            h1: 0,
            b1: 0,
            h2: 1,
            b2: 0
        })
    );
    assert_eq!(
        index.decode(11),
        Some(Edge {
            h1: 1,
            b1: 1,
            h2: 2,
            b2: 1
        })
    );
    assert_eq!(index.decode(12), None);
}

fn series_and_blocks() -> impl Strategy<Value = (Vec<i64>, usize)> {
    (1usize..40, 1usize..9).prop_flat_map(|(len, block_size)| {
        (prop::collection::vec(0i64..6, len), Just(block_size))
    })
}

proptest! {
    #[test]
    fn prop_projection_partitions_the_series((raw, block_size) in series_and_blocks(), seed in any::<u64>(), record_level in any::<bool>()) {
        let household = Household::new("h.csv", raw.iter().map(|v| Quantized(*v)).collect());
        let layout = BlockLayout::new(raw.len(), block_size).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let marks = if record_level {
            Marks::Records((0..raw.len()).map(|_| rng.gen_bool(0.4)).collect())
        } else {
            Marks::Blocks((0..layout.block_count()).map(|_| rng.gen_bool(0.4)).collect())
        };

        let view = project(&household, &marks, &layout);
        prop_assert_eq!(view.encrypted_input.len(), raw.len());

        let mut plain = Vec::new();
        let mut marked = Vec::new();
        for (i, value) in household.raw().iter().enumerate() {
            if marks.is_marked(&layout, i) {
                prop_assert_eq!(view.encrypted_input[i], Cell::Encrypted);
                marked.push(*value);
            } else {
                prop_assert_eq!(view.encrypted_input[i], Cell::Plain(*value));
                plain.push(*value);
            }
        }
        prop_assert_eq!(&view.plain_input, &plain);
        let flattened: Vec<Quantized> = view.input.iter().flatten().copied().collect();
        prop_assert_eq!(flattened, marked);
        prop_assert!(view.input.iter().all(|buffer| !buffer.is_empty() && buffer.len() <= block_size));

        // projecting again gives the same views
        prop_assert_eq!(project(&household, &marks, &layout), view);
    }

    #[test]
    fn prop_metric_sums_match_blocks(series in prop::collection::vec(prop::collection::vec(0i64..300_000, 12), 1..5), block_size in 1usize..6) {
        let households: Vec<Household> = series
            .iter()
            .enumerate()
            .map(|(h, raw)| Household::new(format!("h{h}"), raw.iter().map(|v| Quantized(*v)).collect()))
            .collect();
        let layout = BlockLayout::new(12, block_size).unwrap();
        let tables = ValueTables::build(&households);
        let metrics = BlockMetrics::compute(&households, &tables, &layout, Dataset::Water, Target::Entropy);

        for m in &metrics.households {
            let entropy: f64 = m.entropy.iter().sum();
            prop_assert!((m.entropy_sum - entropy).abs() < 1e-9);
            prop_assert_eq!(m.transition_sum, m.transition.iter().sum::<u64>());
            prop_assert!(m.transition_sum <= 11);
        }
    }

    #[test]
    fn prop_uniqueness_score_is_symmetric(
        pairs in prop::collection::vec((0i64..4, any::<bool>(), 0i64..4, any::<bool>()), 0..32)
    ) {
        let values_a: Vec<Quantized> = pairs.iter().map(|p| Quantized(p.0)).collect();
        let marks_a: Vec<bool> = pairs.iter().map(|p| p.1).collect();
        let values_b: Vec<Quantized> = pairs.iter().map(|p| Quantized(p.2)).collect();
        let marks_b: Vec<bool> = pairs.iter().map(|p| p.3).collect();

        let ab = uniqueness_score(&values_a, &marks_a, &values_b, &marks_b);
        let ba = uniqueness_score(&values_b, &marks_b, &values_a, &marks_a);
        prop_assert_eq!(ab, ba);
        prop_assert!(ab <= pairs.len() as f64);
    }

    #[test]
    fn prop_edge_index_is_bijective(households in 2usize..6, blocks in 1usize..5) {
        let index = EdgeIndex::new(households, blocks);
        prop_assert_eq!(index.count(), households * (households - 1) * blocks * blocks / 2);
        for i in 0..index.count() {
            let edge = index.decode(i).unwrap();
            prop_assert!(edge.h1 < edge.h2 && edge.h2 < households);
            prop_assert!(edge.b1 < blocks && edge.b2 < blocks);
            prop_assert_eq!(index.encode(&edge), i);
        }
        prop_assert_eq!(index.decode(index.count()), None);
    }
}
