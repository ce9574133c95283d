//! # Partial Encryption and Member-Identification Attack Evaluation
//!
//! This library decides which fixed-size blocks of household consumption
//! series to encrypt, and measures how well the result resists an adversary
//! who knows a short contiguous slice of a victim's history.
//!
//! ## Features
//!
//! - **Block metrics**: Shannon entropy and transition count per block
//! - **Selection strategies**: global greedy, per-household greedy, random
//!   and pairwise uniqueness, all behind one [`SelectionStrategy`] trait
//! - **Attack simulation**: partial-plaintext matching with optional
//!   unique-ATD resampling and a standard-error stopping rule
//! - **HE collaborator**: summation and variance over the partially
//!   encrypted data through any [`HeCollaborator`]
//!
//! ## Example
//!
//! ```rust
//! use partenc::{
//!     build_strategy, project_all, AttackParams, AttackSimulator, BlockLayout, BlockMetrics,
//!     Budget, Dataset, Household, Quantized, Selector, StoppingRule, StrategyKind, Target,
//!     ValueTables,
//! };
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let households: Vec<Household> = (0..3)
//!     .map(|h| {
//!         let raw = (0..8).map(|i| Quantized((i * 3 + h * 5) % 7 * 1000)).collect();
//!         Household::new(format!("h{h}.csv"), raw)
//!     })
//!     .collect();
//!
//! let layout = BlockLayout::new(8, 4).unwrap();
//! let tables = ValueTables::build(&households);
//! let metrics = BlockMetrics::compute(&households, &tables, &layout, Dataset::Water, Target::Entropy);
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let strategy = build_strategy(StrategyKind::GlobalGreedy, &households, &metrics, &layout);
//! let mut selector = Selector::new(strategy);
//! selector.advance(Budget::for_step(1, &layout, households.len()), &mut rng).unwrap();
//!
//! let views = project_all(&households, &selector.marks(), &layout);
//! let params = AttackParams {
//!     atd_size: 2,
//!     min_percent_matched: 100.0,
//!     unique_atd: false,
//!     retry_limit: 100,
//!     trial_rule: StoppingRule { min_samples: StoppingRule::MIN_TRIALS, cutoff: 0.01, cap: 200 },
//!     macro_rule: StoppingRule { min_samples: StoppingRule::MIN_MACRO_LOOPS, cutoff: 0.01, cap: 2 },
//! };
//! let mut simulator = AttackSimulator::new(&households, &views, layout.block_size(), params).unwrap();
//! let estimate = simulator.run(&mut rng);
//! assert!((0.0..=1.0).contains(&estimate.mean));
//! ```

pub mod analyst;
pub mod attack;
pub mod blocks;
pub mod config;
pub mod error;
pub mod estimator;
pub mod harness;
pub mod he;
pub mod household;
pub mod loader;
pub mod metrics;
pub mod projector;
pub mod selection;
pub mod types;

// Re-export main types for convenience
pub use analyst::{encrypt_dataset, summation, variance, EncryptedDataset, SumOutput, VarOutput};
pub use attack::{AttackParams, AttackSimulator, TrialOutcome};
pub use blocks::BlockLayout;
pub use config::{ExperimentConfig, Progression};
pub use error::{HeError, PartencError, Result};
pub use estimator::{AsrEstimate, AsrEstimator, RunningStats, StoppingRule};
pub use harness::{AttackRecord, Diagnostic, Harness, HeTimingRecord, SweepReport};
pub use he::{ClearBackend, ElGamalBackend, HeCollaborator, HeMetrics, HeOp, HeParams};
pub use household::{EncryptionView, Household};
pub use loader::{load_households, parse_series};
pub use metrics::{BlockMetrics, ValueTables};
pub use projector::{project, project_all, Marks};
pub use selection::{build_strategy, Budget, Candidate, Pick, SelectionStrategy, Selector};
pub use types::{Cell, Dataset, HeBackendKind, Quantized, StrategyKind, Target};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
