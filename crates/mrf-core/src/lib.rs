//! Probabilistic inference core for learning discrete clique-tree graphical
//! models (Markov random fields) from categorical tabular data via
//! Expectation-Maximization with latent variables.
//!
//! Four pieces, leaves first: the [`assignment`] enumerator walks joint
//! value vectors; [`counter`] answers sufficient-statistics queries over a
//! dataset by bitset intersection; [`factor`] is the dense stride-indexed
//! algebra everything else is built from; [`clique`] calibrates a fixed
//! clique-tree topology by two-pass message passing; [`init`] seeds a
//! clique tree's starting potentials; [`em`] drives expectation-maximization
//! to convergence. [`loglik`] answers the one read-only scoring query
//! collaborators need without running EM at all.
//!
//! Out of scope here (left to collaborators): dataset file parsing, UAI /
//! libDAI serialisation, the CLI, and clique-tree structure learning — the
//! topology is an input to this crate, never a product of it.

pub mod assignment;
pub mod clique;
pub mod config;
pub mod counter;
pub mod dataset;
pub mod em;
pub mod factor;
pub mod init;
pub mod loglik;
pub mod rng;
pub mod var;

pub use assignment::{AssignmentIter, AssignmentValues, Evidence};
pub use clique::CliqueTree;
pub use config::{EmConfig, InitMode};
pub use counter::{BitCounter, Counter};
pub use dataset::Dataset;
pub use em::{EmReport, run as run_em};
pub use factor::Factor;
pub use loglik::struct_log_likelihood;
pub use var::{Cardinalities, VarId};

pub use mrf_error::{MrfError, MrfResult};

/// Installs a `tracing-subscriber` fmt layer exactly once per process and
/// routes panics through `tracing::error!` instead of letting them print
/// raw to stderr, matching the workspace family's own `init_logging`
/// convention. Safe to call from multiple collaborators (tests, CLI,
/// benches); only the first call has any effect.
pub fn init_logging() {
    use std::sync::Once;
    static INIT_LOGGING: Once = Once::new();

    INIT_LOGGING.call_once(|| {
        use tracing_subscriber::fmt::format::FmtSpan;
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        std::panic::set_hook(Box::new(|info| {
            tracing::error!("PANIC: {}", info);
        }));

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                    .with_target(false)
                    .with_level(true)
                    .compact(),
            )
            .init();
    });
}
