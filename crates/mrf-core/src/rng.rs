//! The one seam through which the core draws randomness (Dirichlet parameter
//! initialisation, §4.E). A thread-local RNG seeded from a process-global
//! generator, so a caller can pin a reproducible seed without threading a
//! `&mut Rng` through every function in the init path.

use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use std::cell::RefCell;
use std::sync::{Arc, LazyLock, Mutex};

static GLOBAL_RNG: LazyLock<Arc<Mutex<SmallRng>>> =
    LazyLock::new(|| Arc::new(Mutex::new(SmallRng::from_os_rng())));

thread_local! {
    static TLS_RNG: RefCell<SmallRng> = RefCell::new({
        let mut global = GLOBAL_RNG.lock().unwrap();
        SmallRng::seed_from_u64(global.next_u64())
    });
}

pub fn with_rng<R>(f: impl FnOnce(&mut SmallRng) -> R) -> R {
    TLS_RNG.with(|cell| f(&mut cell.borrow_mut()))
}

/// Reseeds the global generator; threads that have not yet spun up their
/// thread-local RNG will derive from the new seed.
pub fn set_seed(seed: u64) {
    let mut global = GLOBAL_RNG.lock().unwrap();
    *global = SmallRng::seed_from_u64(seed);
}

/// Runs `f` with the calling thread's RNG temporarily reseeded, then
/// restores its prior state. Useful for deterministic tests.
pub fn scoped_seed<R>(seed: u64, f: impl FnOnce() -> R) -> R {
    TLS_RNG.with(|cell| {
        let original = {
            let mut rng = cell.borrow_mut();
            let original = rng.clone();
            *rng = SmallRng::seed_from_u64(seed);
            original
        };

        let result = f();
        *cell.borrow_mut() = original;
        result
    })
}

/// Uniform draw in `[0, 1)`.
pub fn uniform() -> f64 {
    with_rng(|rng| rng.random())
}

/// Standard-normal draw via the Box-Muller transform.
pub fn gaussian() -> f64 {
    with_rng(|rng| {
        let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rng.random();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    })
}

/// Uniform draw in `(0, 1]`, never exactly zero. Used where a `0` would
/// make a later `.ln()` or `.powf()` blow up (Marsaglia-Tsang boost trick,
/// below).
fn uniform_nonzero() -> f64 {
    with_rng(|rng| 1.0 - rng.random::<f64>())
}

/// `Gamma(shape, 1)` draw via Marsaglia & Tsang (2000). Boosts `shape < 1`
/// by sampling `Gamma(shape + 1)` and scaling by `U^(1/shape)`, the standard
/// reduction to the `shape >= 1` case the core algorithm requires.
fn gamma_sample(shape: f64) -> f64 {
    if shape < 1.0 {
        let u = uniform_nonzero();
        return gamma_sample(shape + 1.0) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = gaussian();
        let v = (1.0 + c * x).powi(3);
        if v <= 0.0 {
            continue;
        }
        let u = uniform_nonzero();
        if u < 1.0 - 0.0331 * x.powi(4) {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// One draw from a symmetric `k`-dimensional Dirichlet(`alpha`): `k`
/// independent `Gamma(alpha, 1)` draws, normalised to sum to `1`. Does not
/// itself reject zero entries — §4.E's caller redraws on a zero, since
/// "redraw until positive" is a property of the factory, not of sampling.
pub fn dirichlet(alpha: f64, k: usize) -> Vec<f64> {
    let draws: Vec<f64> = (0..k).map(|_| gamma_sample(alpha)).collect();
    let sum: f64 = draws.iter().sum();
    draws.iter().map(|&x| x / sum).collect()
}
