#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use ztf_lc::models::{ObjectId, ObservationRow, SphericalPoint, SummaryRow};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the variables on unwind and serializes access to the process
/// environment, since tests run in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// Object the light-curve examples are built around.
pub const EXAMPLE_OID: u64 = 830202400008402;

/// A clean zg summary at (`ra`, `dec`).
pub fn summary(oid: u64, ra: f64, dec: f64) -> SummaryRow {
    SummaryRow {
        oid: ObjectId(oid),
        nobs: 3,
        ngoodobs: 3,
        durgood: 0.4,
        filter: 1,
        fieldid: 600,
        rcid: 12,
        coord: SphericalPoint::new(ra, dec).unwrap(),
        h3index10: None,
    }
}

/// A clean observation of `oid` at `mjd`.
pub fn observation(oid: u64, mjd: f64) -> ObservationRow {
    ObservationRow {
        oid: ObjectId(oid),
        mjd,
        mag: 18.5,
        magerr: 0.05,
        clrcoeff: -0.03,
        catflags: 0,
    }
}

pub fn observations(oid: u64, mjds: &[f64]) -> Vec<ObservationRow> {
    mjds.iter().map(|&mjd| observation(oid, mjd)).collect()
}
