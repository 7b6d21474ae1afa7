//! Read-once runtime knobs from the environment.
//!
//! All knobs are consumed exactly once: the `PMEM_NO_*` switches and the
//! streaming-store threshold when the dispatch record is built, the
//! `PMEM_IS_PMEM_FORCE` override on the first `is_pmem` call.

use std::env;

use log::debug;

/// Default byte count at or above which streaming stores are used.
pub(crate) const MOVNT_THRESHOLD: usize = 256;

/// Environment switches consulted while building the dispatch record.
#[derive(Debug, Clone)]
pub(crate) struct EnvKnobs {
    pub no_clflushopt: bool,
    pub no_clwb: bool,
    pub no_flush: bool,
    pub no_movnt: bool,
    pub movnt_threshold: usize,
}

impl EnvKnobs {
    pub fn from_env() -> EnvKnobs {
        EnvKnobs {
            no_clflushopt: flag_set("PMEM_NO_CLFLUSHOPT"),
            no_clwb: flag_set("PMEM_NO_CLWB"),
            no_flush: flag_set("PMEM_NO_FLUSH"),
            no_movnt: flag_set("PMEM_NO_MOVNT"),
            movnt_threshold: threshold_override().unwrap_or(MOVNT_THRESHOLD),
        }
    }
}

/// Forced `is_pmem` answer from `PMEM_IS_PMEM_FORCE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForcedIsPmem {
    Never,
    Always,
}

/// Read `PMEM_IS_PMEM_FORCE`: "0" forces never, "1" forces always, any
/// other value is ignored.
pub(crate) fn is_pmem_force() -> Option<ForcedIsPmem> {
    let raw = env::var("PMEM_IS_PMEM_FORCE").ok()?;
    match raw.parse::<i32>() {
        Ok(0) => Some(ForcedIsPmem::Never),
        Ok(1) => Some(ForcedIsPmem::Always),
        _ => None,
    }
}

#[inline]
fn flag_set(name: &str) -> bool {
    matches!(env::var(name), Ok(v) if v == "1")
}

fn threshold_override() -> Option<usize> {
    let raw = env::var("PMEM_MOVNT_THRESHOLD").ok()?;
    match raw.parse::<usize>() {
        Ok(val) => {
            debug!("PMEM_MOVNT_THRESHOLD set to {}", val);
            Some(val)
        }
        Err(_) => {
            debug!("invalid PMEM_MOVNT_THRESHOLD {:?}", raw);
            None
        }
    }
}
