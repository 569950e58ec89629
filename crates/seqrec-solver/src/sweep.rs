//! Per-state map used by every Bellman sweep. Each state's backup reads
//! only the start-of-sweep value function, so the serial and the rayon
//! variant produce identical results.

use seqrec_core::Result;

#[cfg(feature = "parallel")]
pub(crate) fn try_map<I, T, F>(items: &[I], f: F) -> Result<Vec<T>>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> Result<T> + Sync + Send,
{
    use rayon::prelude::*;
    items.par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn try_map<I, T, F>(items: &[I], f: F) -> Result<Vec<T>>
where
    F: Fn(&I) -> Result<T>,
{
    items.iter().map(f).collect()
}
