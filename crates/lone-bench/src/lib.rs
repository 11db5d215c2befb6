//! Benchmark workloads for the lone memory core.
//!
//! Every workload is generated from a seed with ChaCha8, so a benchmark
//! run is reproducible across machines:
//!
//! - [`allocation_sizes`]: request sizes for arena churn
//! - [`symbol_names`]: distinct symbol names for table and intern benches
//! - [`build_graph`]: a rooted object graph with a fixed share of garbage

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use lone_core::CellRef;
use lone_heap::{MemoryError, Runtime, RuntimeConfig};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Region size used by the runtime benchmarks.
pub const BENCH_REGION_BYTES: usize = 16 << 20;

/// A runtime sized for benchmarking.
pub fn bench_runtime() -> Runtime {
    Runtime::new(RuntimeConfig::new(BENCH_REGION_BYTES)).expect("bench config is valid")
}

/// `count` request sizes between 1 and `max` bytes, skewed towards small
/// requests the way cell buffers are.
pub fn allocation_sizes(count: usize, max: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let r = rng.next_u64();
            // Three quarters of requests fit in 64 bytes.
            let limit = if r & 3 == 0 { max } else { max.min(64) };
            1 + (r >> 2) as usize % limit
        })
        .collect()
}

/// `count` distinct symbol names.
pub fn symbol_names(count: usize, seed: u64) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|n| format!("sym-{n}-{:08x}", rng.next_u32()))
        .collect()
}

/// Build `nodes` list and vector cells over random earlier cells. Every
/// `keep_every`-th node is pushed onto a vector that is returned pinned as
/// a temporary root; the rest become garbage once the call returns.
pub fn build_graph(
    rt: &mut Runtime,
    nodes: usize,
    keep_every: usize,
    seed: u64,
) -> Result<CellRef, MemoryError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let keep = rt.vector_create(nodes / keep_every.max(1) + 1)?;
    rt.push_temporary_root(keep)?;

    let mut recent: Vec<CellRef> = Vec::with_capacity(nodes);
    for n in 0..nodes {
        let r = rng.next_u64();
        let cell = match (r % 4, recent.len()) {
            (_, 0) | (0, _) => rt.integer(r as i64)?,
            (1, len) => {
                let other = recent[(r >> 8) as usize % len];
                let nil = rt.nil();
                rt.list(other, nil)?
            }
            (2, len) => {
                let a = recent[(r >> 8) as usize % len];
                let b = recent[(r >> 24) as usize % len];
                rt.vector_from(&[a, b])?
            }
            _ => rt.text(&format!("node-{n}"))?,
        };
        // Only cells reachable from `keep` may be referenced later.
        if n % keep_every.max(1) == 0 {
            rt.vector_push(keep, cell)?;
            recent.push(cell);
        }
    }
    Ok(keep)
}
