//! Seeded random streams.
//!
//! Every annealing job owns its generator. Streams are derived from the run
//! seed with splitmix64 so that parallel jobs never share random state and a
//! run is reproducible from a single `u64`.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Creates a deterministic generator from a seed.
pub fn create_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// One splitmix64 step.
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derives the seed of job `job` on frame `frame` from the run seed.
pub fn derive_seed(run_seed: u64, frame: usize, job: usize) -> u64 {
    let frame_seed = splitmix64(run_seed ^ splitmix64(frame as u64));
    splitmix64(frame_seed ^ splitmix64((job as u64).wrapping_add(0x5851_F42D_4C95_7F2D)))
}
