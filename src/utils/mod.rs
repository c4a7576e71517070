pub mod rng;

pub use rng::{RngStream, rank_seed, rng_from_seed};
