pub mod atc;

pub use atc::{VerticalControlConfig, VerticalControlEnv};
