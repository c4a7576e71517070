pub mod sim;
pub mod vertical_control;

pub use sim::{Aircraft, SimContext};
pub use vertical_control::{VerticalControlConfig, VerticalControlEnv};
