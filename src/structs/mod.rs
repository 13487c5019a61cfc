pub mod model;
pub mod result;
pub mod spec;
pub mod trajectories;
