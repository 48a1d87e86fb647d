pub mod backend;
pub mod clock;
pub mod indicator;
pub mod rng;
