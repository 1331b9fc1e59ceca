pub mod audit;
pub mod clock;
pub mod compatibility;
pub mod queue;
pub mod scheduler;
pub mod scoring;
