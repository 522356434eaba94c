pub mod admission;
pub mod engine;
pub mod errors;
pub mod history;
pub mod pruning;
pub mod registry;
pub mod scandist;
pub mod scoring;
pub mod telemetry;
