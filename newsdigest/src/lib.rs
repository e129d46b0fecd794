// Library interface for newsdigest modules
// This allows tests and the binaries to import modules

pub mod aggregate;
pub mod article;
pub mod collect;
pub mod dedup;
pub mod delivery;
pub mod errors;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod schedule;
pub mod summarize;

pub use pipeline::Pipeline;
