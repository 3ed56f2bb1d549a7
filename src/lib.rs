pub mod aggregate;
pub mod check;
pub mod compile;
pub mod config;
pub mod coverage;
pub mod error;
pub mod graph;
pub mod model;
pub mod plan;
pub mod report;
pub mod runtime;
pub mod writer;
