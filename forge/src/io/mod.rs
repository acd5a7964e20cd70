//! Side-effecting operations: config, subprocess execution, the generation
//! service client, prompt rendering, and Terraform materialization/apply.

pub mod config;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod terraform;
