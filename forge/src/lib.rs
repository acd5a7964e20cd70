//! LLM-driven Terraform module forge.
//!
//! Asks a hosted model for a Terraform module solving a configured problem,
//! materializes the generated files, runs `terraform init`/`apply`, and on
//! failure feeds the error text back for a bounded number of repair
//! iterations. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (problem spec, reply parsing
//!   and validation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, subprocess execution,
//!   HTTP to the generation service, filesystem materialization). Isolated
//!   to enable scripted doubles in tests.
//!
//! [`run`] coordinates core logic with I/O to implement the loop.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
