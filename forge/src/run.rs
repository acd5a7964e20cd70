//! The generate-apply-repair loop.
//!
//! A flat bounded retry: generate a file set, materialize it, apply it, and
//! on failure ask the generation service for a repaired file set, replacing
//! the previous one wholesale. No backoff, no partial-success semantics.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::core::fileset::{FileSet, parse_reply};
use crate::core::spec::ProblemSpec;
use crate::io::generator::Generator;
use crate::io::prompt::{builder_prompt, repairer_prompt};
use crate::io::terraform::{Applier, ApplyOutcome, ApplyRequest, materialize};

/// Loop parameters, resolved from config before the run starts.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum apply attempts before giving up.
    pub max_attempts: u32,
    /// Output directory, recreated from scratch every iteration.
    pub output_dir: PathBuf,
    /// Optional subdirectory nesting the module under `output_dir`.
    pub module_dir: Option<String>,
    /// Wall-clock limit per terraform invocation; `None` waits indefinitely.
    pub apply_timeout: Option<Duration>,
    /// Truncate captured terraform output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Reason why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// Apply succeeded.
    Solved,
    /// Every attempt failed; carries the last apply error.
    AttemptsExhausted { last_error: String },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Apply attempts performed (1-indexed count).
    pub attempts: u32,
    /// Generation service calls performed, initial call included.
    pub generation_calls: u32,
    /// How many of those were repair calls.
    pub repair_calls: u32,
    pub stop: RunStop,
}

/// Run the loop to completion: solved, or attempts exhausted.
///
/// The initial generation call is not retried; an invalid or empty reply
/// there propagates as an error (see [`crate::core::fileset::InvalidReplyError`]).
/// During repair iterations, a failed or invalid repair reply keeps the
/// previous file set and the loop proceeds to the next attempt.
pub fn run_build<G: Generator, A: Applier>(
    spec: &ProblemSpec,
    vars: &BTreeMap<String, String>,
    generator: &G,
    applier: &A,
    options: &RunOptions,
) -> Result<RunOutcome> {
    let mut generation_calls = 0u32;
    let mut repair_calls = 0u32;

    info!(statement = %spec.statement, "requesting initial module generation");
    let prompt = builder_prompt(spec)?;
    let raw = generator
        .complete(&prompt)
        .context("initial generation call")?;
    generation_calls += 1;
    let reply = parse_reply(&raw).context("initial generation reply")?;
    for task in &reply.tasks {
        info!(folder = %task.folder, "generation service suggested a follow-up task");
    }
    if let Some(url_output) = &reply.url_output {
        info!(%url_output, "module designates its URL output");
    }
    let mut files = reply.files;

    let mut last_error = String::new();
    for attempt in 1..=options.max_attempts {
        let workdir = materialize(&options.output_dir, options.module_dir.as_deref(), &files)?;
        info!(attempt, max_attempts = options.max_attempts, files = files.len(), "applying generated module");

        let request = ApplyRequest {
            workdir,
            vars: vars.clone(),
            timeout: options.apply_timeout,
            output_limit_bytes: options.output_limit_bytes,
        };
        match applier.apply(&request)? {
            ApplyOutcome::Success => {
                info!(attempt, "Found a solution");
                return Ok(RunOutcome {
                    attempts: attempt,
                    generation_calls,
                    repair_calls,
                    stop: RunStop::Solved,
                });
            }
            ApplyOutcome::Failed { error_text } => {
                warn!(attempt, "terraform apply failed");
                last_error = error_text;
            }
        }

        repair_calls += 1;
        generation_calls += 1;
        match request_repair(spec, generator, &files, &last_error) {
            Ok(repaired) => {
                info!(attempt, files = repaired.len(), "received repaired file set");
                files = repaired;
            }
            Err(err) => {
                // The attempt still counts; the next pass retries the
                // previous file set.
                warn!(attempt, err = format!("{err:#}"), "repair call failed, keeping previous file set");
            }
        }
    }

    error!(
        max_attempts = options.max_attempts,
        "Failed to find a solution"
    );
    Ok(RunOutcome {
        attempts: options.max_attempts,
        generation_calls,
        repair_calls,
        stop: RunStop::AttemptsExhausted { last_error },
    })
}

/// Ask the generation service to repair the failing file set.
fn request_repair<G: Generator>(
    spec: &ProblemSpec,
    generator: &G,
    files: &FileSet,
    errors: &str,
) -> Result<FileSet> {
    let files_json = serde_json::to_string(files).context("serialize file set")?;
    let prompt = repairer_prompt(spec, &files_json, errors)?;
    let raw = generator.complete(&prompt).context("repair call")?;
    let reply = parse_reply(&raw).context("repair reply")?;
    Ok(reply.files)
}
