//! File set materialization and `terraform init` / `terraform apply`.
//!
//! The [`Applier`] trait decouples the loop from the infrastructure tool
//! subprocess. Input parameters reach terraform as `TF_VAR_<name>` variables
//! set on the child process only (`Command::env`); the parent environment is
//! never touched, so nothing leaks across iterations.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::fileset::FileSet;
use crate::io::process::run_command;

/// Prefix for terraform input variables passed via the environment.
pub const TF_VAR_PREFIX: &str = "TF_VAR_";

/// Write the file set to a freshly-cleaned output directory.
///
/// The directory is deleted and recreated, files land under the optional
/// `module_dir` subdirectory, and parent directories are created on demand.
/// Writing the same file set twice yields identical directory contents.
#[instrument(skip_all, fields(output_dir = %output_dir.display(), files = files.len()))]
pub fn materialize(output_dir: &Path, module_dir: Option<&str>, files: &FileSet) -> Result<PathBuf> {
    if output_dir.exists() {
        fs::remove_dir_all(output_dir)
            .with_context(|| format!("clean output dir {}", output_dir.display()))?;
    }
    let target = match module_dir {
        Some(sub) => output_dir.join(sub),
        None => output_dir.to_path_buf(),
    };
    fs::create_dir_all(&target)
        .with_context(|| format!("create output dir {}", target.display()))?;

    for (rel_path, body) in files {
        let full_path = target.join(rel_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&full_path, body.render())
            .with_context(|| format!("write {}", full_path.display()))?;
    }

    debug!(target = %target.display(), "materialized file set");
    Ok(target)
}

/// Parameters for an apply invocation.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    /// Directory holding the materialized module.
    pub workdir: PathBuf,
    /// Input parameter name -> value; passed as `TF_VAR_<name>` to the child.
    pub vars: BTreeMap<String, String>,
    /// Wall-clock limit per invocation; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Result of an apply invocation. Failure is data, not an error: it drives
/// the repair path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Success,
    Failed { error_text: String },
}

/// Abstraction over the infrastructure tool invocation.
pub trait Applier {
    /// Run initialize + apply against the materialized directory.
    fn apply(&self, request: &ApplyRequest) -> Result<ApplyOutcome>;
}

/// Applier that spawns the configured terraform command.
pub struct ProcessApplier {
    command: Vec<String>,
}

impl ProcessApplier {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn phase_command(&self, request: &ApplyRequest, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        cmd.args(args);
        cmd.current_dir(&request.workdir);
        for (name, value) in &request.vars {
            cmd.env(format!("{TF_VAR_PREFIX}{name}"), value);
        }
        cmd
    }

    fn run_phase(&self, request: &ApplyRequest, args: &[&str]) -> Result<ApplyOutcome> {
        let phase = args.first().copied().unwrap_or("?");
        debug!(phase, "running terraform");
        let cmd = self.phase_command(request, args);
        let output = run_command(cmd, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run terraform {phase}"))?;

        if output.timed_out {
            warn!(phase, "terraform timed out");
            return Ok(ApplyOutcome::Failed {
                error_text: format!("terraform {phase} timed out\n{}", output.combined_text()),
            });
        }
        if !output.status.success() {
            warn!(phase, exit_code = ?output.status.code(), "terraform failed");
            return Ok(ApplyOutcome::Failed {
                error_text: output.combined_text(),
            });
        }
        Ok(ApplyOutcome::Success)
    }
}

impl Applier for ProcessApplier {
    #[instrument(skip_all, fields(workdir = %request.workdir.display()))]
    fn apply(&self, request: &ApplyRequest) -> Result<ApplyOutcome> {
        if self.command.is_empty() {
            return Err(anyhow!("terraform command is empty"));
        }

        match self.run_phase(request, &["init"])? {
            ApplyOutcome::Success => {}
            failed => return Ok(failed),
        }

        let outcome = self.run_phase(request, &["apply", "-auto-approve"])?;
        if outcome == ApplyOutcome::Success {
            info!("terraform apply succeeded");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fileset::FileBody;
    use crate::test_support::text_fileset;

    fn read_tree(dir: &Path) -> BTreeMap<String, String> {
        let mut entries = BTreeMap::new();
        collect_tree(dir, dir, &mut entries);
        entries
    }

    fn collect_tree(root: &Path, dir: &Path, entries: &mut BTreeMap<String, String>) {
        for entry in fs::read_dir(dir).expect("read dir") {
            let entry = entry.expect("entry");
            let path = entry.path();
            if path.is_dir() {
                collect_tree(root, &path, entries);
            } else {
                let rel = path
                    .strip_prefix(root)
                    .expect("relative")
                    .to_string_lossy()
                    .to_string();
                entries.insert(rel, fs::read_to_string(&path).expect("read file"));
            }
        }
    }

    /// Stub applier command: a shell script standing in for the terraform
    /// binary, so phase arguments and env scoping can be observed.
    fn stub_command(dir: &Path, script: &str) -> Vec<String> {
        let path = dir.join("tf-stub.sh");
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("write stub");
        vec!["sh".to_string(), path.to_string_lossy().to_string()]
    }

    fn request(workdir: &Path, vars: BTreeMap<String, String>) -> ApplyRequest {
        ApplyRequest {
            workdir: workdir.to_path_buf(),
            vars,
            timeout: None,
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn materialize_is_idempotent_per_iteration() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output_dir = temp.path().join("output");
        let files = text_fileset(&[("main.tf", "resource {}"), ("README.md", "# site")]);

        materialize(&output_dir, None, &files).expect("first");
        let first = read_tree(&output_dir);
        materialize(&output_dir, None, &files).expect("second");
        let second = read_tree(&output_dir);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn materialize_removes_stale_files_from_previous_iteration() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output_dir = temp.path().join("output");

        materialize(
            &output_dir,
            None,
            &text_fileset(&[("old.tf", "gone soon")]),
        )
        .expect("first");
        materialize(&output_dir, None, &text_fileset(&[("main.tf", "kept")])).expect("second");

        assert!(!output_dir.join("old.tf").exists());
        assert!(output_dir.join("main.tf").exists());
    }

    #[test]
    fn materialize_creates_parent_dirs_and_module_subdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output_dir = temp.path().join("output");
        let files = text_fileset(&[("modules/vpc/main.tf", "vpc")]);

        let target = materialize(&output_dir, Some("terraform"), &files).expect("materialize");

        assert_eq!(target, output_dir.join("terraform"));
        assert_eq!(
            fs::read_to_string(output_dir.join("terraform/modules/vpc/main.tf")).expect("read"),
            "vpc"
        );
    }

    #[test]
    fn materialize_serializes_structured_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output_dir = temp.path().join("output");
        let mut files = FileSet::new();
        files.insert(
            "config.json".to_string(),
            FileBody::Structured(serde_json::json!({"region": "eu-west-1"})),
        );

        materialize(&output_dir, None, &files).expect("materialize");
        let written = fs::read_to_string(output_dir.join("config.json")).expect("read");
        assert!(written.contains("\"region\": \"eu-west-1\""));
    }

    #[test]
    fn apply_success_runs_init_then_apply() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("phases.log");
        let applier = ProcessApplier::new(stub_command(
            temp.path(),
            &format!("echo \"$1\" >> {}", log.display()),
        ));

        let outcome = applier
            .apply(&request(temp.path(), BTreeMap::new()))
            .expect("apply");

        assert_eq!(outcome, ApplyOutcome::Success);
        let phases = fs::read_to_string(&log).expect("read log");
        assert_eq!(phases, "init\napply\n");
    }

    #[test]
    fn apply_failure_captures_error_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let applier = ProcessApplier::new(stub_command(
            temp.path(),
            "echo 'Error: Invalid resource type' >&2; exit 1",
        ));

        let outcome = applier
            .apply(&request(temp.path(), BTreeMap::new()))
            .expect("apply");

        match outcome {
            ApplyOutcome::Failed { error_text } => {
                assert!(error_text.contains("Error: Invalid resource type"));
            }
            ApplyOutcome::Success => panic!("expected failure"),
        }
    }

    #[test]
    fn apply_stops_after_init_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("phases.log");
        let applier = ProcessApplier::new(stub_command(
            temp.path(),
            &format!("echo \"$1\" >> {}; exit 1", log.display()),
        ));

        let outcome = applier
            .apply(&request(temp.path(), BTreeMap::new()))
            .expect("apply");

        assert!(matches!(outcome, ApplyOutcome::Failed { .. }));
        let phases = fs::read_to_string(&log).expect("read log");
        assert_eq!(phases, "init\n", "apply must not run after init fails");
    }

    #[test]
    fn vars_reach_the_child_but_never_the_parent_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let applier = ProcessApplier::new(stub_command(
            temp.path(),
            "echo \"region=$TF_VAR_aws_region\"; exit 1",
        ));
        let mut vars = BTreeMap::new();
        vars.insert("aws_region".to_string(), "eu-west-1".to_string());

        let outcome = applier.apply(&request(temp.path(), vars)).expect("apply");

        match outcome {
            ApplyOutcome::Failed { error_text } => {
                assert!(error_text.contains("region=eu-west-1"));
            }
            ApplyOutcome::Success => panic!("expected failure"),
        }
        // Scoped to the subprocess only: nothing lingers in this process.
        assert!(std::env::var("TF_VAR_aws_region").is_err());
    }
}
