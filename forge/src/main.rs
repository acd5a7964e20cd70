//! LLM-driven Terraform module forge CLI.
//!
//! `forge run` drives the generate-apply-repair loop: ask the generation
//! service for a Terraform module solving the configured problem, apply it,
//! and feed apply errors back for repair until it succeeds or the attempt
//! cap is exhausted.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use forge::core::spec::collect_vars;
use forge::exit_codes;
use forge::io::config::{ForgeConfig, example_config, load_config};
use forge::io::generator::HttpGenerator;
use forge::io::terraform::ProcessApplier;
use forge::logging;
use forge::run::{RunOptions, RunStop, run_build};

#[derive(Parser)]
#[command(
    name = "forge",
    version,
    about = "Generate, apply, and repair Terraform modules with a hosted model"
)]
struct Cli {
    /// Path to the forge config file.
    #[arg(long, global = true, default_value = "forge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a commented starter `forge.toml` if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate config and required environment inputs without any network call.
    Check,
    /// Run the generate-apply-repair loop.
    Run,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match execute(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn execute(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Check => cmd_check(&cli.config),
        Command::Run => cmd_run(&cli.config),
    }
}

fn cmd_init(path: &PathBuf, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    fs::write(path, example_config()).with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_check(path: &PathBuf) -> Result<i32> {
    let cfg = load_config(path)?;
    let spec = cfg.problem.to_spec();
    collect_vars(&spec, |var| std::env::var(var).ok())?;
    println!(
        "config ok: {} inputs present, attempt cap {}",
        spec.inputs.len(),
        cfg.max_attempts
    );
    Ok(exit_codes::OK)
}

fn cmd_run(path: &PathBuf) -> Result<i32> {
    let cfg = load_config(path)?;
    let spec = cfg.problem.to_spec();

    // Inputs are read once here and threaded through to the subprocess;
    // absence of any variable aborts before the generator is even built.
    let vars = collect_vars(&spec, |var| std::env::var(var).ok())?;

    let generator = HttpGenerator::from_config(&cfg.generator)?;
    let applier = ProcessApplier::new(cfg.terraform.command.clone());
    let options = run_options(&cfg);

    let outcome = run_build(&spec, &vars, &generator, &applier, &options)?;
    match outcome.stop {
        RunStop::Solved => Ok(exit_codes::OK),
        RunStop::AttemptsExhausted { last_error } => {
            eprintln!(
                "failed to find a solution after {} attempts; last error:\n{}",
                outcome.attempts,
                last_error.trim()
            );
            Ok(exit_codes::EXHAUSTED)
        }
    }
}

fn run_options(cfg: &ForgeConfig) -> RunOptions {
    RunOptions {
        max_attempts: cfg.max_attempts,
        output_dir: PathBuf::from(&cfg.output_dir),
        module_dir: cfg.module_dir.clone(),
        apply_timeout: cfg.terraform.apply_timeout_secs.map(Duration::from_secs),
        output_limit_bytes: cfg.terraform.output_limit_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from(["forge", "run"]);
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.config, PathBuf::from("forge.toml"));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["forge", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_custom_config_path() {
        let cli = Cli::parse_from(["forge", "--config", "custom.toml", "check"]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
    }
}
