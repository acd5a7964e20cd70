//! Forge configuration stored in `forge.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::spec::ProblemSpec;

/// Forge configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values; the problem
/// section has no useful default and is validated explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Maximum generate-apply-repair attempts before the run fails.
    /// Observed values in practice range from 3 to 10.
    pub max_attempts: u32,

    /// Directory the generated module is materialized into. Deleted and
    /// recreated at the start of every iteration.
    pub output_dir: String,

    /// Optional subdirectory under `output_dir` to nest the module in.
    pub module_dir: Option<String>,

    pub terraform: TerraformConfig,
    pub generator: GeneratorConfig,
    pub problem: ProblemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TerraformConfig {
    /// Command to invoke the infrastructure tool (e.g. `["terraform"]` or
    /// `["tofu"]`). Phase arguments are appended.
    pub command: Vec<String>,

    /// Wall-clock limit for each init/apply invocation. Unset means wait
    /// indefinitely, matching the tool's historical behavior.
    pub apply_timeout_secs: Option<u64>,

    /// Truncate captured terraform stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            command: vec!["terraform".to_string()],
            apply_timeout_secs: None,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    pub base_url: String,

    /// Model identifier sent with each request.
    pub model: String,

    /// Name of the environment variable holding the API key. The key itself
    /// never appears in config.
    pub api_key_env: String,

    /// HTTP timeout for each generation call, in seconds.
    pub timeout_secs: u64,

    pub temperature: Option<f32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            temperature: None,
        }
    }
}

/// The problem the run solves: statement, requirements, and named
/// input/output parameter descriptions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ProblemConfig {
    pub statement: String,
    pub requirements: Vec<String>,
    pub example_usage: Option<String>,
    /// Input parameter name -> description. Each must be present as an
    /// uppercase environment variable at run start.
    pub inputs: BTreeMap<String, String>,
    /// Output parameter name -> description.
    pub outputs: BTreeMap<String, String>,
}

impl ProblemConfig {
    pub fn to_spec(&self) -> ProblemSpec {
        ProblemSpec {
            statement: self.statement.clone(),
            requirements: self.requirements.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            example_usage: self.example_usage.clone(),
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            output_dir: "output".to_string(),
            module_dir: None,
            terraform: TerraformConfig::default(),
            generator: GeneratorConfig::default(),
            problem: ProblemConfig::default(),
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.output_dir.trim().is_empty() {
            return Err(anyhow!("output_dir must be non-empty"));
        }
        if self.terraform.command.is_empty() || self.terraform.command[0].trim().is_empty() {
            return Err(anyhow!("terraform.command must be a non-empty array"));
        }
        if self.terraform.output_limit_bytes == 0 {
            return Err(anyhow!("terraform.output_limit_bytes must be > 0"));
        }
        if self.generator.base_url.trim().is_empty() {
            return Err(anyhow!("generator.base_url must be non-empty"));
        }
        if self.generator.model.trim().is_empty() {
            return Err(anyhow!("generator.model must be non-empty"));
        }
        if self.generator.api_key_env.trim().is_empty() {
            return Err(anyhow!("generator.api_key_env must be non-empty"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.problem.statement.trim().is_empty() {
            return Err(anyhow!("problem.statement must be non-empty"));
        }
        for name in self.problem.inputs.keys() {
            if name.trim().is_empty() {
                return Err(anyhow!("problem.inputs contains a blank parameter name"));
            }
        }
        Ok(())
    }
}

/// Load and validate config from a TOML file.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "missing config {} (run `forge init` to scaffold one)",
            path.display()
        ));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate().with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Commented starter config written by `forge init`.
pub fn example_config() -> &'static str {
    include_str!("forge.example.toml")
}
