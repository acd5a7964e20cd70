//! Prompt rendering for the builder and repairer calls.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::spec::{ProblemSpec, describe_params};
use crate::io::generator::Prompt;

const BUILDER_SYSTEM: &str = include_str!("prompts/builder_system.md");
const BUILDER_USER: &str = include_str!("prompts/builder_user.md");
const REPAIRER_SYSTEM: &str = include_str!("prompts/repairer_system.md");
const REPAIRER_USER: &str = include_str!("prompts/repairer_user.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("builder_system", BUILDER_SYSTEM)
            .expect("builder system template should be valid");
        env.add_template("builder_user", BUILDER_USER)
            .expect("builder user template should be valid");
        env.add_template("repairer_system", REPAIRER_SYSTEM)
            .expect("repairer system template should be valid");
        env.add_template("repairer_user", REPAIRER_USER)
            .expect("repairer user template should be valid");
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template.render(ctx)?;
        Ok(rendered.trim().to_string())
    }
}

/// Prompt for the initial generation call.
pub fn builder_prompt(spec: &ProblemSpec) -> Result<Prompt> {
    let engine = PromptEngine::new();
    let ctx = context! {
        statement => spec.statement.trim(),
        requirements => spec.requirements_line(),
        inputs => non_empty(describe_params(&spec.inputs)),
        outputs => non_empty(describe_params(&spec.outputs)),
        example_usage => spec.example_usage.as_deref().map(str::trim).filter(|s| !s.is_empty()),
    };
    Ok(Prompt {
        system: engine.render("builder_system", ctx.clone())?,
        user: engine.render("builder_user", ctx)?,
    })
}

/// Prompt for a repair call: the failing file set as JSON plus the raw
/// apply error text.
pub fn repairer_prompt(spec: &ProblemSpec, files_json: &str, errors: &str) -> Result<Prompt> {
    let engine = PromptEngine::new();
    let ctx = context! {
        statement => spec.statement.trim(),
        requirements => spec.requirements_line(),
        files_json => files_json,
        errors => errors.trim(),
    };
    Ok(Prompt {
        system: engine.render("repairer_system", ctx.clone())?,
        user: engine.render("repairer_user", ctx)?,
    })
}

fn non_empty(rendered: String) -> Option<String> {
    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}
