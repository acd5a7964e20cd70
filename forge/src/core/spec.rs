//! Problem specification and required-input validation.

use std::collections::BTreeMap;
use std::fmt;

/// Immutable description of the problem a run tries to solve.
///
/// Defined once at process start from config; never mutated by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemSpec {
    /// Natural-language problem statement.
    pub statement: String,
    /// Requirement strings the solution must meet.
    pub requirements: Vec<String>,
    /// Module input parameters: name -> human description. Every input must
    /// be present as an uppercase environment variable before a run starts.
    pub inputs: BTreeMap<String, String>,
    /// Module output parameters: name -> human description.
    pub outputs: BTreeMap<String, String>,
    /// Optional usage sketch interpolated into the builder prompt.
    pub example_usage: Option<String>,
}

impl ProblemSpec {
    /// Requirements joined for prompt interpolation.
    pub fn requirements_line(&self) -> String {
        self.requirements.join("; ")
    }

    /// Environment variable name carrying the value for an input parameter.
    pub fn env_var_for(name: &str) -> String {
        name.to_uppercase()
    }
}

/// Render a name -> description map as `name (description), ...` for prompts.
pub fn describe_params(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(name, description)| format!("{name} ({description})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// All required input variables missing from the environment, in input order.
///
/// `lookup` abstracts `std::env::var` so this stays pure. An empty value
/// counts as missing.
pub fn missing_inputs<F>(spec: &ProblemSpec, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    spec.inputs
        .keys()
        .map(|name| ProblemSpec::env_var_for(name))
        .filter(|var| lookup(var).is_none_or(|value| value.trim().is_empty()))
        .collect()
}

/// Read every input's value into an explicit, scoped map keyed by input name.
///
/// The returned map is threaded through the apply call and handed to the
/// subprocess via `Command::env`; nothing is written to the parent process
/// environment. Fails with [`MissingInputsError`] enumerating every absent
/// variable before any generation call is made.
pub fn collect_vars<F>(spec: &ProblemSpec, lookup: F) -> Result<BTreeMap<String, String>, MissingInputsError>
where
    F: Fn(&str) -> Option<String>,
{
    let missing = missing_inputs(spec, &lookup);
    if !missing.is_empty() {
        return Err(MissingInputsError { names: missing });
    }
    let vars = spec
        .inputs
        .keys()
        .map(|name| {
            let value = lookup(&ProblemSpec::env_var_for(name)).unwrap_or_default();
            (name.clone(), value)
        })
        .collect();
    Ok(vars)
}

/// Required input variables absent from the environment.
///
/// Fatal: aborts the run before any generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingInputsError {
    pub names: Vec<String>,
}

impl fmt::Display for MissingInputsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listed = self
            .names
            .iter()
            .map(|name| format!("missing input '{name}', could not be found in env var"))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{listed}")
    }
}

impl std::error::Error for MissingInputsError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_spec;

    #[test]
    fn describe_params_joins_names_with_descriptions() {
        let mut params = BTreeMap::new();
        params.insert("aws_region".to_string(), "The AWS region".to_string());
        params.insert("path_to_html".to_string(), "Path to the HTML".to_string());

        assert_eq!(
            describe_params(&params),
            "aws_region (The AWS region), path_to_html (Path to the HTML)"
        );
    }

    #[test]
    fn describe_params_empty_map_is_empty_string() {
        assert_eq!(describe_params(&BTreeMap::new()), "");
    }

    #[test]
    fn missing_inputs_enumerates_every_absent_variable() {
        let spec = sample_spec();
        let missing = missing_inputs(&spec, |var| {
            if var == "AWS_REGION" {
                Some("eu-west-1".to_string())
            } else {
                None
            }
        });

        assert_eq!(
            missing,
            vec![
                "AWS_ACCESS_KEY_ID".to_string(),
                "AWS_SECRET_ACCESS_KEY".to_string(),
                "PATH_TO_STATIC_HTML".to_string(),
            ]
        );
    }

    #[test]
    fn missing_inputs_treats_blank_values_as_missing() {
        let spec = sample_spec();
        let missing = missing_inputs(&spec, |_| Some("  ".to_string()));
        assert_eq!(missing.len(), spec.inputs.len());
    }

    #[test]
    fn collect_vars_keys_by_input_name_not_env_var() {
        let spec = sample_spec();
        let vars = collect_vars(&spec, |var| Some(format!("value-of-{var}"))).expect("vars");

        assert_eq!(
            vars.get("aws_region").map(String::as_str),
            Some("value-of-AWS_REGION")
        );
        assert_eq!(vars.len(), spec.inputs.len());
    }

    #[test]
    fn collect_vars_fails_with_all_missing_names() {
        let spec = sample_spec();
        let err = collect_vars(&spec, |_| None).expect_err("should fail");

        assert_eq!(err.names.len(), spec.inputs.len());
        let rendered = err.to_string();
        assert!(rendered.contains("missing input 'AWS_REGION'"));
        assert!(rendered.contains("missing input 'PATH_TO_STATIC_HTML'"));
    }

    #[test]
    fn requirements_line_joins_with_semicolons() {
        let spec = sample_spec();
        assert!(spec.requirements_line().contains("; "));
    }
}
