//! Generated file set: parsing and validation of generation service replies.
//!
//! The service is asked for JSON mapping relative file paths to file
//! contents. Replies are free-form model output, so they are schema-checked
//! (Draft 2020-12) before anything touches the filesystem; violations are a
//! distinct, retryable error kind rather than a crash.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Component;
use std::sync::LazyLock;

use jsonschema::Draft;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const REPLY_SCHEMA: &str = include_str!("../../schemas/module_reply/v1.schema.json");

static REPLY_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(REPLY_SCHEMA).expect("embedded reply schema should be valid JSON");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("embedded reply schema should compile")
});

/// Contents of one generated file: a string, or a structure serialized to
/// JSON on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileBody {
    Text(String),
    Structured(Value),
}

impl FileBody {
    /// Bytes to write to disk for this entry.
    pub fn render(&self) -> String {
        match self {
            FileBody::Text(text) => text.clone(),
            FileBody::Structured(value) => {
                // Object keys are strings, so serialization cannot fail.
                serde_json::to_string_pretty(value).expect("json value serializes")
            }
        }
    }
}

/// Mapping of relative file path -> contents. Replaced wholesale on each
/// repair iteration, never merged.
pub type FileSet = BTreeMap<String, FileBody>;

/// Auxiliary follow-up task the model may attach to a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub folder: String,
    pub prompt: String,
}

/// Parsed generation service reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleReply {
    pub files: FileSet,
    pub tasks: Vec<TaskSpec>,
    /// Name of the module output carrying the public URL, when designated.
    pub url_output: Option<String>,
}

/// Generation reply was empty, malformed, or failed schema validation.
///
/// Fatal on the initial generation call; counts as a failed attempt during
/// repair iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidReplyError {
    pub reason: String,
}

impl fmt::Display for InvalidReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid generation reply: {}", self.reason)
    }
}

impl std::error::Error for InvalidReplyError {}

fn invalid(reason: impl Into<String>) -> InvalidReplyError {
    InvalidReplyError {
        reason: reason.into(),
    }
}

/// Parse and validate a generation service reply.
///
/// Accepts either a flat path->contents object or a wrapper object
/// `{"code": {...}, "tasks": [...], "url": "..."}`. Markdown code fences
/// around the JSON body are stripped first.
pub fn parse_reply(raw: &str) -> Result<ModuleReply, InvalidReplyError> {
    let body = strip_fences(raw);
    if body.trim().is_empty() {
        return Err(invalid("empty reply"));
    }

    let value: Value = serde_json::from_str(body).map_err(|err| invalid(format!("not valid JSON: {err}")))?;
    validate_against_schema(&value)?;

    let object = value
        .as_object()
        .ok_or_else(|| invalid("reply is not a JSON object"))?;

    let reply = if let Some(code) = object.get("code").and_then(Value::as_object) {
        let tasks = match object.get("tasks") {
            Some(tasks) => serde_json::from_value(tasks.clone())
                .map_err(|err| invalid(format!("malformed tasks: {err}")))?,
            None => Vec::new(),
        };
        let url_output = object
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string);
        ModuleReply {
            files: file_map(code)?,
            tasks,
            url_output,
        }
    } else {
        ModuleReply {
            files: file_map(object)?,
            tasks: Vec::new(),
            url_output: None,
        }
    };

    if reply.files.is_empty() {
        return Err(invalid("empty file set"));
    }
    debug!(
        files = reply.files.len(),
        tasks = reply.tasks.len(),
        "parsed generation reply"
    );
    Ok(reply)
}

fn file_map(object: &serde_json::Map<String, Value>) -> Result<FileSet, InvalidReplyError> {
    let mut files = FileSet::new();
    for (path, contents) in object {
        check_relative(path)?;
        let body = match contents {
            Value::String(text) => FileBody::Text(text.clone()),
            other => FileBody::Structured(other.clone()),
        };
        files.insert(path.clone(), body);
    }
    Ok(files)
}

/// Reject paths that would escape the output directory.
fn check_relative(path: &str) -> Result<(), InvalidReplyError> {
    if path.trim().is_empty() {
        return Err(invalid("empty file path"));
    }
    let parsed = std::path::Path::new(path);
    for component in parsed.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(invalid(format!("file path '{path}' contains '..'")));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid(format!("file path '{path}' is not relative")));
            }
        }
    }
    Ok(())
}

fn validate_against_schema(instance: &Value) -> Result<(), InvalidReplyError> {
    let messages: Vec<String> = REPLY_VALIDATOR
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(invalid(format!(
            "schema validation failed:\n- {}",
            messages.join("\n- ")
        )));
    }
    Ok(())
}

/// Strip a surrounding Markdown code fence, if present.
fn strip_fences(raw: &str) -> &str {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)^\s*```(?:json)?\s*\n?(.*?)\n?\s*```\s*$").unwrap()
    });
    match FENCE_RE.captures(raw) {
        Some(caps) => caps.get(1).map_or(raw, |m| m.as_str()),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_file_map() {
        let reply = parse_reply(r##"{"main.tf": "provider \"aws\" {}", "README.md": "# hi"}"##)
            .expect("parse");

        assert_eq!(reply.files.len(), 2);
        assert_eq!(
            reply.files.get("main.tf"),
            Some(&FileBody::Text("provider \"aws\" {}".to_string()))
        );
        assert!(reply.tasks.is_empty());
        assert_eq!(reply.url_output, None);
    }

    #[test]
    fn parses_wrapper_with_tasks_and_url() {
        let raw = r#"{
            "code": {"main.tf": "resource {}", "variables.tf": "variable \"x\" {}"},
            "tasks": [{"folder": "frontend", "prompt": "build the frontend"}],
            "url": "public_url"
        }"#;
        let reply = parse_reply(raw).expect("parse");

        assert_eq!(reply.files.len(), 2);
        assert_eq!(reply.tasks.len(), 1);
        assert_eq!(reply.tasks[0].folder, "frontend");
        assert_eq!(reply.url_output, Some("public_url".to_string()));
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n{\"main.tf\": \"x\"}\n```";
        let reply = parse_reply(raw).expect("parse");
        assert_eq!(reply.files.len(), 1);
    }

    #[test]
    fn strips_bare_fences() {
        let raw = "```\n{\"main.tf\": \"x\"}\n```";
        let reply = parse_reply(raw).expect("parse");
        assert_eq!(reply.files.len(), 1);
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_reply("sorry, I cannot help with that").expect_err("should fail");
        assert!(err.reason.contains("not valid JSON"));
    }

    #[test]
    fn rejects_empty_reply() {
        let err = parse_reply("   \n").expect_err("should fail");
        assert_eq!(err.reason, "empty reply");
    }

    #[test]
    fn rejects_empty_file_map() {
        let err = parse_reply("{}").expect_err("should fail");
        assert!(err.reason.contains("schema validation failed"));
    }

    #[test]
    fn rejects_non_object_reply() {
        let err = parse_reply("[1, 2, 3]").expect_err("should fail");
        assert!(err.reason.contains("schema validation failed"));
    }

    #[test]
    fn rejects_scalar_file_contents_via_schema() {
        let err = parse_reply(r#"{"main.tf": 42}"#).expect_err("should fail");
        assert!(err.reason.contains("schema validation failed"));
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        let err = parse_reply(r#"{"../escape.tf": "x"}"#).expect_err("should fail");
        assert!(err.reason.contains("contains '..'"));
    }

    #[test]
    fn rejects_absolute_paths() {
        let err = parse_reply(r#"{"/etc/passwd": "x"}"#).expect_err("should fail");
        assert!(err.reason.contains("not relative"));
    }

    #[test]
    fn structured_contents_render_as_pretty_json() {
        let reply = parse_reply(r#"{"config.json": {"key": "value"}}"#).expect("parse");
        let rendered = reply.files.get("config.json").expect("entry").render();
        assert!(rendered.contains("\"key\": \"value\""));
    }

    #[test]
    fn nested_paths_are_accepted() {
        let reply = parse_reply(r#"{"modules/vpc/main.tf": "x"}"#).expect("parse");
        assert!(reply.files.contains_key("modules/vpc/main.tf"));
    }
}
