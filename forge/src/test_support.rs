//! Test-only scripted doubles and fixtures.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};

use anyhow::{Result, anyhow};

use crate::core::fileset::{FileBody, FileSet};
use crate::core::spec::ProblemSpec;
use crate::io::generator::{Generator, Prompt};
use crate::io::terraform::{Applier, ApplyOutcome, ApplyRequest};

/// One scripted generation service reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this text as the reply.
    Text(String),
    /// Fail the call with this message.
    Fail(String),
}

/// Generator that returns queued replies without network.
///
/// Panics when called with an empty queue, so tests catch unexpected calls.
pub struct ScriptedGenerator {
    replies: RefCell<VecDeque<ScriptedReply>>,
    calls: Cell<u32>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl Generator for ScriptedGenerator {
    fn complete(&self, _prompt: &Prompt) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .expect("unexpected generation call: scripted replies exhausted");
        match reply {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Fail(message) => Err(anyhow!(message)),
        }
    }
}

/// Applier that returns queued outcomes and records the requests it saw.
///
/// Panics when called with an empty queue, so tests catch unexpected calls.
pub struct ScriptedApplier {
    outcomes: RefCell<VecDeque<ApplyOutcome>>,
    requests: RefCell<Vec<ApplyRequest>>,
    calls: Cell<u32>,
}

impl ScriptedApplier {
    pub fn new(outcomes: Vec<ApplyOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            requests: RefCell::new(Vec::new()),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    pub fn last_request(&self) -> Option<ApplyRequest> {
        self.requests.borrow().last().cloned()
    }
}

impl Applier for ScriptedApplier {
    fn apply(&self, request: &ApplyRequest) -> Result<ApplyOutcome> {
        self.calls.set(self.calls.get() + 1);
        self.requests.borrow_mut().push(request.clone());
        let outcome = self
            .outcomes
            .borrow_mut()
            .pop_front()
            .expect("unexpected apply call: scripted outcomes exhausted");
        Ok(outcome)
    }
}

/// The static-website example problem.
pub fn sample_spec() -> ProblemSpec {
    let mut inputs = BTreeMap::new();
    inputs.insert(
        "aws_region".to_string(),
        "The AWS region to deploy to".to_string(),
    );
    inputs.insert(
        "aws_access_key_id".to_string(),
        "The AWS access key ID".to_string(),
    );
    inputs.insert(
        "aws_secret_access_key".to_string(),
        "The AWS secret access key".to_string(),
    );
    inputs.insert(
        "path_to_static_html".to_string(),
        "The path to the static HTML file".to_string(),
    );

    let mut outputs = BTreeMap::new();
    outputs.insert(
        "public_url".to_string(),
        "The public URL of the website".to_string(),
    );

    ProblemSpec {
        statement: "Bring the static HTML at ./index.html to the public internet using AWS."
            .to_string(),
        requirements: vec![
            "I can reach the website from a web browser".to_string(),
            "The website is reachable from the public internet".to_string(),
            "The website is served over HTTPS".to_string(),
        ],
        inputs,
        outputs,
        example_usage: None,
    }
}

/// Build a file set of plain text entries.
pub fn text_fileset(entries: &[(&str, &str)]) -> FileSet {
    entries
        .iter()
        .map(|(path, contents)| ((*path).to_string(), FileBody::Text((*contents).to_string())))
        .collect()
}

/// Serialize entries as the flat JSON reply shape the generation service
/// returns.
pub fn reply_json(entries: &[(&str, &str)]) -> String {
    let map: BTreeMap<&str, &str> = entries.iter().copied().collect();
    serde_json::to_string(&map).expect("serialize reply json")
}
