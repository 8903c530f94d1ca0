//! Scripted command runner for tests.
//!
//! Lets tests exercise the reconcilers without a live cluster: canned
//! responses are replayed in order and every argument vector received is
//! recorded for assertion.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output};
use std::sync::Mutex;

use crate::client::{CommandRunner, RunFuture};

/// One canned subprocess result.
#[derive(Debug, Clone)]
pub struct Response {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl Response {
    /// Successful exit with the given stdout.
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            code: 0,
        }
    }

    /// Exit code 1 with the given stderr.
    pub fn fail(stderr: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.to_string(),
            code: 1,
        }
    }
}

/// Replays scripted responses in order and records every call.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<Response>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new(responses: Vec<Response>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Argument vectors received so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Received argument vectors re-joined into command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(|argv| argv.join(" ")).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, argv: &'a [String]) -> RunFuture<'a> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(argv.to_vec());

            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(io::Error::other(format!("unscripted command: {argv:?}")));
            }
            let response = responses.remove(0);

            Ok(Output {
                status: ExitStatus::from_raw(response.code << 8),
                stdout: response.stdout.into_bytes(),
                stderr: response.stderr.into_bytes(),
            })
        })
    }
}
