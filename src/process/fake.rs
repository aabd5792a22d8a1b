use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CommandLine, CommandOutput, CommandRunner};
use crate::error::Result;

/// A [`CommandRunner`] that answers from a script instead of spawning processes.
///
/// Responses are matched by prefix of the rendered command line; a prefix registered more
/// than once answers in registration order and repeats its last answer. Unmatched commands
/// succeed with empty output. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    calls: Mutex<Vec<CommandLine>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, prefix: &str, output: CommandOutput) -> Self {
        {
            let mut responses = self.responses.lock().unwrap();
            match responses.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, queue)) => queue.push_back(output),
                None => responses.push((prefix.to_string(), VecDeque::from([output]))),
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rendered_calls(&self) -> Vec<String> {
        self.calls().iter().map(CommandLine::render).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let rendered = command.render();
        let mut responses = self.responses.lock().unwrap();
        // Longest matching prefix wins
        let matched = responses
            .iter_mut()
            .filter(|(prefix, _)| rendered.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());
        let output = match matched {
            Some((_, queue)) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some((_, queue)) => queue.front().cloned().unwrap_or_default(),
            None => CommandOutput::default(),
        };
        Ok(output)
    }
}
