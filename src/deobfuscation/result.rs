//! Deobfuscation result types.

use std::time::Duration;

use crate::{
    compiler::{EventKind, EventLog},
    metadata::{method::MethodBody, token::Token},
    Error, Result,
};

/// Outcome of a batch run of [`crate::deobfuscation::DeobfuscationEngine::process_methods`].
///
/// Every input method has exactly one slot, in input order. A failure only affects the
/// slot of the method that failed.
#[derive(Debug)]
pub struct DeobfuscationResult {
    /// Regenerated body or error per input method.
    pub methods: Vec<(Token, Result<MethodBody>)>,
    /// All events recorded during the batch.
    pub events: EventLog,
    /// Total processing time.
    pub total_time: Duration,
}

impl DeobfuscationResult {
    /// Creates a new result.
    #[must_use]
    pub fn new(methods: Vec<(Token, Result<MethodBody>)>, events: EventLog) -> Self {
        Self {
            methods,
            events,
            total_time: Duration::ZERO,
        }
    }

    /// Sets the processing time.
    #[must_use]
    pub fn with_timing(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Methods that were regenerated successfully.
    pub fn succeeded(&self) -> impl Iterator<Item = (Token, &MethodBody)> {
        self.methods
            .iter()
            .filter_map(|(token, result)| result.as_ref().ok().map(|body| (*token, body)))
    }

    /// Methods that failed, with their error.
    pub fn failed(&self) -> impl Iterator<Item = (Token, &Error)> {
        self.methods
            .iter()
            .filter_map(|(token, result)| result.as_ref().err().map(|err| (*token, err)))
    }

    /// Looks up the outcome of one method.
    #[must_use]
    pub fn get(&self, token: Token) -> Option<&Result<MethodBody>> {
        self.methods
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, result)| result)
    }

    /// Generates a human-readable summary of the batch.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} of {} methods regenerated in {:.2?} ({} blocks removed, {} merges)",
            self.succeeded().count(),
            self.methods.len(),
            self.total_time,
            self.events.total(EventKind::BlockRemoved),
            self.events.total(EventKind::BlocksMerged),
        )
    }
}
