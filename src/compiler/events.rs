//! Event logging for the block pipeline.
//!
//! Passes and the engine never print. They record [`Event`]s into an [`EventLog`], which
//! callers can inspect, summarize or ignore.
//!
//! # Example
//!
//! ```rust
//! use cilflow::{compiler::{EventKind, EventLog}, metadata::token::Token};
//!
//! let log = EventLog::new();
//! log.record(EventKind::BlockRemoved)
//!     .method(Token::new(0x0600_0001))
//!     .message("removed 3 unreachable blocks");
//! log.info("pipeline finished");
//!
//! assert_eq!(log.count_kind(EventKind::BlockRemoved), 1);
//! assert_eq!(log.summary(), "1 block removed");
//! ```

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::metadata::token::Token;

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
pub enum EventKind {
    /// A block was removed as unreachable.
    BlockRemoved,
    /// A block was merged into its predecessor.
    BlocksMerged,
    /// An edge into a `nop`-only block was routed past it.
    NopBlockBypassed,
    /// A conditional branch was inverted.
    BranchFlipped,
    /// A region's children were reordered.
    RegionReordered,

    /// A pass started on a method.
    PassStarted,
    /// A pass completed on a method.
    PassCompleted,
    /// Method processing started.
    MethodProcessingStarted,
    /// Method processing completed.
    MethodProcessingCompleted,
    /// A method body was regenerated.
    CodeRegenerated,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (processing of a method failed).
    Error,
}

impl EventKind {
    /// Short lowercase label, used in messages and summaries.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::BlockRemoved => "block removed",
            Self::BlocksMerged => "blocks merged",
            Self::NopBlockBypassed => "nop block bypassed",
            Self::BranchFlipped => "branch flipped",
            Self::RegionReordered => "region reordered",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::MethodProcessingStarted => "method processing started",
            Self::MethodProcessingCompleted => "method processing completed",
            Self::CodeRegenerated => "code regenerated",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// `true` for kinds that report an edit of the block tree.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::BlockRemoved
                | Self::BlocksMerged
                | Self::NopBlockBypassed
                | Self::BranchFlipped
                | Self::RegionReordered
        )
    }

    /// `true` for free-form messages.
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One entry of an [`EventLog`].
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Method the event refers to, `None` for engine-wide messages
    pub method: Option<Token>,
    /// Number of items the event stands for (blocks removed, edges redirected, ...)
    pub count: usize,
    /// Free text, defaults to the kind's description
    pub message: String,
    /// Pass that recorded the event
    pub pass: Option<&'static str>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(pass) = self.pass {
            write!(f, " {pass}")?;
        }
        if let Some(method) = self.method {
            write!(f, " {method}")?;
        }
        if self.count != 1 {
            write!(f, " x{}", self.count)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Pending event returned by [`EventLog::record`].
///
/// Nothing is logged until the builder goes out of scope, so the usual pattern is a single
/// chained statement.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Event,
    custom_message: bool,
}

impl EventBuilder<'_> {
    /// Attaches the event to a method.
    pub fn method(mut self, method: Token) -> Self {
        self.event.method = Some(method);
        self
    }

    /// Sets the item count (default 1).
    pub fn count(mut self, count: usize) -> Self {
        self.event.count = count;
        self
    }

    /// Replaces the default message.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.event.message = msg.into();
        self.custom_message = true;
        self
    }

    /// Names the pass that produced the event.
    pub fn pass(mut self, pass_name: &'static str) -> Self {
        self.event.pass = Some(pass_name);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if !self.custom_message {
            self.event.message = self.event.kind.description().to_string();
        }
        let event = std::mem::replace(&mut self.event, blank(EventKind::Info));
        self.log.events.push(event);
    }
}

fn blank(kind: EventKind) -> Event {
    Event {
        kind,
        method: None,
        count: 1,
        message: String::new(),
        pass: None,
    }
}

/// Append-only, thread-safe list of [`Event`]s.
///
/// Recording only needs `&self`, so a single log is shared by all rayon workers of a batch.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts an event of `kind`; see [`EventBuilder`].
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: blank(kind),
            custom_message: false,
        }
    }

    /// Logs an engine-wide [`EventKind::Info`] message.
    pub fn info(&self, message: impl Into<String>) {
        self.record(EventKind::Info).message(message);
    }

    /// Logs an engine-wide [`EventKind::Warning`] message.
    pub fn warn(&self, message: impl Into<String>) {
        self.record(EventKind::Warning).message(message);
    }

    /// Logs an engine-wide [`EventKind::Error`] message.
    pub fn error(&self, message: impl Into<String>) {
        self.record(EventKind::Error).message(message);
    }

    /// Copies every event of `other` to the end of this log.
    pub fn merge(&self, other: &EventLog) {
        other.iter().for_each(|event| {
            self.events.push(event.clone());
        });
    }

    /// `true` if at least one event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.filter_kind(kind).next().is_some()
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).count()
    }

    /// Sum of the item counts of all events of `kind`.
    #[must_use]
    pub fn total(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).map(|e| e.count).sum()
    }

    /// All events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.into_iter()
    }

    /// Events of one kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Events attached to `method`.
    pub fn filter_method(&self, method: Token) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.method == Some(method))
    }

    /// [`EventKind::Error`] events.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Number of events per kind; kinds that never occurred are absent.
    #[must_use]
    pub fn count_by_kind(&self) -> FxHashMap<EventKind, usize> {
        self.iter().fold(FxHashMap::default(), |mut counts, event| {
            *counts.entry(event.kind).or_default() += 1;
            counts
        })
    }

    /// Number of distinct methods whose tree was edited.
    #[must_use]
    pub fn methods_affected(&self) -> usize {
        self.iter()
            .filter(|e| e.kind.is_transformation())
            .filter_map(|e| e.method)
            .collect::<FxHashSet<_>>()
            .len()
    }

    /// One-line overview: the transformation counts in [`EventKind`] order, or just the
    /// number of events when no transformation happened.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let counts = self.count_by_kind();
        let parts: Vec<String> = EventKind::iter()
            .filter(EventKind::is_transformation)
            .filter_map(|kind| {
                counts
                    .get(&kind)
                    .map(|count| format!("{count} {}", kind.description()))
            })
            .collect();

        if parts.is_empty() {
            format!("{} events", self.len())
        } else {
            parts.join(", ")
        }
    }
}

/// Iterator over the events of an [`EventLog`].
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, event)| event)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        iter.into_iter().for_each(|event| {
            log.events.push(event);
        });
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_on_drop() {
        let log = EventLog::new();
        assert!(log.is_empty());
        log.record(EventKind::BlockRemoved)
            .method(Token::new(0x0600_0002))
            .count(4)
            .pass("dead-blocks");

        let event = log.iter().next().unwrap();
        assert_eq!(event.message, "block removed");
        assert_eq!(event.count, 4);
        assert_eq!(event.pass, Some("dead-blocks"));
        assert_eq!(log.total(EventKind::BlockRemoved), 4);
        assert_eq!(log.methods_affected(), 1);
        assert_eq!(
            event.to_string(),
            "[block removed] dead-blocks 0x06000002 x4: block removed"
        );
    }

    #[test]
    fn test_summary() {
        let log = EventLog::new();
        assert_eq!(log.summary(), "no events");
        log.info("starting");
        assert_eq!(log.summary(), "1 events");
        log.record(EventKind::BlocksMerged);
        log.record(EventKind::BlocksMerged);
        log.record(EventKind::BlockRemoved);
        assert_eq!(log.summary(), "1 block removed, 2 blocks merged");
    }

    #[test]
    fn test_concurrent_recording() {
        use rayon::prelude::*;

        let log = EventLog::new();
        (0..64u32).into_par_iter().for_each(|i| {
            log.record(EventKind::CodeRegenerated)
                .method(Token::new(0x0600_0000 + i));
        });
        assert_eq!(log.count_kind(EventKind::CodeRegenerated), 64);
        assert_eq!(log.clone().len(), 64);
    }

    #[test]
    fn test_kind_classification() {
        for kind in EventKind::iter() {
            let name: &'static str = kind.into();
            assert!(!name.is_empty());
            assert!(!(kind.is_transformation() && kind.is_diagnostic()));
        }
    }
}
