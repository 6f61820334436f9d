//! Active tape state.
//!
//! The session owns the name of the active tape and its in-memory record
//! sequence. It is only ever touched through `ProxyCore`, which keeps it
//! behind a single mutex.

use std::fmt;

use crate::http::request::IncomingRequest;
use crate::matching::RecordMatcher;
use crate::tape::Interaction;

/// Stable identifier for one in-memory record.
///
/// Ids are assigned monotonically and never reused within a session, so
/// removing a record is unambiguous even when two records are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

#[cfg(test)]
impl RecordId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record-{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: RecordId,
    interaction: Interaction,
}

/// Active tape name plus its ordered records.
#[derive(Debug)]
pub struct Session {
    tape: String,
    entries: Vec<Entry>,
    next_id: u64,
}

impl Session {
    pub fn new(tape: impl Into<String>) -> Self {
        Self {
            tape: tape.into(),
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub fn tape(&self) -> &str {
        &self.tape
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Swap in a different tape and its records wholesale.
    pub fn replace(&mut self, tape: impl Into<String>, interactions: Vec<Interaction>) {
        self.tape = tape.into();
        self.entries.clear();
        for interaction in interactions {
            self.push(interaction);
        }
    }

    /// Append a record at the end of the sequence.
    pub fn push(&mut self, interaction: Interaction) -> RecordId {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, interaction });
        id
    }

    /// Remove a record by id.
    pub fn remove(&mut self, id: RecordId) -> Option<Interaction> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index).interaction)
    }

    /// Find the first matching record and remove it in one step.
    pub fn take_match(
        &mut self,
        matcher: &RecordMatcher,
        request: &IncomingRequest,
    ) -> Option<(RecordId, Interaction)> {
        let candidates = self.entries.iter().map(|e| (e.id, &e.interaction.request));
        let id = matcher.find(candidates, request)?;
        self.remove(id).map(|interaction| (id, interaction))
    }

    /// Current records, in order, for persisting.
    pub fn snapshot(&self) -> Vec<Interaction> {
        self.entries.iter().map(|e| e.interaction.clone()).collect()
    }
}
