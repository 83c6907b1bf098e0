//! Name binding tracking for validation.
//!
//! Tracks which names are bound in each scope without caring about values.
//! Because a script arrives incrementally, a name used before any binding is
//! not an error yet: it is parked as a pending reference and only reported
//! if nothing binds it by the time the script is finalized.

use std::collections::HashSet;
use std::ops::Range;

use super::diagnostic::Location;

/// How an unresolved name was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Read as a value.
    Name,
    /// Called.
    Call,
}

/// A use of a name that was not bound at the point of use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRef {
    pub name: String,
    pub span: Range<usize>,
    pub location: Location,
    pub kind: RefKind,
}

#[derive(Debug, Default)]
struct Frame {
    bound: HashSet<String>,
    pending: Vec<PendingRef>,
}

/// Tracks name bindings across the global scope and nested `def` bodies.
///
/// Unlike the interpreter's Scope which holds values, this only tracks names
/// for static validation purposes.
#[derive(Debug)]
pub struct ScopeTracker {
    /// Global frame first, innermost function last.
    frames: Vec<Frame>,
}

impl Default for ScopeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTracker {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    /// Enter a function body.
    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Leave a function body.
    ///
    /// Pending references the function bound itself (later in its body) are
    /// dropped; the rest move to the enclosing frame, which may still bind
    /// them. The global frame is never popped.
    pub fn pop_frame(&mut self) {
        if self.frames.len() <= 1 {
            return;
        }
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let unresolved: Vec<PendingRef> = frame
            .pending
            .into_iter()
            .filter(|r| !frame.bound.contains(&r.name) && !self.is_bound(&r.name))
            .collect();
        if let Some(parent) = self.frames.last_mut() {
            parent.pending.extend(unresolved);
        }
    }

    /// Bind a name in the current frame.
    pub fn bind(&mut self, name: impl Into<String>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.bound.insert(name.into());
        }
    }

    /// Check if a name is bound in any enclosing frame.
    pub fn is_bound(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|frame| frame.bound.contains(name))
    }

    /// Record a use of a name that is not bound yet.
    pub fn defer(&mut self, reference: PendingRef) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pending.push(reference);
        }
    }

    /// Current nesting depth; 1 is the global scope.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Close every open frame and return references nothing ever bound,
    /// in the order they were first seen.
    pub fn take_unresolved(&mut self) -> Vec<PendingRef> {
        while self.frames.len() > 1 {
            self.pop_frame();
        }
        let Some(global) = self.frames.first_mut() else {
            return Vec::new();
        };
        let pending = std::mem::take(&mut global.pending);
        pending
            .into_iter()
            .filter(|r| !global.bound.contains(&r.name))
            .collect()
    }

    /// Names bound at the top level, sorted.
    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .frames
            .first()
            .map(|f| f.bound.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
