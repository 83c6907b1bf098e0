//! Variable scope management.
//!
//! Scripts have one global frame plus one local frame per active user
//! function call. Lookups check the innermost local frame, then globals;
//! assignments inside a function bind locally.
//!
//! Each slot remembers the estimated size of its value so the live size of
//! all variables is known without re-walking every value after each
//! statement.

use std::collections::HashMap;

use super::value::Value;

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    size: usize,
}

impl Slot {
    fn new(value: Value) -> Self {
        let size = value.estimated_size();
        Self { value, size }
    }
}

type Frame = HashMap<String, Slot>;

fn frame_bytes(frame: &Frame) -> usize {
    frame.values().map(|slot| slot.size).sum()
}

/// Variable scope with a global frame and a stack of call frames.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    globals: Frame,
    locals: Vec<Frame>,
    live_bytes: usize,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a function call.
    pub fn push_frame(&mut self) {
        self.locals.push(Frame::new());
    }

    /// Leave a function call, releasing its locals.
    pub fn pop_frame(&mut self) {
        if let Some(frame) = self.locals.pop() {
            self.live_bytes = self.live_bytes.saturating_sub(frame_bytes(&frame));
        }
    }

    /// Number of active call frames.
    pub fn depth(&self) -> usize {
        self.locals.len()
    }

    fn current(&self) -> &Frame {
        self.locals.last().unwrap_or(&self.globals)
    }

    fn current_mut(&mut self) -> &mut Frame {
        match self.locals.last_mut() {
            Some(frame) => frame,
            None => &mut self.globals,
        }
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.current().get(name).or_else(|| self.globals.get(name))
    }

    /// Bind a name in the current frame.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let slot = Slot::new(value);
        let added = slot.size;
        let replaced = self
            .current_mut()
            .insert(name.into(), slot)
            .map_or(0, |old| old.size);
        self.live_bytes = (self.live_bytes + added).saturating_sub(replaced);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slot(name).map(|slot| &slot.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }

    /// Look up a top-level binding regardless of the active frame.
    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name).map(|slot| &slot.value)
    }

    /// Mutable access for in-place updates (`items.append(x)`, `d[k] = v`).
    /// Callers report the size change through [`Scope::adjust`].
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        if self.current().contains_key(name) {
            return self.current_mut().get_mut(name).map(|slot| &mut slot.value);
        }
        self.globals.get_mut(name).map(|slot| &mut slot.value)
    }

    /// Record that the value bound to `name` grew or shrank by `delta` bytes.
    pub fn adjust(&mut self, name: &str, delta: i64) {
        let slot = if self.current().contains_key(name) {
            self.current_mut().get_mut(name)
        } else {
            self.globals.get_mut(name)
        };
        let Some(slot) = slot else {
            return;
        };
        let apply = |n: usize| {
            if delta >= 0 {
                n.saturating_add(delta as usize)
            } else {
                n.saturating_sub(delta.unsigned_abs() as usize)
            }
        };
        let before = slot.size;
        let after = apply(before);
        slot.size = after;
        self.live_bytes = (self.live_bytes + after).saturating_sub(before);
    }

    /// Estimated bytes held by all live variables.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Top-level names in sorted order.
    pub fn global_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.globals.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_shadow_globals() {
        let mut scope = Scope::new();
        scope.set("x", Value::Int(1));
        scope.push_frame();
        assert_eq!(scope.get("x"), Some(&Value::Int(1)));
        scope.set("x", Value::Int(2));
        assert_eq!(scope.get("x"), Some(&Value::Int(2)));
        assert_eq!(scope.get_global("x"), Some(&Value::Int(1)));
        scope.pop_frame();
        assert_eq!(scope.get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn live_bytes_track_bindings() {
        let mut scope = Scope::new();
        assert_eq!(scope.live_bytes(), 0);
        scope.set("s", Value::str("x".repeat(100)));
        let with_string = scope.live_bytes();
        assert!(with_string >= 100);

        scope.set("s", Value::Int(1));
        assert!(scope.live_bytes() < with_string);

        scope.push_frame();
        scope.set("local", Value::str("y".repeat(50)));
        assert!(scope.live_bytes() >= 50);
        scope.pop_frame();
        assert_eq!(scope.live_bytes(), Value::Int(1).estimated_size());
    }

    #[test]
    fn adjust_follows_in_place_growth() {
        let mut scope = Scope::new();
        scope.set("items", Value::list(Vec::new()));
        let before = scope.live_bytes();
        scope.adjust("items", 40);
        assert_eq!(scope.live_bytes(), before + 40);
        scope.adjust("items", -40);
        assert_eq!(scope.live_bytes(), before);
    }

    #[test]
    fn global_names_sorted() {
        let mut scope = Scope::new();
        scope.set("b", Value::None);
        scope.set("a", Value::None);
        assert_eq!(scope.global_names(), ["a", "b"]);
    }
}
