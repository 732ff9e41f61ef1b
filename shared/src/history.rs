//! Linear undo/redo history over a single document value.
//!
//! Every edit goes through [`reduce`], a pure transition from one
//! [`HistoryState`] to the next. Edits made after an undo discard the
//! redo timeline; there is no branching.

use std::collections::VecDeque;
use std::mem;

/// A document shape that supports typed single-field edits.
pub trait Patch: Sized {
    type Field;

    fn with_field(&self, field: Self::Field) -> Self;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryState<T> {
    /// Oldest first.
    pub past: Vec<T>,
    pub present: T,
    /// Next redo candidate at the front.
    pub future: VecDeque<T>,
}

impl<T> HistoryState<T> {
    pub fn new(present: T) -> Self {
        Self {
            past: Vec::new(),
            present,
            future: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryCommand<T: Patch> {
    Undo,
    Redo,
    Set(T),
    UpdateField(T::Field),
}

pub fn reduce<T>(mut state: HistoryState<T>, command: HistoryCommand<T>) -> HistoryState<T>
where
    T: Patch + PartialEq,
{
    apply(&mut state, command);
    state
}

fn apply<T>(state: &mut HistoryState<T>, command: HistoryCommand<T>)
where
    T: Patch + PartialEq,
{
    match command {
        HistoryCommand::Undo => {
            if let Some(previous) = state.past.pop() {
                let current = mem::replace(&mut state.present, previous);
                state.future.push_front(current);
            }
        }
        HistoryCommand::Redo => {
            if let Some(next) = state.future.pop_front() {
                let current = mem::replace(&mut state.present, next);
                state.past.push(current);
            }
        }
        HistoryCommand::Set(value) => {
            if value != state.present {
                record(state, value);
            }
        }
        // Field edits always create an entry, even when the value did not change.
        HistoryCommand::UpdateField(field) => {
            let next = state.present.with_field(field);
            record(state, next);
        }
    }
}

fn record<T>(state: &mut HistoryState<T>, next: T) {
    let current = mem::replace(&mut state.present, next);
    state.past.push(current);
    state.future.clear();
}

/// Owns a [`HistoryState`] and applies commands to it in place.
#[derive(Debug, Clone)]
pub struct History<T> {
    state: HistoryState<T>,
}

impl<T> History<T>
where
    T: Patch + PartialEq,
{
    pub fn new(initial: T) -> Self {
        Self {
            state: HistoryState::new(initial),
        }
    }

    pub fn present(&self) -> &T {
        &self.state.present
    }

    pub fn dispatch(&mut self, command: HistoryCommand<T>) {
        apply(&mut self.state, command);
    }

    pub fn replace(&mut self, value: T) {
        self.dispatch(HistoryCommand::Set(value));
    }

    pub fn update_field(&mut self, field: T::Field) {
        self.dispatch(HistoryCommand::UpdateField(field));
    }

    pub fn undo(&mut self) {
        self.dispatch(HistoryCommand::Undo);
    }

    pub fn redo(&mut self) {
        self.dispatch(HistoryCommand::Redo);
    }

    pub fn can_undo(&self) -> bool {
        !self.state.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.future.is_empty()
    }

    pub fn past_len(&self) -> usize {
        self.state.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.state.future.len()
    }
}
