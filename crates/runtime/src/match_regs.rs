//! Foreign state marked by the collector
//!
//! Some modules keep values alive outside any heap cell. The regexp engine
//! is the standing example: the registers of the last match and a stack of
//! saved matches both refer to the subject that was searched. Such state
//! implements [`ForeignData`] and is registered once with
//! [`Heap::add_foreign_data`](crate::heap::Heap::add_foreign_data); the
//! collector calls it after the type-level mark hooks.

use crate::mark::Marker;
use cellmem_core::Value;
use std::cell::RefCell;

/// Number of match registers, register 0 being the whole match
pub const NSUBEXP: usize = 10;

/// State outside the heap that retains heap values
pub trait ForeignData {
    fn mark_foreign(&self, marker: &mut Marker<'_>);
}

/// Match registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registers {
    /// Byte offsets into a string subject
    String {
        start: [Option<usize>; NSUBEXP],
        end: [Option<usize>; NSUBEXP],
    },
    /// Positions in a text buffer; positions are heap values
    Buffer {
        start: [Value; NSUBEXP],
        end: [Value; NSUBEXP],
    },
}

impl Default for Registers {
    fn default() -> Self {
        Registers::String {
            start: [None; NSUBEXP],
            end: [None; NSUBEXP],
        }
    }
}

impl Registers {
    fn mark(&self, marker: &mut Marker<'_>) {
        if let Registers::Buffer { start, end } = self {
            marker.mark_all(start.iter().chain(end.iter()).copied());
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SavedMatch {
    subject: Value,
    registers: Registers,
}

#[derive(Debug, Default)]
struct MatchState {
    subject: Value,
    registers: Registers,
    saved: Vec<SavedMatch>,
}

/// The regexp module's match registers and saved-match stack
#[derive(Debug, Default)]
pub struct MatchData {
    state: RefCell<MatchState>,
}

impl MatchData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a successful match against `subject`
    pub fn set_last_match(&self, subject: Value, registers: Registers) {
        let mut state = self.state.borrow_mut();
        state.subject = subject;
        state.registers = registers;
    }

    pub fn last_subject(&self) -> Value {
        self.state.borrow().subject
    }

    pub fn last_registers(&self) -> Registers {
        self.state.borrow().registers
    }

    /// Push the current match so a nested search can clobber it
    pub fn save(&self) {
        let mut state = self.state.borrow_mut();
        let entry = SavedMatch {
            subject: state.subject,
            registers: state.registers,
        };
        state.saved.push(entry);
    }

    /// Pop the most recently saved match back into the registers
    ///
    /// Returns false if nothing was saved.
    pub fn restore(&self) -> bool {
        let mut state = self.state.borrow_mut();
        match state.saved.pop() {
            Some(entry) => {
                state.subject = entry.subject;
                state.registers = entry.registers;
                true
            }
            None => false,
        }
    }

    pub fn saved_depth(&self) -> usize {
        self.state.borrow().saved.len()
    }
}

impl ForeignData for MatchData {
    fn mark_foreign(&self, marker: &mut Marker<'_>) {
        let state = self.state.borrow();
        marker.mark(state.subject);
        state.registers.mark(marker);
        for entry in &state.saved {
            marker.mark(entry.subject);
            entry.registers.mark(marker);
        }
    }
}
