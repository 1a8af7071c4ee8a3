// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Finite-state machines over the byte alphabet of JSON strings.
//!
//! Property-match compilation builds one NFA per literal or pattern,
//! unions them, and determinizes the union into a single DFA whose end
//! states carry opaque payloads (match-case indices). The payload of a
//! DFA end state is derived from the payloads of the NFA end states it
//! subsumes; when there is more than one, a caller-supplied merge hook
//! decides the combined payload. State numbering is breadth-first over
//! the subset construction, so the same input always produces the same
//! machine.

mod regex;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use anyhow::Result;

pub type StateId = usize;

#[derive(Debug, Clone, Default)]
struct NfaState {
    /// Byte-range transitions `(lo, hi, target)`, inclusive on both ends.
    ranges: Vec<(u8, u8, StateId)>,
    eps: Vec<StateId>,
    opaque: Option<usize>,
}

/// A Thompson NFA. State 0 is the start state.
#[derive(Debug, Clone)]
pub struct Nfa {
    states: Vec<NfaState>,
}

impl Default for Nfa {
    fn default() -> Self {
        Nfa::new()
    }
}

impl Nfa {
    pub fn new() -> Nfa {
        Nfa {
            states: vec![NfaState::default()],
        }
    }

    /// An NFA accepting exactly `text`, with `opaque` on its end state.
    pub fn literal(text: &str, opaque: usize) -> Nfa {
        let mut nfa = Nfa::new();
        let mut cur = 0;
        for &b in text.as_bytes() {
            let next = nfa.add_state();
            nfa.add_range(cur, b, b, next);
            cur = next;
        }
        nfa.set_opaque(cur, opaque);
        nfa
    }

    /// An NFA for a regular expression, with `opaque` on its end state.
    ///
    /// Patterns use unanchored search semantics: the machine accepts a
    /// string iff the pattern matches somewhere inside it. A leading `^`
    /// or trailing `$` anchors the corresponding side.
    pub fn pattern(text: &str, opaque: usize) -> Result<Nfa> {
        regex::pattern(text, opaque)
    }

    fn add_state(&mut self) -> StateId {
        self.states.push(NfaState::default());
        self.states.len() - 1
    }

    fn add_range(&mut self, from: StateId, lo: u8, hi: u8, to: StateId) {
        self.states[from].ranges.push((lo, hi, to));
    }

    fn add_eps(&mut self, from: StateId, to: StateId) {
        self.states[from].eps.push(to);
    }

    fn set_opaque(&mut self, state: StateId, opaque: usize) {
        self.states[state].opaque = Some(opaque);
    }

    /// Union `other` into this machine: the start state grows an epsilon
    /// edge into a relocated copy of `other`. Opaques carry over as-is,
    /// so callers give each unioned member a distinct payload.
    pub fn union(&mut self, other: &Nfa) {
        let offset = self.states.len();
        for st in &other.states {
            self.states.push(NfaState {
                ranges: st
                    .ranges
                    .iter()
                    .map(|&(lo, hi, t)| (lo, hi, t + offset))
                    .collect(),
                eps: st.eps.iter().map(|&t| t + offset).collect(),
                opaque: st.opaque,
            });
        }
        self.states[0].eps.push(offset);
    }

    fn closure(&self, seed: &[StateId]) -> Vec<StateId> {
        let mut seen: BTreeSet<StateId> = seed.iter().copied().collect();
        let mut work: Vec<StateId> = seed.to_vec();
        while let Some(s) = work.pop() {
            for &e in &self.states[s].eps {
                if seen.insert(e) {
                    work.push(e);
                }
            }
        }
        seen.into_iter().collect()
    }

    fn step(&self, set: &[StateId], byte: u8) -> Vec<StateId> {
        let mut out: BTreeSet<StateId> = BTreeSet::new();
        for &s in set {
            for &(lo, hi, t) in &self.states[s].ranges {
                if lo <= byte && byte <= hi {
                    out.insert(t);
                }
            }
        }
        if out.is_empty() {
            return Vec::new();
        }
        let seed: Vec<StateId> = out.into_iter().collect();
        self.closure(&seed)
    }

    fn build_state<F>(&self, set: &[StateId], merge: &mut F) -> DfaState
    where
        F: FnMut(&[usize]) -> usize,
    {
        // NFA states are numbered in union insertion order, and `set` is
        // sorted, so the merge hook sees payloads in insertion order.
        let mut opaques: Vec<usize> = Vec::new();
        for &s in set {
            if let Some(o) = self.states[s].opaque {
                if !opaques.contains(&o) {
                    opaques.push(o);
                }
            }
        }
        if opaques.is_empty() {
            DfaState::default()
        } else {
            DfaState {
                trans: BTreeMap::new(),
                end: true,
                opaque: Some(merge(&opaques)),
            }
        }
    }

    /// Subset-construction determinization. `merge` combines the opaque
    /// payloads of the NFA end states subsumed by one DFA state; it is
    /// invoked once per end state in BFS discovery order.
    pub fn determinize<F>(&self, mut merge: F) -> Dfa
    where
        F: FnMut(&[usize]) -> usize,
    {
        let start = self.closure(&[0]);
        let mut states = vec![self.build_state(&start, &mut merge)];
        let mut index: BTreeMap<Vec<StateId>, StateId> = BTreeMap::new();
        index.insert(start.clone(), 0);
        let mut queue: VecDeque<(StateId, Vec<StateId>)> = VecDeque::new();
        queue.push_back((0, start));

        while let Some((sid, set)) = queue.pop_front() {
            for byte in 0..=255u8 {
                let next = self.step(&set, byte);
                if next.is_empty() {
                    continue;
                }
                let tid = if let Some(&t) = index.get(&next) {
                    t
                } else {
                    let t = states.len();
                    states.push(self.build_state(&next, &mut merge));
                    index.insert(next.clone(), t);
                    queue.push_back((t, next));
                    t
                };
                states[sid].trans.insert(byte, tid);
            }
        }
        Dfa { states }
    }
}

#[derive(Debug, Clone, Default)]
struct DfaState {
    trans: BTreeMap<u8, StateId>,
    end: bool,
    opaque: Option<usize>,
}

/// A deterministic machine produced by [`Nfa::determinize`]. State 0 is
/// the start state.
#[derive(Debug, Clone, Default)]
pub struct Dfa {
    states: Vec<DfaState>,
}

impl Dfa {
    pub fn start(&self) -> StateId {
        0
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Visit every state id; the visitor counterpart of the contract's
    /// `all` operation.
    pub fn states(&self) -> impl Iterator<Item = StateId> {
        0..self.states.len()
    }

    pub fn is_end(&self, state: StateId) -> bool {
        self.states.get(state).is_some_and(|s| s.end)
    }

    pub fn opaque(&self, state: StateId) -> Option<usize> {
        self.states.get(state).and_then(|s| s.opaque)
    }

    pub fn set_opaque(&mut self, state: StateId, opaque: Option<usize>) {
        if let Some(s) = self.states.get_mut(state) {
            s.opaque = opaque;
        }
    }

    /// Single transition; `None` means the dead state.
    pub fn next_byte(&self, state: StateId, byte: u8) -> Option<StateId> {
        self.states.get(state).and_then(|s| s.trans.get(&byte)).copied()
    }

    /// Feed a whole string through the machine; the end-state payload if
    /// it accepts.
    pub fn accepts(&self, input: &str) -> Option<usize> {
        let mut cur = self.start();
        for &b in input.as_bytes() {
            cur = self.next_byte(cur, b)?;
        }
        if self.is_end(cur) {
            self.opaque(cur)
        } else {
            None
        }
    }
}
