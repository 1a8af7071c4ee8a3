// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::Serialize;

/// Events produced by a SAX-style streaming JSON parser.
///
/// The compiled IR branches on these: every type `SWITCH` in the
/// constraint tree has one arm per event, and every `ISTOK` predicate
/// names one of them. `None` means no token is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Event {
    None,
    Null,
    True,
    False,
    Number,
    String,
    ObjectBeg,
    ObjectEnd,
    ArrayBeg,
    ArrayEnd,
}

/// Number of event kinds; the arity of every type `SWITCH`.
pub const NUM_EVENTS: usize = 10;

pub const ALL_EVENTS: [Event; NUM_EVENTS] = [
    Event::None,
    Event::Null,
    Event::True,
    Event::False,
    Event::Number,
    Event::String,
    Event::ObjectBeg,
    Event::ObjectEnd,
    Event::ArrayBeg,
    Event::ArrayEnd,
];

impl Event {
    /// Index of this event into a `SWITCH` arm array.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(ix: usize) -> Option<Event> {
        ALL_EVENTS.get(ix).copied()
    }

    /// Name used by the IR dump, e.g. `ISTOK($OBJECT_BEG)`.
    pub fn name(self) -> &'static str {
        match self {
            Event::None => "NONE",
            Event::Null => "NULL",
            Event::True => "TRUE",
            Event::False => "FALSE",
            Event::Number => "NUMBER",
            Event::String => "STRING",
            Event::ObjectBeg => "OBJECT_BEG",
            Event::ObjectEnd => "OBJECT_END",
            Event::ArrayBeg => "ARRAY_BEG",
            Event::ArrayEnd => "ARRAY_END",
        }
    }

    /// Whether a value can begin with this event. `OBJECT_END` and
    /// `ARRAY_END` only close a container opened earlier, and `NONE`
    /// means the stream is exhausted.
    pub fn starts_value(self) -> bool {
        !matches!(self, Event::None | Event::ObjectEnd | Event::ArrayEnd)
    }
}
