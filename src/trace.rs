//! # Trace
//! What the workers did, in the order the monitor saw it, and an offline check of that order.
//!
//! An event prints as `<class>-<worker>-<kind>`, e.g. `B-3-Rel`.
//! `Req` and `Rel` are recorded from inside the manager's critical section (see
//! [ResourceManager::request_with](crate::manager::ResourceManager::request_with)), so their
//! order in the trace is the order in which the monitor decided them.
//!
//! [validate] replays the trace against the policy:
//! - at most one holder at a time
//! - FIFO within a class
//! - class B goes first on release
//!
//! A class A worker overtaken by B arrivals forever is a valid trace.

use std::{
    collections::VecDeque,
    fmt,
    str::FromStr,
    sync::Mutex,
    time::{Duration, Instant},
};

use strum_macros::{Display, EnumString};

use crate::{error::TraceError, manager::Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum EventKind {
    Req,
    Use,
    Rel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub priority: Priority,
    pub worker: usize,
    pub kind: EventKind,
    /// since the trace started
    pub at: Duration,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.priority, self.worker, self.kind)
    }
}

impl FromStr for Event {
    type Err = ();

    /// Parses the `<class>-<worker>-<kind>` token, `at` is left at zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (Some(priority), Some(worker), Some(kind), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(());
        };
        Ok(Self {
            priority: priority.parse().map_err(|_| ())?,
            worker: worker.parse().map_err(|_| ())?,
            kind: kind.parse().map_err(|_| ())?,
            at: Duration::ZERO,
        })
    }
}

/// A thread-safe, append-only event log.
pub struct Trace {
    started: Instant,
    events: Mutex<Vec<Event>>,
}

impl Trace {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, priority: Priority, worker: usize, kind: EventKind) {
        let at = self.started.elapsed();
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Event {
                priority,
                worker,
                kind,
                at,
            });
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads one event per line. Only the last whitespace-separated field counts, anything
/// before it (a timestamp) is ignored. Blank lines are skipped.
pub fn parse(text: &str) -> Result<Vec<Event>, TraceError> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| line.split_whitespace().last().map(|token| (i + 1, token)))
        .map(|(line, token)| {
            token.parse().map_err(|_| TraceError::Parse {
                line,
                token: token.to_string(),
            })
        })
        .collect()
}

/// The expected state of the resource while replaying a trace.
struct Replay {
    owner: Option<usize>,
    used: bool,
    waiting_a: VecDeque<usize>,
    waiting_b: VecDeque<usize>,
}

impl Replay {
    fn step(&mut self, event: &Event) -> Result<(), &'static str> {
        match event.kind {
            EventKind::Req => match self.owner {
                None => {
                    self.owner = Some(event.worker);
                    self.used = false;
                }
                Some(owner) if owner == event.worker => {
                    return Err("the holder requested the resource again")
                }
                Some(_) => match event.priority {
                    Priority::A => self.waiting_a.push_back(event.worker),
                    Priority::B => self.waiting_b.push_back(event.worker),
                },
            },
            EventKind::Use => {
                if self.owner != Some(event.worker) {
                    return Err("used by a worker that doesn't hold it");
                }
                if self.used {
                    return Err("used twice in one hold");
                }
                self.used = true;
            }
            EventKind::Rel => {
                if self.owner != Some(event.worker) {
                    return Err("released by a worker that doesn't hold it");
                }
                if !self.used {
                    return Err("released before being used");
                }
                self.owner = self
                    .waiting_b
                    .pop_front()
                    .or_else(|| self.waiting_a.pop_front());
                self.used = false;
            }
        }
        Ok(())
    }
}

/// Checks the trace, stopping at the first event that breaks the policy.
pub fn validate(events: &[Event]) -> Result<(), TraceError> {
    let mut replay = Replay {
        owner: None,
        used: false,
        waiting_a: VecDeque::new(),
        waiting_b: VecDeque::new(),
    };
    for (index, event) in events.iter().enumerate() {
        replay
            .step(event)
            .map_err(|reason| TraceError::Violation {
                index,
                event: event.clone(),
                reason,
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn events(tokens: &[&str]) -> Vec<Event> {
        tokens.iter().map(|t| t.parse().unwrap()).collect()
    }

    #[test]
    fn test_event_text_form() {
        let e: Event = "B-12-Rel".parse().unwrap();
        assert_eq!(e.priority, Priority::B);
        assert_eq!(e.worker, 12);
        assert_eq!(e.kind, EventKind::Rel);
        assert_eq!(e.to_string(), "B-12-Rel");

        for bad in ["", "A-1", "C-1-Req", "A-x-Req", "A-1-Go", "A-1-Req-1"] {
            assert!(bad.parse::<Event>().is_err(), "{bad} parsed");
        }
    }

    #[test]
    fn test_parse_skips_timestamps_and_blanks() {
        let parsed = parse("  1.2ms A-1-Req\n\n3ms A-1-Use\nA-1-Rel\n").unwrap();
        assert_eq!(parsed, events(&["A-1-Req", "A-1-Use", "A-1-Rel"]));

        match parse("A-1-Req\nnope\n") {
            Err(TraceError::Parse { line, token }) => {
                assert_eq!(line, 2);
                assert_eq!(token, "nope");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_class_b_goes_first() {
        let ok = events(&[
            "A-1-Req", "A-1-Use", "A-2-Req", "B-3-Req", "A-1-Rel", "B-3-Use", "B-3-Rel",
            "A-2-Use", "A-2-Rel",
        ]);
        validate(&ok).unwrap();

        let wrong = events(&["A-1-Req", "A-1-Use", "A-2-Req", "B-3-Req", "A-1-Rel", "A-2-Use"]);
        match validate(&wrong) {
            Err(TraceError::Violation { index, .. }) => assert_eq!(index, 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fifo_within_class() {
        let wrong = events(&["B-1-Req", "B-1-Use", "A-2-Req", "A-3-Req", "B-1-Rel", "A-3-Use"]);
        assert!(validate(&wrong).is_err());
    }

    #[test]
    fn test_starving_class_a_is_valid() {
        let mut tokens = vec!["B-1-Req", "B-1-Use", "A-2-Req"];
        for _ in 0..3 {
            tokens.extend(["B-3-Req", "B-1-Rel", "B-3-Use", "B-1-Req", "B-3-Rel", "B-1-Use"]);
        }
        validate(&events(&tokens)).unwrap();
    }

    #[test]
    fn test_holder_misuse() {
        for bad in [
            &["A-1-Req", "A-1-Req"][..],
            &["A-1-Req", "A-2-Use"],
            &["A-1-Req", "A-1-Use", "A-1-Use"],
            &["A-1-Req", "A-1-Rel"],
            &["A-1-Rel"],
        ] {
            assert!(validate(&events(bad)).is_err(), "{bad:?} passed");
        }
    }

    #[test]
    fn test_recorder() {
        let trace = Trace::new();
        assert!(trace.is_empty());
        trace.record(Priority::A, 1, EventKind::Req);
        trace.record(Priority::A, 1, EventKind::Use);
        assert_eq!(trace.len(), 2);
        let events = trace.into_events();
        assert_eq!(events[1].to_string(), "A-1-Use");
        assert!(events[0].at <= events[1].at);
    }
}
