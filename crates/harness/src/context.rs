//! Run-scoped state threaded through the runner and the aggregator

use colored::Colorize;
use std::collections::BTreeMap;

use crate::error::{HarnessError, HarnessResult};
use crate::report::{Aggregator, OutputFormat, Reporter};
use crate::server::ProcessState;

/// Terminal styling for one run
#[derive(Debug, Clone, Copy)]
pub struct Style {
    pub color: bool,
}

impl Style {
    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn success(&self, text: &str) -> String {
        if self.color {
            text.green().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn failure(&self, text: &str) -> String {
        if self.color {
            text.red().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn header(&self, text: &str) -> String {
        if self.color {
            text.yellow().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn info(&self, text: &str) -> String {
        if self.color {
            text.blue().to_string()
        } else {
            text.to_string()
        }
    }
}

/// Which suite currently owns which port
#[derive(Debug, Default)]
pub struct PortLedger {
    held: BTreeMap<u16, String>,
}

impl PortLedger {
    pub fn claim(&mut self, port: u16, owner: &str) -> HarnessResult<()> {
        if self.held.contains_key(&port) {
            return Err(HarnessError::PortInUse(port));
        }
        self.held.insert(port, owner.to_string());
        Ok(())
    }

    pub fn release(&mut self, port: u16) {
        self.held.remove(&port);
    }

    pub fn holder(&self, port: u16) -> Option<&str> {
        self.held.get(&port).map(String::as_str)
    }
}

/// One observed server state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub suite: String,
    pub port: u16,
    pub state: ProcessState,
}

/// Ordered record of every server state change in a run
#[derive(Debug, Default)]
pub struct Timeline {
    events: Vec<LifecycleEvent>,
}

impl Timeline {
    pub fn record(&mut self, suite: &str, port: u16, state: ProcessState) {
        self.events.push(LifecycleEvent {
            suite: suite.to_string(),
            port,
            state,
        });
    }

    pub fn events(&self) -> &[LifecycleEvent] {
        &self.events
    }

    /// Events for one suite, in order
    pub fn for_suite<'a>(&'a self, suite: &'a str) -> impl Iterator<Item = &'a LifecycleEvent> {
        self.events.iter().filter(move |e| e.suite == suite)
    }
}

/// Everything a run mutates. Nothing here is global, so independent runs
/// (for example in tests) do not interfere.
pub struct RunContext {
    pub reporter: Reporter,
    pub aggregator: Aggregator,
    pub ports: PortLedger,
    pub timeline: Timeline,
}

impl RunContext {
    pub fn new(style: Style, format: OutputFormat) -> Self {
        Self {
            reporter: Reporter::new(style, format),
            aggregator: Aggregator::new(),
            ports: PortLedger::default(),
            timeline: Timeline::default(),
        }
    }

    /// No terminal output at all
    pub fn quiet() -> Self {
        Self {
            reporter: Reporter::silent(),
            ..Self::new(Style::plain(), OutputFormat::Table)
        }
    }
}
