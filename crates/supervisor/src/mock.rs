//! In-memory [`Supervisor`] used by tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use agentbox_topology::{JoinTopology, Node};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::spawn::Supervisor;

/// Something [`MockSupervisor`] was asked to do.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SupervisorEvent {
    /// An agent was launched.
    Start {
        /// Node name
        name: String,
        /// Assigned pid
        pid: u32,
        /// Servers the agent was told to join
        join: JoinTopology,
    },
    /// An agent was stopped.
    Stop {
        /// Node name
        name: String,
        /// Stopped pid
        pid: u32,
    },
    /// Background work was drained.
    Finish,
}

#[derive(Debug)]
struct MockState {
    next_pid: u32,
    names: BTreeMap<u32, String>,
    alive: HashSet<u32>,
    failing: HashSet<String>,
    events: Vec<SupervisorEvent>,
}

/// Hands out fake pids and records every call.
#[derive(Clone, Debug)]
pub struct MockSupervisor {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSupervisor {
    /// Creates a supervisor whose first pid is 1000.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_pid: 1000,
                names: BTreeMap::new(),
                alive: HashSet::new(),
                failing: HashSet::new(),
                events: Vec::new(),
            })),
        }
    }

    /// Makes every start of `name` fail.
    #[must_use]
    pub fn failing_on(self, name: &str) -> Self {
        self.state.lock().failing.insert(name.to_string());
        self
    }

    /// Recorded events in call order.
    #[must_use]
    pub fn events(&self) -> Vec<SupervisorEvent> {
        self.state.lock().events.clone()
    }

    /// Names of started nodes in start order.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SupervisorEvent::Start { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Names of stopped nodes in stop order.
    #[must_use]
    pub fn stopped(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SupervisorEvent::Stop { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Marks `pid` as exited without a stop request.
    pub fn exit(&self, pid: u32) {
        self.state.lock().alive.remove(&pid);
    }
}

#[async_trait]
impl Supervisor for MockSupervisor {
    async fn start(&self, node: &Node, join: &JoinTopology) -> Result<u32> {
        let mut state = self.state.lock();
        if state.failing.contains(&node.name) {
            return Err(Error::SpawnProcess(format!("refused to start {}", node.name)));
        }

        let pid = state.next_pid;
        state.next_pid += 1;
        state.names.insert(pid, node.name.clone());
        state.alive.insert(pid);
        state.events.push(SupervisorEvent::Start {
            name: node.name.clone(),
            pid,
            join: join.clone(),
        });

        Ok(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().alive.contains(&pid)
    }

    async fn stop(&self, pid: u32) -> Result<()> {
        let mut state = self.state.lock();
        let name = state.names.get(&pid).cloned().ok_or(Error::InvalidPid(pid))?;
        state.alive.remove(&pid);
        state.events.push(SupervisorEvent::Stop { name, pid });
        Ok(())
    }

    async fn finish(&self) {
        self.state.lock().events.push(SupervisorEvent::Finish);
    }
}
