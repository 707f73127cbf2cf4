//! In-memory implementations of the outbound ports.
//!
//! Every fake writes what it was asked to do into a shared [`Journal`], which
//! lets tests assert on ordering across collaborators (for example that a
//! scoped target context is released before its session is closed).

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use devtarget_common::network::target::{DiscoveredNode, Endpoint, TargetSelector};
use devtarget_common::{Result, TargetError};

use crate::ports::{
    CommandOutput, DiscoveryService, ProcessOutcome, ProcessRunner, Registration, RemoteSession,
    SessionFactory,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.0).iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.count(prefix) > 0
    }

    /// Index of the first entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        lock(&self.0).iter().position(|e| e.starts_with(prefix))
    }
}

// ─── Discovery ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DiscoveryState {
    listings: VecDeque<Result<Vec<DiscoveredNode>>>,
    default_listing: Vec<DiscoveredNode>,
    addresses: HashMap<String, Endpoint>,
    hidden_until_paved: HashSet<String>,
    failures_after_pave: u32,
    wait_fails: bool,
}

/// Discovery service with a scripted view of the network.
#[derive(Debug, Clone)]
pub struct FakeDiscovery {
    state: Arc<Mutex<DiscoveryState>>,
    journal: Journal,
}

impl FakeDiscovery {
    pub fn new(journal: Journal) -> Self {
        Self {
            state: Arc::default(),
            journal,
        }
    }

    /// Every listing returns `nodes` unless a one-shot listing is queued.
    pub fn with_listing(self, nodes: Vec<DiscoveredNode>) -> Self {
        lock(&self.state).default_listing = nodes;
        self
    }

    pub fn queue_listing(self, listing: Result<Vec<DiscoveredNode>>) -> Self {
        lock(&self.state).listings.push_back(listing);
        self
    }

    pub fn with_address(self, node_name: &str, endpoint: Endpoint) -> Self {
        lock(&self.state).addresses.insert(node_name.to_string(), endpoint);
        self
    }

    /// `node_name` cannot be resolved until a paving command was journaled,
    /// and then only after `failures` more unsuccessful lookups.
    pub fn hidden_until_paved(self, node_name: &str, failures: u32) -> Self {
        {
            let mut state = lock(&self.state);
            state.hidden_until_paved.insert(node_name.to_string());
            state.failures_after_pave = failures;
        }
        self
    }

    pub fn failing_wait(self) -> Self {
        lock(&self.state).wait_fails = true;
        self
    }
}

#[async_trait]
impl DiscoveryService for FakeDiscovery {
    async fn list_targets(&self) -> Result<Vec<DiscoveredNode>> {
        self.journal.record("discovery.list");
        let mut state = lock(&self.state);
        match state.listings.pop_front() {
            Some(listing) => listing,
            None => Ok(state.default_listing.clone()),
        }
    }

    async fn ssh_address(&self, node_name: &str) -> Result<Endpoint> {
        self.journal.record(format!("discovery.resolve {node_name}"));
        let paved = self.journal.contains("process.run pave");
        let mut state = lock(&self.state);

        if state.hidden_until_paved.contains(node_name) {
            if !paved {
                return Err(TargetError::QueryFailed(format!("{node_name} is not visible")));
            }
            if state.failures_after_pave > 0 {
                state.failures_after_pave -= 1;
                return Err(TargetError::QueryFailed(format!("{node_name} is still booting")));
            }
        }

        state
            .addresses
            .get(node_name)
            .cloned()
            .ok_or_else(|| TargetError::QueryFailed(format!("no address for {node_name}")))
    }

    async fn add_target(&self, endpoint: &Endpoint) -> Result<Box<dyn Registration>> {
        self.journal.record(format!("discovery.add {endpoint}"));
        Ok(Box::new(FakeRegistration {
            endpoint: endpoint.clone(),
            journal: self.journal.clone(),
        }))
    }

    async fn wait_reachable(&self, target: &TargetSelector, timeout: Duration) -> Result<()> {
        self.journal
            .record(format!("discovery.wait {target} {}s", timeout.as_secs()));
        if lock(&self.state).wait_fails {
            return Err(TargetError::QueryFailed(format!("{target} is not attachable")));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct FakeRegistration {
    endpoint: Endpoint,
    journal: Journal,
}

impl Registration for FakeRegistration {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn release(&mut self) -> Result<()> {
        self.journal.record(format!("discovery.remove {}", self.endpoint));
        Ok(())
    }
}

// ─── Sessions ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DeviceState {
    files: HashMap<String, String>,
    failing_commands: HashSet<String>,
    probe_failures: u32,
    terminate_fails: bool,
}

/// A simulated device reachable over any endpoint.
#[derive(Debug, Clone)]
pub struct FakeSessions {
    device: Arc<Mutex<DeviceState>>,
    journal: Journal,
}

impl FakeSessions {
    pub fn new(journal: Journal) -> Self {
        Self {
            device: Arc::default(),
            journal,
        }
    }

    pub fn with_file(self, path: &str, contents: &str) -> Self {
        lock(&self.device)
            .files
            .insert(path.to_string(), contents.to_string());
        self
    }

    /// Commands whose joined form equals `command` exit with status 1.
    pub fn failing_command(self, command: &str) -> Self {
        lock(&self.device)
            .failing_commands
            .insert(command.to_string());
        self
    }

    /// The first `failures` reachability probes fail.
    pub fn unreachable_for(self, failures: u32) -> Self {
        lock(&self.device).probe_failures = failures;
        self
    }

    pub fn failing_terminate(self) -> Self {
        lock(&self.device).terminate_fails = true;
        self
    }
}

impl SessionFactory for FakeSessions {
    fn open(&self, endpoint: &Endpoint) -> Box<dyn RemoteSession> {
        self.journal.record(format!("session.open {endpoint}"));
        Box::new(FakeSession {
            device: self.device.clone(),
            journal: self.journal.clone(),
        })
    }
}

struct FakeSession {
    device: Arc<Mutex<DeviceState>>,
    journal: Journal,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn run(&self, command: &[&str], _timeout: Option<Duration>) -> Result<CommandOutput> {
        let joined = command.join(" ");
        self.journal.record(format!("session.run {joined}"));
        let mut device = lock(&self.device);

        if joined == "true" && device.probe_failures > 0 {
            device.probe_failures -= 1;
            return Ok(CommandOutput {
                exit_code: Some(255),
                stderr: "ssh: connect to host: Connection refused".into(),
                ..CommandOutput::default()
            });
        }

        if device.failing_commands.contains(&joined) {
            return Ok(CommandOutput {
                exit_code: Some(1),
                stderr: format!("{joined}: failed"),
                ..CommandOutput::default()
            });
        }

        if let ["cat", path] = command {
            return Ok(match device.files.get(*path) {
                Some(contents) => CommandOutput {
                    exit_code: Some(0),
                    stdout: contents.clone(),
                    ..CommandOutput::default()
                },
                None => CommandOutput {
                    exit_code: Some(1),
                    stderr: format!("cat: {path}: No such file or directory"),
                    ..CommandOutput::default()
                },
            });
        }

        Ok(CommandOutput {
            exit_code: Some(0),
            ..CommandOutput::default()
        })
    }

    async fn terminate(&self) -> Result<()> {
        self.journal.record("session.terminate");
        if lock(&self.device).terminate_fails {
            return Err(TargetError::RemoteCommand {
                command: "-O exit".into(),
                exit_code: Some(255),
                output: "Control socket connect: No such file or directory".into(),
            });
        }
        Ok(())
    }

    fn close(&mut self) {
        self.journal.record("session.close");
    }
}

// ─── Processes ──────────────────────────────────────────────────────────────

/// Subprocess runner replaying scripted outcomes.
///
/// Invocations are journaled as `process.run <file name> <args...>`.
#[derive(Debug, Clone)]
pub struct FakeProcesses {
    outcomes: Arc<Mutex<HashMap<String, ProcessOutcome>>>,
    invocations: Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>,
    journal: Journal,
}

impl FakeProcesses {
    pub fn new(journal: Journal) -> Self {
        Self {
            outcomes: Arc::default(),
            invocations: Arc::default(),
            journal,
        }
    }

    /// Programs are matched by file name, so `/images/pave.sh` matches `pave.sh`.
    pub fn with_outcome(self, program: &str, outcome: ProcessOutcome) -> Self {
        lock(&self.outcomes).insert(program.to_string(), outcome);
        self
    }

    pub fn exiting(self, program: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.with_outcome(
            program,
            ProcessOutcome::Exited(CommandOutput {
                exit_code: Some(exit_code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        )
    }

    pub fn invocations(&self) -> Vec<(PathBuf, Vec<String>)> {
        lock(&self.invocations).clone()
    }
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

#[async_trait]
impl ProcessRunner for FakeProcesses {
    async fn run(&self, program: &Path, args: &[String], _timeout: Duration) -> Result<ProcessOutcome> {
        let name = program_name(program);
        let mut entry = format!("process.run {}", name.trim_end_matches(".sh"));
        for arg in args {
            entry.push(' ');
            entry.push_str(arg);
        }
        self.journal.record(entry);
        lock(&self.invocations).push((program.to_path_buf(), args.to_vec()));

        Ok(lock(&self.outcomes)
            .get(&name)
            .cloned()
            .unwrap_or_else(|| ProcessOutcome::Exited(CommandOutput {
                exit_code: Some(0),
                ..CommandOutput::default()
            })))
    }
}
