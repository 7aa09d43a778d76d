//! In-memory doubles for the driver and tunnel capabilities.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::engine::config::{ConnectionOptions, TunnelConfig};
use crate::engine::drivers::{Driver, DriverHandle};
use crate::engine::error::BoxError;
use crate::engine::registry::DriverRegistry;
use crate::engine::sql_safety::returns_rows;
use crate::engine::ssh_tunnel::{Tunnel, TunnelError, TunnelProvider};
use crate::engine::types::{ColumnInfo, RawResult, Value};

/// Lifecycle events shared between doubles so tests can assert ordering.
pub type EventLog = Arc<Mutex<Vec<String>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct MockState {
    statements: Vec<(String, Vec<Value>)>,
    failures: Vec<(String, String)>,
    responses: Vec<(String, RawResult)>,
    fail_open: Option<String>,
    fail_close: Option<String>,
    opened: Vec<(String, ConnectionOptions)>,
}

impl MockState {
    fn failure_for(&self, sql: &str) -> Option<String> {
        let upper = sql.to_ascii_uppercase();
        self.failures
            .iter()
            .find(|(pattern, _)| upper.contains(pattern.as_str()))
            .map(|(_, message)| message.clone())
    }
}

/// Scripted driver. Every clone shares the same script and history.
#[derive(Clone)]
pub struct MockDriver {
    schemes: &'static [&'static str],
    state: Arc<Mutex<MockState>>,
    events: EventLog,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::with_schemes(&["mock"])
    }

    pub fn with_schemes(schemes: &'static [&'static str]) -> Self {
        Self {
            schemes,
            state: Arc::default(),
            events: Arc::default(),
        }
    }

    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// Statements containing `pattern` (case-insensitive) fail with `message`.
    /// `BEGIN`, `COMMIT` and `ROLLBACK` match the transaction calls.
    pub fn fail_on(&self, pattern: &str, message: &str) {
        lock(&self.state)
            .failures
            .push((pattern.to_ascii_uppercase(), message.to_string()));
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    /// Statements containing `pattern` return `result`.
    pub fn respond(&self, pattern: &str, result: RawResult) {
        lock(&self.state)
            .responses
            .push((pattern.to_ascii_uppercase(), result));
    }

    pub fn fail_open(&self, message: &str) {
        lock(&self.state).fail_open = Some(message.to_string());
    }

    pub fn fail_close(&self, message: &str) {
        lock(&self.state).fail_close = Some(message.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }

    /// Every executed statement, liveness probes included.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.state)
            .statements
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        lock(&self.state).statements.clone()
    }

    /// URIs passed to `open`, in order.
    pub fn opened_uris(&self) -> Vec<String> {
        lock(&self.state)
            .opened
            .iter()
            .map(|(uri, _)| uri.clone())
            .collect()
    }

    pub fn opened_options(&self) -> Vec<ConnectionOptions> {
        lock(&self.state)
            .opened
            .iter()
            .map(|(_, options)| options.clone())
            .collect()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn driver_id(&self) -> &'static str {
        "mock"
    }

    fn driver_name(&self) -> &'static str {
        "Mock"
    }

    fn schemes(&self) -> &'static [&'static str] {
        self.schemes
    }

    async fn open(
        &self,
        uri: &str,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn DriverHandle>, BoxError> {
        {
            let mut state = lock(&self.state);
            state.opened.push((uri.to_string(), options.clone()));
            if let Some(message) = state.fail_open.clone() {
                return Err(message.into());
            }
        }
        lock(&self.events).push("open".into());
        Ok(Box::new(MockHandle {
            driver: self.clone(),
        }))
    }
}

struct MockHandle {
    driver: MockDriver,
}

impl MockHandle {
    fn transaction_call(&self, keyword: &str) -> Result<(), BoxError> {
        if let Some(message) = lock(&self.driver.state).failure_for(keyword) {
            return Err(message.into());
        }
        lock(&self.driver.events).push(keyword.to_ascii_lowercase());
        Ok(())
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<RawResult, BoxError> {
        let mut state = lock(&self.driver.state);
        state.statements.push((sql.to_string(), params.to_vec()));
        if let Some(message) = state.failure_for(sql) {
            return Err(message.into());
        }

        let upper = sql.to_ascii_uppercase();
        if let Some((_, result)) = state
            .responses
            .iter()
            .find(|(pattern, _)| upper.contains(pattern.as_str()))
        {
            return Ok(result.clone());
        }

        if returns_rows(sql) {
            Ok(RawResult::default())
        } else {
            Ok(RawResult::with_affected_rows(1, 0.0))
        }
    }
}

#[async_trait]
impl DriverHandle for MockHandle {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RawResult, BoxError> {
        self.run(sql, params)
    }

    async fn begin(&mut self) -> Result<(), BoxError> {
        self.transaction_call("BEGIN")
    }

    async fn commit(&mut self) -> Result<(), BoxError> {
        self.transaction_call("COMMIT")
    }

    async fn rollback(&mut self) -> Result<(), BoxError> {
        self.transaction_call("ROLLBACK")
    }

    async fn close(self: Box<Self>) -> Result<(), BoxError> {
        lock(&self.driver.events).push("close".into());
        let failure = lock(&self.driver.state).fail_close.clone();
        match failure {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }
}

/// Registry holding only `driver`.
pub fn registry_with(driver: MockDriver) -> Arc<DriverRegistry> {
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(driver));
    Arc::new(registry)
}

/// Raw result with the given column names and rows.
pub fn raw_rows(columns: &[&str], rows: Vec<Vec<Value>>) -> RawResult {
    RawResult {
        columns: columns
            .iter()
            .map(|name| ColumnInfo {
                name: name.to_string(),
                data_type: "TEXT".into(),
            })
            .collect(),
        rows,
        affected_rows: None,
        execution_time_ms: 0.0,
    }
}

enum TunnelFailure {
    Unavailable,
    Failed(String),
}

/// One recorded `start` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelStart {
    pub ssh_host: String,
    pub ssh_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

/// Tunnel provider that records calls and hands out in-memory tunnels.
#[derive(Clone)]
pub struct RecordingTunnelProvider {
    local_port: u16,
    starts: Arc<Mutex<Vec<TunnelStart>>>,
    failure: Arc<Mutex<Option<TunnelFailure>>>,
    active: Arc<AtomicBool>,
    events: EventLog,
}

impl RecordingTunnelProvider {
    pub const LOCAL_PORT: u16 = 40_123;

    pub fn new() -> Self {
        Self {
            local_port: Self::LOCAL_PORT,
            starts: Arc::default(),
            failure: Arc::default(),
            active: Arc::new(AtomicBool::new(false)),
            events: Arc::default(),
        }
    }

    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn unavailable(self) -> Self {
        *lock(&self.failure) = Some(TunnelFailure::Unavailable);
        self
    }

    pub fn failing(self, message: &str) -> Self {
        *lock(&self.failure) = Some(TunnelFailure::Failed(message.to_string()));
        self
    }

    pub fn starts(&self) -> Vec<TunnelStart> {
        lock(&self.starts).clone()
    }

    /// Simulates the forward dying underneath the connection.
    pub fn drop_tunnel(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn tunnel_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for RecordingTunnelProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TunnelProvider for RecordingTunnelProvider {
    async fn start(
        &self,
        config: &TunnelConfig,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn Tunnel>, TunnelError> {
        lock(&self.starts).push(TunnelStart {
            ssh_host: config.ssh_host.clone(),
            ssh_port: config.ssh_port,
            remote_host: remote_host.to_string(),
            remote_port,
        });

        let failure = match &*lock(&self.failure) {
            Some(TunnelFailure::Unavailable) => {
                Some(TunnelError::Unavailable("ssh not installed".into()))
            }
            Some(TunnelFailure::Failed(message)) => Some(TunnelError::Failed {
                message: message.clone(),
                source: None,
            }),
            None => None,
        };
        if let Some(err) = failure {
            return Err(err);
        }

        self.active.store(true, Ordering::SeqCst);
        lock(&self.events).push("tunnel_start".into());
        Ok(Box::new(RecordedTunnel {
            local_port: config.local_port.unwrap_or(self.local_port),
            active: Arc::clone(&self.active),
            events: Arc::clone(&self.events),
        }))
    }
}

struct RecordedTunnel {
    local_port: u16,
    active: Arc<AtomicBool>,
    events: EventLog,
}

#[async_trait]
impl Tunnel for RecordedTunnel {
    fn local_bound_port(&self) -> u16 {
        self.local_port
    }

    fn is_active(&mut self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<(), TunnelError> {
        if self.active.swap(false, Ordering::SeqCst) {
            lock(&self.events).push("tunnel_close".into());
        }
        Ok(())
    }
}
