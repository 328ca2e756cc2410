//! Step and factory traits, signal plumbing, and the shared source registry

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

/// Cooperative cancellation signal delivered to running steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

/// Shared signal hub
///
/// Every step subscribed to the hub sees every signal, so signaling a
/// composed tree reaches all in-flight children at once. Steps are
/// responsible for honoring what they receive.
#[derive(Clone)]
pub struct Signals {
    tx: broadcast::Sender<Signal>,
}

impl Signals {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Delivers a signal to every current subscriber
    pub fn send(&self, signal: Signal) {
        let _ = self.tx.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

/// Readiness hand-off a step fires once it is set up
pub struct Ready(Option<oneshot::Sender<()>>);

impl Ready {
    /// A readiness channel nobody waits on
    pub fn detached() -> Self {
        Ready(None)
    }

    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Ready(Some(tx)), rx)
    }

    /// Marks the step ready; later calls are no-ops
    pub fn notify(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Typed success result a step may expose through [`Step::result`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Success(pub bool);

/// One unit of executable work
#[async_trait]
pub trait Step: Send {
    /// Runs the step to completion, honoring signals from the hub
    async fn run(&mut self, signals: Signals, ready: Ready) -> anyhow::Result<()>;

    /// Type-tagged extraction of the step's results; false when the step
    /// does not expose the requested type
    fn result(&self, out: &mut dyn Any) -> bool {
        let _ = out;
        false
    }

    /// Releases whatever the step holds on to
    fn release(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub type BoxedStep = Box<dyn Step>;

/// Binds steps into a tree
///
/// `prev` is the finished predecessor; factories read whatever they need
/// from it at bind time, so the built step carries no borrow of the tree.
pub trait StepFactory: Send + Sync {
    fn using(&self, prev: Option<&dyn Step>, repo: &Arc<SourceRepository>) -> BoxedStep;
}

/// A step that does nothing and exposes no results
#[derive(Debug, Default)]
pub struct NoopStep;

#[async_trait]
impl Step for NoopStep {
    async fn run(&mut self, _signals: Signals, mut ready: Ready) -> anyhow::Result<()> {
        ready.notify();
        Ok(())
    }
}

/// One fetched artifact: where it came from and the version bound to it
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSource {
    pub resource: String,
    pub version: HashMap<String, serde_json::Value>,
}

/// Registry of named artifact sources shared across a step tree
#[derive(Default)]
pub struct SourceRepository {
    sources: Mutex<HashMap<String, ArtifactSource>>,
}

impl SourceRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, name: impl Into<String>, source: ArtifactSource) {
        self.sources.lock().unwrap().insert(name.into(), source);
    }

    pub fn get(&self, name: &str) -> Option<ArtifactSource> {
        self.sources.lock().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Multiple step errors folded into one value
///
/// Hook errors aggregate with the primary's instead of masking it, so a
/// failing ensure hook never hides why the build itself broke.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<anyhow::Error>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: anyhow::Error) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }

    /// Ok when nothing was collected, the aggregate otherwise
    pub fn into_result(self) -> anyhow::Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::Error::new(self))
        }
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} error(s) occurred:", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "\t* {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_repository_round_trip() {
        let repo = SourceRepository::new();

        repo.register(
            "repo",
            ArtifactSource {
                resource: "repo".to_string(),
                version: HashMap::from([(
                    "ref".to_string(),
                    serde_json::Value::String("abcdef".to_string()),
                )]),
            },
        );

        assert_eq!(repo.get("repo").map(|s| s.resource), Some("repo".to_string()));
        assert!(repo.get("missing").is_none());
        assert_eq!(repo.names(), vec!["repo".to_string()]);
    }

    #[test]
    fn test_aggregate_error_formatting() {
        let mut errors = AggregateError::new();
        errors.push(anyhow::anyhow!("first failure"));
        errors.push(anyhow::anyhow!("second failure"));

        let rendered = errors.to_string();
        assert!(rendered.contains("2 error(s) occurred"));
        assert!(rendered.contains("first failure"));
        assert!(rendered.contains("second failure"));
    }

    #[test]
    fn test_empty_aggregate_is_ok() {
        assert!(AggregateError::new().into_result().is_ok());
    }
}
