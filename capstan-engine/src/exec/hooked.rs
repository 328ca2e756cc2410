//! Hooked step composition
//!
//! Runs a primary step, conditionally dispatches the on-success/on-failure
//! hooks, always runs ensure, and runs the tail only when the primary and
//! every scheduled hook reported success. Hooks run concurrently as spawned
//! tasks joined over a result channel; the composer owns the whole tree and
//! is its sole releaser.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use super::step::{
    AggregateError, BoxedStep, NoopStep, Ready, Signals, SourceRepository, Step, StepFactory,
    Success,
};

/// Factory combining the five hooked roles
pub struct HookedCompose {
    step: Arc<dyn StepFactory>,
    next: Arc<dyn StepFactory>,
    failure: Arc<dyn StepFactory>,
    success: Arc<dyn StepFactory>,
    ensure: Arc<dyn StepFactory>,
}

impl HookedCompose {
    pub fn new(
        step: Arc<dyn StepFactory>,
        next: Arc<dyn StepFactory>,
        failure: Arc<dyn StepFactory>,
        success: Arc<dyn StepFactory>,
        ensure: Arc<dyn StepFactory>,
    ) -> Self {
        Self {
            step,
            next,
            failure,
            success,
            ensure,
        }
    }
}

impl StepFactory for HookedCompose {
    fn using(&self, prev: Option<&dyn Step>, repo: &Arc<SourceRepository>) -> BoxedStep {
        Box::new(HookedComposeStep {
            next: Arc::clone(&self.next),
            failure: Arc::clone(&self.failure),
            success: Arc::clone(&self.success),
            ensure: Arc::clone(&self.ensure),
            repo: Arc::clone(repo),
            first_step: Some(self.step.using(prev, repo)),
            failure_step: None,
            success_step: None,
            ensure_step: None,
            next_step: None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Ensure,
    OnSuccess,
    OnFailure,
}

/// One bound instance of the hooked composition
pub struct HookedComposeStep {
    next: Arc<dyn StepFactory>,
    failure: Arc<dyn StepFactory>,
    success: Arc<dyn StepFactory>,
    ensure: Arc<dyn StepFactory>,
    repo: Arc<SourceRepository>,

    first_step: Option<BoxedStep>,
    failure_step: Option<BoxedStep>,
    success_step: Option<BoxedStep>,
    ensure_step: Option<BoxedStep>,
    next_step: Option<BoxedStep>,
}

#[async_trait]
impl Step for HookedComposeStep {
    async fn run(&mut self, signals: Signals, ready: Ready) -> anyhow::Result<()> {
        let mut first = match self.first_step.take() {
            Some(step) => step,
            None => anyhow::bail!("hooked compose step ran twice"),
        };

        let first_error = run_under_signals(first.as_mut(), &signals).await.err();
        let primary_errored = first_error.is_some();

        let mut success = Success(false);
        let answers_success = first.result(&mut success);
        let succeeded = success.0;

        // Ensure runs on every run that reached the primary's completion,
        // whether or not the primary can answer success at all.
        let mut hooks: Vec<(Hook, BoxedStep)> = vec![(
            Hook::Ensure,
            self.ensure.using(Some(first.as_ref()), &self.repo),
        )];

        if answers_success && !primary_errored {
            if succeeded {
                hooks.push((
                    Hook::OnSuccess,
                    self.success.using(Some(first.as_ref()), &self.repo),
                ));
            } else {
                hooks.push((
                    Hook::OnFailure,
                    self.failure.using(Some(first.as_ref()), &self.repo),
                ));
            }
        }

        self.first_step = Some(first);

        // One task per hook; each task hands its step back for release.
        let (results_tx, mut results_rx) = mpsc::channel(hooks.len());
        for (hook, mut step) in hooks {
            let results_tx = results_tx.clone();
            let signals = signals.clone();
            tokio::spawn(async move {
                let result = run_under_signals(step.as_mut(), &signals).await;
                let _ = results_tx.send((hook, step, result)).await;
            });
        }
        drop(results_tx);

        let mut errors = AggregateError::new();
        let mut all_hooks_successful = true;

        while let Some((hook, step, result)) = results_rx.recv().await {
            if let Err(err) = result {
                errors.push(err);
            }

            if success_result(step.as_ref()) != Some(true) {
                all_hooks_successful = false;
            }

            match hook {
                Hook::Ensure => self.ensure_step = Some(step),
                Hook::OnSuccess => self.success_step = Some(step),
                Hook::OnFailure => self.failure_step = Some(step),
            }
        }

        if let Some(err) = first_error {
            errors.push(err);
        }

        if !errors.is_empty() {
            // next is never instantiated on an errored run
            return errors.into_result();
        }

        let mut next: BoxedStep = if answers_success && succeeded && all_hooks_successful {
            self.next.using(self.first_step.as_deref(), &self.repo)
        } else {
            Box::new(NoopStep)
        };

        let result = next.run(signals, ready).await;
        self.next_step = Some(next);
        result
    }

    /// Delegates to the tail, so the composer presents its typed output
    fn result(&self, out: &mut dyn Any) -> bool {
        match &self.next_step {
            Some(next) => next.result(out),
            None => false,
        }
    }

    fn release(&mut self) -> anyhow::Result<()> {
        let mut failures = Vec::new();

        for (label, slot) in [
            ("first step", &mut self.first_step),
            ("ensure step", &mut self.ensure_step),
            ("failure step", &mut self.failure_step),
            ("success step", &mut self.success_step),
            ("next step", &mut self.next_step),
        ] {
            if let Some(step) = slot {
                if let Err(err) = step.release() {
                    failures.push(format!("{}: {}", label, err));
                }
            }
        }

        if !failures.is_empty() {
            anyhow::bail!("steps failed to release:\n{}", failures.join("\n"));
        }

        Ok(())
    }
}

/// Runs a step while watching the signal hub
///
/// The step holds its own subscription; a step that exits cleanly after
/// being signaled reports exactly its own outcome.
async fn run_under_signals(step: &mut dyn Step, signals: &Signals) -> anyhow::Result<()> {
    let mut rx = signals.subscribe();
    let mut run = step.run(signals.clone(), Ready::detached());

    loop {
        tokio::select! {
            result = &mut run => return result,
            received = rx.recv() => match received {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return run.await,
            },
        }
    }
}

fn success_result(step: &dyn Step) -> Option<bool> {
    let mut success = Success(false);
    if step.result(&mut success) {
        Some(success.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Signal;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct FakeFactory {
        error: Option<String>,
        success: Option<bool>,
        finish_on_signal: bool,
        release_error: Option<String>,
        instantiated: Arc<AtomicUsize>,
        ran: Arc<AtomicBool>,
        released: Arc<AtomicBool>,
    }

    impl FakeFactory {
        fn succeeding() -> Self {
            Self {
                success: Some(true),
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                success: Some(false),
                ..Default::default()
            }
        }

        fn erroring(message: &str) -> Self {
            Self {
                error: Some(message.to_string()),
                ..Default::default()
            }
        }

        fn opaque() -> Self {
            Self::default()
        }

        fn with_release_error(mut self, message: &str) -> Self {
            self.release_error = Some(message.to_string());
            self
        }

        fn finishing_on_signal(mut self) -> Self {
            self.finish_on_signal = true;
            self
        }

        fn instantiations(&self) -> usize {
            self.instantiated.load(Ordering::SeqCst)
        }

        fn ran(&self) -> bool {
            self.ran.load(Ordering::SeqCst)
        }

        fn released(&self) -> bool {
            self.released.load(Ordering::SeqCst)
        }
    }

    impl StepFactory for FakeFactory {
        fn using(&self, _prev: Option<&dyn Step>, _repo: &Arc<SourceRepository>) -> BoxedStep {
            self.instantiated.fetch_add(1, Ordering::SeqCst);
            Box::new(FakeStep {
                error: self.error.clone(),
                success: self.success,
                finish_on_signal: self.finish_on_signal,
                release_error: self.release_error.clone(),
                ran: Arc::clone(&self.ran),
                released: Arc::clone(&self.released),
            })
        }
    }

    struct FakeStep {
        error: Option<String>,
        success: Option<bool>,
        finish_on_signal: bool,
        release_error: Option<String>,
        ran: Arc<AtomicBool>,
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Step for FakeStep {
        async fn run(&mut self, signals: Signals, mut ready: Ready) -> anyhow::Result<()> {
            ready.notify();
            self.ran.store(true, Ordering::SeqCst);

            if self.finish_on_signal {
                let mut rx = signals.subscribe();
                let _ = rx.recv().await;
            }

            match &self.error {
                Some(message) => Err(anyhow::anyhow!(message.clone())),
                None => Ok(()),
            }
        }

        fn result(&self, out: &mut dyn Any) -> bool {
            let Some(success) = self.success else {
                return false;
            };
            match out.downcast_mut::<Success>() {
                Some(slot) => {
                    *slot = Success(success);
                    true
                }
                None => false,
            }
        }

        fn release(&mut self) -> anyhow::Result<()> {
            self.released.store(true, Ordering::SeqCst);
            match &self.release_error {
                Some(message) => Err(anyhow::anyhow!(message.clone())),
                None => Ok(()),
            }
        }
    }

    struct Harness {
        primary: FakeFactory,
        next: FakeFactory,
        failure: FakeFactory,
        success: FakeFactory,
        ensure: FakeFactory,
    }

    impl Harness {
        fn new(primary: FakeFactory) -> Self {
            Self {
                primary,
                next: FakeFactory::succeeding(),
                failure: FakeFactory::succeeding(),
                success: FakeFactory::succeeding(),
                ensure: FakeFactory::succeeding(),
            }
        }

        fn bind(&self) -> BoxedStep {
            let compose = HookedCompose::new(
                Arc::new(self.primary.clone()),
                Arc::new(self.next.clone()),
                Arc::new(self.failure.clone()),
                Arc::new(self.success.clone()),
                Arc::new(self.ensure.clone()),
            );
            compose.using(None, &SourceRepository::new())
        }
    }

    #[tokio::test]
    async fn test_success_schedules_success_hook_and_next() {
        let harness = Harness::new(FakeFactory::succeeding());
        let mut step = harness.bind();

        let result = step.run(Signals::new(), Ready::detached()).await;

        assert!(result.is_ok());
        assert_eq!(harness.ensure.instantiations(), 1);
        assert_eq!(harness.success.instantiations(), 1);
        assert_eq!(harness.failure.instantiations(), 0);
        assert_eq!(harness.next.instantiations(), 1);
        assert!(harness.next.ran());

        // the tail's typed output shows through the composer
        assert_eq!(success_result(step.as_ref()), Some(true));
    }

    #[tokio::test]
    async fn test_failure_schedules_failure_hook_and_skips_next() {
        let harness = Harness::new(FakeFactory::failing());
        let mut step = harness.bind();

        let result = step.run(Signals::new(), Ready::detached()).await;

        assert!(result.is_ok());
        assert_eq!(harness.ensure.instantiations(), 1);
        assert_eq!(harness.failure.instantiations(), 1);
        assert_eq!(harness.success.instantiations(), 0);
        assert_eq!(harness.next.instantiations(), 0);

        // the noop tail exposes nothing
        assert_eq!(success_result(step.as_ref()), None);
    }

    #[tokio::test]
    async fn test_primary_error_skips_conditional_hooks() {
        let mut primary = FakeFactory::erroring("primary exploded");
        primary.success = Some(true);
        let harness = Harness::new(primary);
        let mut step = harness.bind();

        let err = step
            .run(Signals::new(), Ready::detached())
            .await
            .expect_err("primary error must surface");

        let aggregate = err
            .downcast_ref::<AggregateError>()
            .expect("composer aggregates errors");
        assert_eq!(aggregate.errors().len(), 1);

        assert_eq!(harness.ensure.instantiations(), 1);
        assert_eq!(harness.success.instantiations(), 0);
        assert_eq!(harness.failure.instantiations(), 0);
        assert_eq!(harness.next.instantiations(), 0);
    }

    #[tokio::test]
    async fn test_primary_and_ensure_errors_aggregate() {
        let mut primary = FakeFactory::erroring("primary exploded");
        primary.success = Some(true);
        let mut harness = Harness::new(primary);
        harness.ensure = FakeFactory::erroring("ensure exploded");
        let mut step = harness.bind();

        let err = step
            .run(Signals::new(), Ready::detached())
            .await
            .expect_err("both errors must surface");

        let aggregate = err
            .downcast_ref::<AggregateError>()
            .expect("composer aggregates errors");
        assert_eq!(aggregate.errors().len(), 2);

        let rendered = err.to_string();
        assert!(rendered.contains("primary exploded"));
        assert!(rendered.contains("ensure exploded"));
        assert_eq!(harness.next.instantiations(), 0);
    }

    #[tokio::test]
    async fn test_opaque_primary_still_runs_ensure() {
        let harness = Harness::new(FakeFactory::opaque());
        let mut step = harness.bind();

        let result = step.run(Signals::new(), Ready::detached()).await;

        assert!(result.is_ok());
        assert_eq!(harness.ensure.instantiations(), 1);
        assert!(harness.ensure.ran());
        assert_eq!(harness.success.instantiations(), 0);
        assert_eq!(harness.failure.instantiations(), 0);
        assert_eq!(harness.next.instantiations(), 0);
        assert_eq!(success_result(step.as_ref()), None);
    }

    #[tokio::test]
    async fn test_failed_hook_replaces_next_with_noop() {
        let mut harness = Harness::new(FakeFactory::succeeding());
        harness.success = FakeFactory::failing();
        let mut step = harness.bind();

        let result = step.run(Signals::new(), Ready::detached()).await;

        assert!(result.is_ok());
        assert_eq!(harness.success.instantiations(), 1);
        assert_eq!(harness.next.instantiations(), 0);
    }

    #[tokio::test]
    async fn test_opaque_hook_replaces_next_with_noop() {
        let mut harness = Harness::new(FakeFactory::succeeding());
        harness.ensure = FakeFactory::opaque();
        let mut step = harness.bind();

        let result = step.run(Signals::new(), Ready::detached()).await;

        assert!(result.is_ok());
        assert_eq!(harness.next.instantiations(), 0);
    }

    #[tokio::test]
    async fn test_signal_reaches_every_live_child() {
        let mut harness = Harness::new(FakeFactory::succeeding().finishing_on_signal());
        harness.ensure = FakeFactory::succeeding().finishing_on_signal();
        harness.success = FakeFactory::succeeding().finishing_on_signal();
        let mut step = harness.bind();

        let signals = Signals::new();
        let pump = {
            let signals = signals.clone();
            tokio::spawn(async move {
                loop {
                    signals.send(Signal::Interrupt);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            step.run(signals.clone(), Ready::detached()),
        )
        .await
        .expect("composer must finish promptly once signaled");

        pump.abort();

        assert!(result.is_ok());
        assert_eq!(harness.ensure.instantiations(), 1);
        assert_eq!(harness.success.instantiations(), 1);
        assert_eq!(harness.next.instantiations(), 1);
    }

    #[tokio::test]
    async fn test_release_covers_children_and_concatenates_errors() {
        let mut harness =
            Harness::new(FakeFactory::succeeding().with_release_error("first stuck"));
        harness.ensure = FakeFactory::succeeding().with_release_error("ensure stuck");
        let mut step = harness.bind();

        step.run(Signals::new(), Ready::detached())
            .await
            .expect("run succeeds");

        let err = step.release().expect_err("release errors must surface");
        let rendered = err.to_string();
        assert!(rendered.contains("first step: first stuck"));
        assert!(rendered.contains("ensure step: ensure stuck"));

        assert!(harness.primary.released());
        assert!(harness.ensure.released());
        assert!(harness.next.released());
    }

    #[tokio::test]
    async fn test_ready_passed_through_to_tail() {
        let harness = Harness::new(FakeFactory::succeeding());
        let mut step = harness.bind();

        let (ready, ready_rx) = Ready::channel();
        let result = step.run(Signals::new(), ready).await;

        assert!(result.is_ok());
        assert!(ready_rx.await.is_ok());
    }
}
