//! Step execution
//!
//! A small step algebra for builds that execute in-process: steps run under
//! a shared signal hub, expose typed results, and compose under the hooked
//! operator with success/failure/ensure semantics that hold up under
//! cancellation.

mod hooked;
mod step;

pub use hooked::HookedCompose;
pub use step::{
    AggregateError, ArtifactSource, BoxedStep, NoopStep, Ready, Signal, Signals,
    SourceRepository, Step, StepFactory, Success,
};
