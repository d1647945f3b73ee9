//! Guard evaluation: anonymous resources, the evaluator and conditionals.

pub mod anonymous;
pub mod conditional;
pub mod evaluator;

pub use conditional::{CommandOptions, Conditional, GuardKind, GuardSource, first_blocking};
pub use evaluator::GuardEvaluator;
