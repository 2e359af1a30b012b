//! scriptrig: a regression harness for scripting-mode scripts.
//!
//! The pipeline for one script is directive parsing ([`directives`]),
//! optional scripting-mode rewriting ([`preprocess`]), parsing ([`syntax`])
//! and evaluation ([`runtime`], wrapped by [`engine`]). The [`harness`] runs
//! scripts in fresh engines and judges the results.

pub mod cli;
pub mod directives;
pub mod engine;
pub mod errors;
pub mod harness;
pub mod preprocess;
pub mod runtime;
pub mod syntax;

pub use engine::{ScriptEngine, Termination};
pub use errors::{ErrorType, RigError, SourceContext};
pub use syntax::Span;
