//! Selector resolution: strategy ladders with automatic escalation.

pub mod resolver;
pub mod strategies;

pub use resolver::{ResolvedTarget, SelectorResolver};
pub use strategies::{ladder_for, loosen_css, Rung};
