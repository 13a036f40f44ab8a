//! Typed action DSL: selectors, actions, wire normalization, validation.

pub mod action;
pub mod normalize;
pub mod selector;
pub mod validate;

pub use action::{Action, ActionKind, ActionOptions, MouseButton, UntilCondition};
pub use normalize::{normalize_plan, NormalizedPlan};
pub use selector::{Selector, Strategy};
pub use validate::{check_navigate_url, validate_plan, ValidatedPlan};
