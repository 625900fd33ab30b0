// Submodules for separation of concerns
mod condition;
pub mod eval;
mod mutation;
mod pipeline;
mod predicate;

// Public API re-exports
pub use condition::{Condition, Direction, Join, Operand, Operator, RawPredicate};
pub use mutation::{ApplyError, Transform};
pub use pipeline::{AggregateFn, AggregateSpec, Directive, Pipeline, SortKey, Stage, assemble};
pub use predicate::{Predicate, compile};
