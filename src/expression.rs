//! Expression trees over JSON documents.
//!
//! This module provides:
//! - The node model and its visitor protocol
//! - Ternary (MISSING / NULL / value) evaluation against a row
//! - Comprehensions over binding variables
//! - Constant folding
//! - Binding analyses: collection, renaming, index key alignment, array ids
//! - Covering analysis for index planning

pub mod binding;
mod collection;
pub mod cover;
pub mod error;
pub mod eval;
pub mod expr;
pub mod fold;
pub mod function;
pub mod gather;
pub mod rename;
pub mod scope;
pub mod visitor;

pub use binding::{collect_bindings, Binding, Bindings};
pub use cover::{cover_key, CoverValue, FilterCovers};
pub use error::{ExpressionError, ExpressionResult};
pub use eval::Evaluator;
pub use expr::{
    ArrayConstruct, ArrayMap, Between, Callee, Comprehension, Cover, Expression, Function, IsTest,
    Like, ObjectConstruct, ObjectMap, Parameter, SearchedCase, Sequence, SequenceOp, SimpleCase,
    Slice, Subquery, When, VARIADIC,
};
pub use fold::Folder;
pub use function::Builtin;
pub use gather::{
    assign_array_id, contains_correlated_subquery, count_keyspace_references, gather_any,
    AlignedAny,
};
pub use rename::{rename_binding_variables, rename_bindings, rename_variables, RenameOutcome};
pub use scope::{AnnotatedValue, Scope};
pub use visitor::{traverse, Traverser, Visitor};
