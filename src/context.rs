//! Execution context consumed by the evaluator.
//!
//! The evaluator never talks to storage, sequences or the function runtime
//! directly; every outward call goes through [`Context`]. [`MemoryContext`]
//! is an in-process implementation backed by concurrent maps.

use crate::config::EvalConfig;
use crate::expression::{ExpressionError, ExpressionResult, Scope, Subquery};
use crate::pool::EvalPools;
use crate::value::Value;
use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Non-fatal diagnostics raised during evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    DivideByZero { operator: &'static str },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DivideByZero { operator } => write!(f, "Division by 0 in {}", operator),
        }
    }
}

/// Services and state an evaluation may consult
pub trait Context: Send + Sync {
    fn config(&self) -> &EvalConfig;

    fn pools(&self) -> &EvalPools;

    /// Report a warning. Contexts without a sink absorb it.
    fn warn(&self, _warning: Warning) {}

    fn named_parameter(&self, _name: &str) -> Option<Value> {
        None
    }

    /// 1-based
    fn positional_parameter(&self, _position: usize) -> Option<Value> {
        None
    }

    fn next_sequence_value(&self, name: &str) -> ExpressionResult<Value> {
        Err(ExpressionError::Unsupported(format!("NEXT VALUE FOR {}", name)))
    }

    fn prev_sequence_value(&self, name: &str) -> ExpressionResult<Value> {
        Err(ExpressionError::Unsupported(format!("PREV VALUE FOR {}", name)))
    }

    fn evaluate_subquery(&self, subquery: &Subquery, _scope: &Scope<'_>) -> ExpressionResult<Value> {
        Err(ExpressionError::Unsupported(format!("subquery {}", subquery.name)))
    }

    fn execute_function(&self, name: &str, _args: &[Value]) -> ExpressionResult<Value> {
        Err(ExpressionError::Unsupported(format!("function {}", name)))
    }

    fn infer_value(&self, _value: &Value, _options: &Value) -> ExpressionResult<Value> {
        Err(ExpressionError::Unsupported("INFER_VALUE".to_string()))
    }

    /// Statements run in readonly mode may not advance sequences
    fn readonly(&self) -> bool {
        false
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}

struct SequenceState {
    next: i64,
    increment: i64,
    current: Option<i64>,
}

type FunctionBody = Arc<dyn Fn(&[Value]) -> ExpressionResult<Value> + Send + Sync>;
type SubqueryBody = Arc<dyn Fn(&Scope<'_>) -> ExpressionResult<Value> + Send + Sync>;

/// In-memory execution context
pub struct MemoryContext {
    config: EvalConfig,
    pools: EvalPools,
    warnings: Mutex<Vec<Warning>>,
    named: BTreeMap<String, Value>,
    positional: Vec<Value>,
    sequences: DashMap<String, SequenceState>,
    functions: DashMap<String, FunctionBody>,
    subqueries: DashMap<String, SubqueryBody>,
    readonly: bool,
    cancelled: AtomicBool,
}

impl Default for MemoryContext {
    fn default() -> Self {
        Self::new(EvalConfig::default())
    }
}

impl MemoryContext {
    pub fn new(config: EvalConfig) -> Self {
        Self {
            config,
            pools: EvalPools::default(),
            warnings: Mutex::new(Vec::new()),
            named: BTreeMap::new(),
            positional: Vec::new(),
            sequences: DashMap::new(),
            functions: DashMap::new(),
            subqueries: DashMap::new(),
            readonly: false,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn with_named_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn with_positional_parameters(mut self, values: Vec<Value>) -> Self {
        self.positional = values;
        self
    }

    pub fn with_sequence(self, name: impl Into<String>, start: i64, increment: i64) -> Self {
        self.sequences.insert(
            name.into(),
            SequenceState {
                next: start,
                increment,
                current: None,
            },
        );
        self
    }

    pub fn with_function<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> ExpressionResult<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(body));
        self
    }

    pub fn with_subquery<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Scope<'_>) -> ExpressionResult<Value> + Send + Sync + 'static,
    {
        self.subqueries.insert(name.into(), Arc::new(body));
        self
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Request cooperative cancellation of running evaluations
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().clone()
    }

    pub fn take_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.lock())
    }
}

impl Context for MemoryContext {
    fn config(&self) -> &EvalConfig {
        &self.config
    }

    fn pools(&self) -> &EvalPools {
        &self.pools
    }

    fn warn(&self, warning: Warning) {
        debug!("evaluation warning: {}", warning);
        self.warnings.lock().push(warning);
    }

    fn named_parameter(&self, name: &str) -> Option<Value> {
        self.named.get(name).cloned()
    }

    fn positional_parameter(&self, position: usize) -> Option<Value> {
        position
            .checked_sub(1)
            .and_then(|i| self.positional.get(i))
            .cloned()
    }

    fn next_sequence_value(&self, name: &str) -> ExpressionResult<Value> {
        let mut state = self
            .sequences
            .get_mut(name)
            .ok_or_else(|| ExpressionError::evaluation("NEXT VALUE", format!("sequence {} not found", name)))?;
        let value = state.next;
        state.next = value.checked_add(state.increment).ok_or_else(|| {
            ExpressionError::evaluation("NEXT VALUE", format!("sequence {} overflowed", name))
        })?;
        state.current = Some(value);
        Ok(Value::Int(value))
    }

    fn prev_sequence_value(&self, name: &str) -> ExpressionResult<Value> {
        let state = self
            .sequences
            .get(name)
            .ok_or_else(|| ExpressionError::evaluation("PREV VALUE", format!("sequence {} not found", name)))?;
        state.current.map(Value::Int).ok_or_else(|| {
            ExpressionError::evaluation("PREV VALUE", format!("sequence {} has no current value", name))
        })
    }

    fn evaluate_subquery(&self, subquery: &Subquery, scope: &Scope<'_>) -> ExpressionResult<Value> {
        let body = self
            .subqueries
            .get(&subquery.name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ExpressionError::Unsupported(format!("subquery {}", subquery.name)))?;
        body(scope)
    }

    fn execute_function(&self, name: &str, args: &[Value]) -> ExpressionResult<Value> {
        let body = self
            .functions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ExpressionError::UnknownFunction(name.to_string()))?;
        body(args)
    }

    fn infer_value(&self, value: &Value, _options: &Value) -> ExpressionResult<Value> {
        Ok(infer_schema(value))
    }

    fn readonly(&self) -> bool {
        self.readonly
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Structural schema of a value: `{"type": ...}` plus properties or items.
fn infer_schema(value: &Value) -> Value {
    let mut schema = BTreeMap::new();
    schema.insert("type".to_string(), Value::string(value.value_type().name()));
    match value {
        Value::Object(fields) => {
            let properties = fields
                .iter()
                .map(|(name, field)| (name.clone(), infer_schema(field)))
                .collect::<BTreeMap<_, _>>();
            schema.insert("properties".to_string(), Value::Object(properties));
        }
        Value::Array(elements) => {
            let mut items: Vec<Value> = elements.iter().map(infer_schema).collect();
            items.sort();
            items.dedup();
            schema.insert("items".to_string(), Value::Array(items));
        }
        _ => {}
    }
    Value::Object(schema)
}
