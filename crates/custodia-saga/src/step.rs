use custodia_core::error::CustodiaError;
use custodia_core::value::Value;
use std::collections::BTreeMap;

/// Shared mutable context threaded through every step of a single run.
/// Plain data, not shared across runs — "sagas do not share mutable
/// state; each run carries its own context".
#[derive(Debug, Clone, Default)]
pub struct SagaContext {
    pub data: BTreeMap<String, Value>,
    pub errors: Vec<String>,
}

impl SagaContext {
    pub fn new(input: Value) -> Self {
        let data = match input {
            Value::Map(m) => m,
            other => {
                let mut m = BTreeMap::new();
                m.insert("input".to_string(), other);
                m
            }
        };
        Self { data, errors: Vec::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn into_value(self) -> Value {
        Value::Map(self.data)
    }
}

type StepFn = dyn Fn(&mut SagaContext) -> Result<(), CustodiaError> + Send + Sync;
type CompensateFn = dyn Fn(&mut SagaContext) -> Result<(), CustodiaError> + Send + Sync;

/// One named unit of work in a `Saga`. `critical` steps trigger a full
/// reverse-order compensation run on failure; non-critical steps record
/// their error into the context and let the saga continue.
pub struct Step {
    pub name: String,
    pub execute: Box<StepFn>,
    pub compensate: Option<Box<CompensateFn>>,
    pub critical: bool,
}

impl Step {
    pub fn new(
        name: impl Into<String>,
        execute: impl Fn(&mut SagaContext) -> Result<(), CustodiaError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            execute: Box::new(execute),
            compensate: None,
            critical: true,
        }
    }

    pub fn with_compensate(
        mut self,
        compensate: impl Fn(&mut SagaContext) -> Result<(), CustodiaError> + Send + Sync + 'static,
    ) -> Self {
        self.compensate = Some(Box::new(compensate));
        self
    }

    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }
}

pub struct Saga {
    pub steps: Vec<Step>,
}

impl Saga {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}
