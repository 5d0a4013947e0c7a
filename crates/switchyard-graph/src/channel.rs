//! The run's named state fields and their merge rules.
//!
//! Every channel is seeded with its default when a run starts; from then on a
//! channel's value is only ever produced by its own reducer.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::UnknownChannel;
use crate::state::{State, StateUpdate};

/// Pure, total merge function for a channel: `(old, update) -> new`.
pub type ReduceFn = dyn Fn(&Value, Value) -> Value + Send + Sync;

/// How a channel folds an incoming update into its current value.
#[derive(Clone)]
pub enum Reducer {
    /// `new ?? old`: the update wins unless it is null.
    Replace,
    /// `old.concat(new)`: arrays are spliced in order, scalars pushed as one item.
    Append,
    /// Caller-supplied merge function. Must be pure and must not panic.
    Custom(Arc<ReduceFn>),
}

impl Reducer {
    pub fn custom(f: impl Fn(&Value, Value) -> Value + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Merge `update` into `old`.
    pub fn reduce(&self, old: &Value, update: Value) -> Value {
        match self {
            Self::Replace => {
                if update.is_null() {
                    old.clone()
                } else {
                    update
                }
            }
            Self::Append => append(old, update),
            Self::Custom(f) => f(old, update),
        }
    }
}

fn append(old: &Value, update: Value) -> Value {
    let mut items = match old {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };
    match update {
        Value::Null => {}
        Value::Array(more) => items.extend(more),
        one => items.push(one),
    }
    Value::Array(items)
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace => f.write_str("Replace"),
            Self::Append => f.write_str("Append"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Declaration of one channel: name, reducer, default.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub reducer: Reducer,
    pub default: Value,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, reducer: Reducer, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            reducer,
            default: default.into(),
        }
    }

    /// A replace-with-override channel.
    pub fn replace(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self::new(name, Reducer::Replace, default)
    }

    /// An append-only log channel, starting empty.
    pub fn append(name: impl Into<String>) -> Self {
        Self::new(name, Reducer::Append, Value::Array(Vec::new()))
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    reducer: Reducer,
}

/// Current values of every declared channel of one run.
///
/// Owned exclusively by the run's executor; nodes only ever see
/// [`snapshot`](ChannelStore::snapshot)s.
#[derive(Debug, Clone)]
pub struct ChannelStore {
    slots: BTreeMap<String, Slot>,
}

impl ChannelStore {
    /// Seed every channel with its default.
    pub fn with_defaults(specs: &[ChannelSpec]) -> Self {
        let slots = specs
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    Slot {
                        value: spec.default.clone(),
                        reducer: spec.reducer.clone(),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    /// Seed defaults, then fold caller-supplied initial values through each
    /// channel's reducer. An initial value for an undeclared channel is rejected.
    pub fn initialize(
        specs: &[ChannelSpec],
        overrides: StateUpdate,
    ) -> Result<Self, UnknownChannel> {
        let mut store = Self::with_defaults(specs);
        store.merge(overrides)?;
        Ok(store)
    }

    /// Apply `update` field by field. Fields absent from the update are left
    /// untouched. The whole update is checked before anything is applied.
    pub fn merge(&mut self, update: StateUpdate) -> Result<(), UnknownChannel> {
        if let Some(unknown) = update.keys().find(|k| !self.slots.contains_key(*k)) {
            return Err(UnknownChannel(unknown.clone()));
        }
        for (name, value) in update {
            if let Some(slot) = self.slots.get_mut(&name) {
                slot.value = slot.reducer.reduce(&slot.value, value);
            }
        }
        Ok(())
    }

    /// Immutable copy of all current values.
    pub fn snapshot(&self) -> State {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(|slot| &slot.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }
}
