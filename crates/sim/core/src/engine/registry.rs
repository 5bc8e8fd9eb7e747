//! Extension points for rule packs: systems, reducers and validators.
//!
//! Systems are held in a priority-ordered list and reducers in a map keyed by
//! event type. Both registries reject duplicate keys instead of silently
//! replacing a handler, so the applied rule set is exactly what was declared.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::context::SystemContext;
use super::errors::{KernelError, ReducerError, SystemError};
use crate::event::{PlayerCommand, ProposedEvent, SimEvent};
use crate::state::WorldState;

/// Proposal-phase logic.
///
/// A system reads the pre-tick state through its [`SystemContext`] and
/// proposes candidate events. It never mutates state.
///
/// Systems run in ascending priority order; ties keep registration order.
pub trait System: Send + Sync {
    /// Stable identifier, recorded as the cause of every event it proposes.
    fn id(&self) -> &str;

    /// Returns the priority of this system. Lower values run first.
    /// Default priority is 0.
    fn priority(&self) -> i32 {
        0
    }

    fn run(&self, ctx: &mut SystemContext<'_>) -> Result<(), SystemError>;
}

/// [`System`] backed by a closure. Built by [`system_fn`].
pub struct FnSystem<F> {
    id: String,
    priority: i32,
    run: F,
}

impl<F> System for FnSystem<F>
where
    F: Fn(&mut SystemContext<'_>) -> Result<(), SystemError> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn run(&self, ctx: &mut SystemContext<'_>) -> Result<(), SystemError> {
        (self.run)(ctx)
    }
}

/// Wraps a closure as a system.
pub fn system_fn<F>(id: impl Into<String>, priority: i32, run: F) -> FnSystem<F>
where
    F: Fn(&mut SystemContext<'_>) -> Result<(), SystemError> + Send + Sync,
{
    FnSystem {
        id: id.into(),
        priority,
        run,
    }
}

/// The single function permitted to mutate state for one event type.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut WorldState, event: &SimEvent) -> Result<(), ReducerError>;
}

impl<F> Reducer for F
where
    F: Fn(&mut WorldState, &SimEvent) -> Result<(), ReducerError> + Send + Sync,
{
    fn apply(&self, state: &mut WorldState, event: &SimEvent) -> Result<(), ReducerError> {
        self(state, event)
    }
}

/// Rule-specific command legality check, run after the kernel's own checks.
///
/// Returning `Err(reason)` drops the command and records a rejection.
pub trait CommandValidator: Send + Sync {
    fn validate(&self, state: &WorldState, command: &PlayerCommand) -> Result<(), String>;
}

impl<F> CommandValidator for F
where
    F: Fn(&WorldState, &PlayerCommand) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, state: &WorldState, command: &PlayerCommand) -> Result<(), String> {
        self(state, command)
    }
}

/// Rule-specific event consistency check (payload shape per type, ...).
pub trait EventValidator: Send + Sync {
    fn validate(&self, state: &WorldState, event: &ProposedEvent) -> Result<(), String>;
}

impl<F> EventValidator for F
where
    F: Fn(&WorldState, &ProposedEvent) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, state: &WorldState, event: &ProposedEvent) -> Result<(), String> {
        self(state, event)
    }
}

/// Priority-ordered system list.
#[derive(Default, Clone)]
pub struct SystemRegistry {
    systems: Vec<Arc<dyn System>>,
    ids: BTreeSet<String>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a system, keeping the list sorted by priority.
    ///
    /// `sort_by_key` is stable, so equal priorities stay in registration
    /// order.
    pub fn register(&mut self, system: Arc<dyn System>) -> Result<(), KernelError> {
        if !self.ids.insert(system.id().to_string()) {
            return Err(KernelError::DuplicateSystem(system.id().to_string()));
        }
        self.systems.push(system);
        self.systems.sort_by_key(|s| s.priority());
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn System>> {
        self.systems.iter()
    }

    /// System ids and priorities in execution order.
    pub fn order(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.systems.iter().map(|s| (s.id(), s.priority()))
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

/// One reducer per event type.
#[derive(Default, Clone)]
pub struct ReducerRegistry {
    reducers: BTreeMap<String, Arc<dyn Reducer>>,
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the reducer for `event_type`. A second registration for the
    /// same type is an error.
    pub fn register(
        &mut self,
        event_type: impl Into<String>,
        reducer: Arc<dyn Reducer>,
    ) -> Result<(), KernelError> {
        let event_type = event_type.into();
        if self.reducers.contains_key(&event_type) {
            return Err(KernelError::DuplicateReducer(event_type));
        }
        self.reducers.insert(event_type, reducer);
        Ok(())
    }

    pub fn get(&self, event_type: &str) -> Option<&Arc<dyn Reducer>> {
        self.reducers.get(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.reducers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(id: &str, priority: i32) -> Arc<dyn System> {
        Arc::new(system_fn(id, priority, |_ctx: &mut SystemContext<'_>| Ok(())))
    }

    #[test]
    fn systems_sort_by_priority_then_registration() {
        let mut registry = SystemRegistry::new();
        registry.register(noop("late", 10)).unwrap();
        registry.register(noop("first.b", 0)).unwrap();
        registry.register(noop("early", -5)).unwrap();
        registry.register(noop("first.a", 0)).unwrap();

        let order: Vec<&str> = registry.order().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["early", "first.b", "first.a", "late"]);
    }

    #[test]
    fn duplicate_system_ids_are_rejected() {
        let mut registry = SystemRegistry::new();
        registry.register(noop("core.needs", 0)).unwrap();
        let err = registry.register(noop("core.needs", 5)).unwrap_err();
        assert!(matches!(err, KernelError::DuplicateSystem(id) if id == "core.needs"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_reducers_are_rejected() {
        let reducer = |_: &mut WorldState, _: &SimEvent| -> Result<(), ReducerError> { Ok(()) };

        let mut registry = ReducerRegistry::new();
        registry.register("x", Arc::new(reducer)).unwrap();
        let err = registry.register("x", Arc::new(reducer)).unwrap_err();
        assert!(matches!(err, KernelError::DuplicateReducer(t) if t == "x"));
        assert!(registry.get("x").is_some());
        assert!(registry.get("y").is_none());
    }
}
