//! Explicit lifecycle hook registration and dispatch.
//!
//! # Responsibility
//! - Let the entity persistence layer notify subscribers about entity
//!   creation and deletion.
//! - Keep subscriptions explicit: each has a dispatch id and a typed trigger.
//!
//! # Invariants
//! - Dispatch ids are unique within one registry.
//! - Hooks run in registration order; the first failure stops dispatch and
//!   is returned to the caller.
//! - Hooks run on the caller's connection, inside the caller's transaction.

pub mod reference_hooks;

use crate::model::entity::EntityKind;
use crate::model::event::LifecycleEvent;
use crate::repo::RepoError;
use crate::service::reference_service::AllocError;
use log::{debug, error};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type HookResult<T> = Result<T, HookError>;

/// Failure raised by a hook while handling one event.
#[derive(Debug)]
pub enum HookError {
    Alloc(AllocError),
    Repo(RepoError),
    /// Hook received an event its subscription should have filtered out.
    UnexpectedEvent(LifecycleEvent),
}

impl Display for HookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alloc(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::UnexpectedEvent(event) => write!(
                f,
                "hook received unexpected `{}` event for {}",
                event.name(),
                event.entity()
            ),
        }
    }
}

impl Error for HookError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Alloc(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::UnexpectedEvent(_) => None,
        }
    }
}

impl From<AllocError> for HookError {
    fn from(value: AllocError) -> Self {
        Self::Alloc(value)
    }
}

impl From<RepoError> for HookError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookRegistryError {
    InvalidDispatchId(String),
    DuplicateDispatchId(String),
}

impl Display for HookRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDispatchId(value) => write!(f, "dispatch id is invalid: `{value}`"),
            Self::DuplicateDispatchId(value) => {
                write!(f, "dispatch id already registered: {value}")
            }
        }
    }
}

impl Error for HookRegistryError {}

/// Callback invoked for matching lifecycle events.
pub trait LifecycleHook: Send + Sync {
    fn handle(&self, conn: &Connection, event: &LifecycleEvent) -> HookResult<()>;
}

/// Which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookTrigger {
    /// Entity of this kind persisted for the first time.
    PostCreate(EntityKind),
    /// Entity of this kind removed.
    PostDelete(EntityKind),
}

impl HookTrigger {
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        match (self, event) {
            (Self::PostCreate(kind), LifecycleEvent::Created { entity, .. })
            | (Self::PostDelete(kind), LifecycleEvent::Deleted { entity, .. }) => {
                *kind == entity.kind
            }
            _ => false,
        }
    }
}

struct Subscription {
    dispatch_id: String,
    trigger: HookTrigger,
    hook: Arc<dyn LifecycleHook>,
}

/// Ordered set of hook subscriptions.
#[derive(Default)]
pub struct HookRegistry {
    subscriptions: Vec<Subscription>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one subscription after all existing ones.
    pub fn register(
        &mut self,
        dispatch_id: &str,
        trigger: HookTrigger,
        hook: Arc<dyn LifecycleHook>,
    ) -> Result<(), HookRegistryError> {
        let dispatch_id = dispatch_id.trim();
        if dispatch_id.is_empty() {
            return Err(HookRegistryError::InvalidDispatchId(dispatch_id.to_string()));
        }
        if self.contains(dispatch_id) {
            return Err(HookRegistryError::DuplicateDispatchId(
                dispatch_id.to_string(),
            ));
        }

        self.subscriptions.push(Subscription {
            dispatch_id: dispatch_id.to_string(),
            trigger,
            hook,
        });
        Ok(())
    }

    /// Removes one subscription. Returns whether it was registered.
    pub fn unregister(&mut self, dispatch_id: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|subscription| subscription.dispatch_id != dispatch_id.trim());
        self.subscriptions.len() != before
    }

    pub fn contains(&self, dispatch_id: &str) -> bool {
        self.subscriptions
            .iter()
            .any(|subscription| subscription.dispatch_id == dispatch_id)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Dispatch ids in registration order.
    pub fn dispatch_ids(&self) -> Vec<&str> {
        self.subscriptions
            .iter()
            .map(|subscription| subscription.dispatch_id.as_str())
            .collect()
    }

    /// Runs every matching hook and returns how many ran.
    pub fn dispatch(&self, conn: &Connection, event: &LifecycleEvent) -> HookResult<usize> {
        let mut invoked = 0;
        for subscription in &self.subscriptions {
            if !subscription.trigger.matches(event) {
                continue;
            }

            if let Err(err) = subscription.hook.handle(conn, event) {
                error!(
                    "event=hook_dispatch module=hooks status=error dispatch_id={} lifecycle={} entity={} project_id={} error={}",
                    subscription.dispatch_id,
                    event.name(),
                    event.entity(),
                    event.project_id(),
                    err
                );
                return Err(err);
            }
            invoked += 1;
        }

        debug!(
            "event=hook_dispatch module=hooks status=ok lifecycle={} entity={} invoked={}",
            event.name(),
            event.entity(),
            invoked
        );
        Ok(invoked)
    }
}
