//! Behavior slots.
//!
//! A behavior slot holds a host-authored callback. Slots are never written to a
//! snapshot: a freshly decoded entity starts with every slot at [`Behavior::Default`]
//! and gets its callbacks back through reattachment from the previously live graph.

use std::fmt;
use std::sync::Arc;

use crate::fiction::entities::Item;
use crate::fiction::game::Game;

/// Outcome of examining an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Examination {
    pub description: String,
}

impl Examination {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// What an examine callback gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct ExaminationRequest<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub is_player_visible: bool,
}

/// Effect of using one item on something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionEffect {
    NoEffect,
    SelfContained,
    ItemUsedUp,
    TargetUsedUp,
    ItemMorphed,
    FatalEffect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionResult {
    pub effect: InteractionEffect,
    pub description: String,
}

impl InteractionResult {
    pub fn new(effect: InteractionEffect, description: impl Into<String>) -> Self {
        Self {
            effect,
            description: description.into(),
        }
    }

    pub fn no_effect() -> Self {
        Self::new(InteractionEffect::NoEffect, "Nothing happens.")
    }
}

/// Result of running a custom command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Inform(String),
    Error(String),
    Silent,
}

pub type ExamineFn = dyn Fn(&ExaminationRequest<'_>) -> Examination + Send + Sync;
pub type ConditionFn = dyn Fn() -> bool + Send + Sync;
pub type InteractionFn = dyn Fn(&Item) -> InteractionResult + Send + Sync;
pub type CommandFn = dyn Fn(&mut Game, &str) -> Reaction + Send + Sync;
pub type CompletionFn = dyn Fn(&Game) -> bool + Send + Sync;

/// A callback-valued field: either the neutral default or a bound closure.
pub enum Behavior<F: ?Sized> {
    Default,
    Bound(Arc<F>),
}

impl<F: ?Sized> Behavior<F> {
    pub fn bound(f: Arc<F>) -> Self {
        Behavior::Bound(f)
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Behavior::Bound(_))
    }

    pub fn get(&self) -> Option<&Arc<F>> {
        match self {
            Behavior::Default => None,
            Behavior::Bound(f) => Some(f),
        }
    }

    /// Both slots are default, or both point at the same closure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Behavior::Default, Behavior::Default) => true,
            (Behavior::Bound(a), Behavior::Bound(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<F: ?Sized> Default for Behavior<F> {
    fn default() -> Self {
        Behavior::Default
    }
}

impl<F: ?Sized> Clone for Behavior<F> {
    fn clone(&self) -> Self {
        match self {
            Behavior::Default => Behavior::Default,
            Behavior::Bound(f) => Behavior::Bound(Arc::clone(f)),
        }
    }
}

impl<F: ?Sized> fmt::Debug for Behavior<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behavior::Default => write!(f, "Behavior::Default"),
            Behavior::Bound(_) => write!(f, "Behavior::Bound(..)"),
        }
    }
}

/// Every behavior-bearing field an entity kind can carry. Kinds leave the slots they
/// do not have at `Default` when capturing and ignore them when restoring.
#[derive(Debug, Clone, Default)]
pub struct BehaviorSet {
    pub examine: Behavior<ExamineFn>,
    pub condition: Behavior<ConditionFn>,
    pub interaction: Behavior<InteractionFn>,
    pub command: Behavior<CommandFn>,
    pub completion: Behavior<CompletionFn>,
}

impl BehaviorSet {
    pub fn bound_count(&self) -> usize {
        [
            self.examine.is_bound(),
            self.condition.is_bound(),
            self.interaction.is_bound(),
            self.command.is_bound(),
            self.completion.is_bound(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.examine.ptr_eq(&other.examine)
            && self.condition.ptr_eq(&other.condition)
            && self.interaction.ptr_eq(&other.interaction)
            && self.command.ptr_eq(&other.command)
            && self.completion.ptr_eq(&other.completion)
    }
}
