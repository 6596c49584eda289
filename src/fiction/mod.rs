//! The fiction graph: entities, spatial model, snapshot codec and behavior reattachment.

pub mod behavior;
pub mod entities;
pub mod errors;
pub mod game;
pub mod identity;
pub mod reattach;
pub mod snapshot;
pub mod spatial;
pub mod types;

pub use behavior::{
    Behavior, BehaviorSet, Examination, ExaminationRequest, InteractionEffect, InteractionResult,
    Reaction,
};
pub use entities::{
    Conversation, CustomCommand, Exit, Item, NonPlayableCharacter, PlayableCharacter,
};
pub use errors::{FictionError, IoOperation};
pub use game::{EndReason, Game, MoveOutcome, TakeOutcome};
pub use identity::{ConstructionContext, EntityKind, Identified};
pub use reattach::{collect_entities, reattach, reattach_naive, BehaviorCatalog, ReattachReport};
pub use snapshot::{Persist, SnapshotNode};
pub use spatial::{Overworld, Region, Room};
pub use types::{Description, Direction, Examinable, GridPosition};

pub type Result<T> = std::result::Result<T, FictionError>;
