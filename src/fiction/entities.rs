//! Leaf and character entities: exits, items, characters and custom commands.

use std::sync::Arc;

use crate::fiction::behavior::{
    Behavior, CommandFn, InteractionFn, InteractionResult, Reaction,
};
use crate::fiction::identity::{ConstructionContext, EntityKind, Identified};
use crate::fiction::types::{ConditionalDescription, Description, Direction, EntityCore, Examinable};

/// Interaction callback lookup shared by every kind that has one.
fn run_interaction(slot: &Behavior<InteractionFn>, item: &Item) -> InteractionResult {
    match slot.get() {
        Some(callback) => callback(item),
        None => InteractionResult::no_effect(),
    }
}

/// A doorway out of a room. Its description is selected by its own lock flag.
#[derive(Debug, Clone)]
pub struct Exit {
    pub core: EntityCore,
    pub direction: Direction,
    pub is_locked: bool,
    pub interaction: Behavior<InteractionFn>,
}

impl Exit {
    pub fn new(ctx: &mut ConstructionContext, direction: Direction, is_locked: bool) -> Self {
        let description = Description::Conditional(ConditionalDescription {
            when_true: format!("The way {} is locked.", direction),
            when_false: format!("The way {} is open.", direction),
            condition: Behavior::Default,
        });
        Self {
            core: EntityCore::new(ctx, EntityKind::Exit, direction.as_str(), description),
            direction,
            is_locked,
            interaction: Behavior::Default,
        }
    }

    pub fn with_descriptions(mut self, locked: &str, unlocked: &str) -> Self {
        self.core.description = Description::Conditional(ConditionalDescription {
            when_true: locked.to_string(),
            when_false: unlocked.to_string(),
            condition: Behavior::Default,
        });
        self
    }

    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Self {
            core: EntityCore::placeholder(ctx, stable_id),
            direction: Direction::North,
            is_locked: false,
            interaction: Behavior::Default,
        }
    }

    pub fn unlock(&mut self) {
        self.is_locked = false;
    }

    pub fn lock(&mut self) {
        self.is_locked = true;
    }

    pub fn interact_with(&self, item: &Item) -> InteractionResult {
        run_interaction(&self.interaction, item)
    }

    pub fn set_interaction(&mut self, callback: Arc<InteractionFn>) {
        self.interaction = Behavior::bound(callback);
    }
}

impl Examinable for Exit {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn description_text(&self) -> String {
        match &self.core.description {
            Description::Conditional(c) => c.pick(self.is_locked).to_string(),
            Description::Fixed(text) => text.clone(),
        }
    }
}

impl Identified for Exit {
    fn kind(&self) -> EntityKind {
        EntityKind::Exit
    }

    fn session_id(&self) -> &str {
        &self.core.session_id
    }

    fn stable_id(&self) -> &str {
        &self.core.stable_id
    }

    fn matching_key(&self) -> String {
        format!("exit:{}:{}", self.core.stable_id, self.direction)
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub core: EntityCore,
    pub is_takeable: bool,
    pub interaction: Behavior<InteractionFn>,
}

impl Item {
    pub fn new(
        ctx: &mut ConstructionContext,
        name: &str,
        description: Description,
        is_takeable: bool,
    ) -> Self {
        Self {
            core: EntityCore::new(ctx, EntityKind::Item, name, description),
            is_takeable,
            interaction: Behavior::Default,
        }
    }

    pub fn with_id(mut self, stable_id: &str) -> Self {
        self.core.stable_id = stable_id.to_string();
        self
    }

    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Self {
            core: EntityCore::placeholder(ctx, stable_id),
            is_takeable: false,
            interaction: Behavior::Default,
        }
    }

    /// Use `item` on this item.
    pub fn interact_with(&self, item: &Item) -> InteractionResult {
        run_interaction(&self.interaction, item)
    }

    pub fn set_interaction(&mut self, callback: Arc<InteractionFn>) {
        self.interaction = Behavior::bound(callback);
    }
}

impl Examinable for Item {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }
}

impl Identified for Item {
    fn kind(&self) -> EntityKind {
        EntityKind::Item
    }

    fn session_id(&self) -> &str {
        &self.core.session_id
    }

    fn stable_id(&self) -> &str {
        &self.core.stable_id
    }
}

/// Authored dialogue with a persisted cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    pub lines: Vec<String>,
    pub current: usize,
}

impl Conversation {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            current: 0,
        }
    }

    /// Return the current line and advance. The last line repeats once reached.
    pub fn next_line(&mut self) -> Option<&str> {
        if self.lines.is_empty() {
            return None;
        }
        let index = self.current.min(self.lines.len() - 1);
        if self.current < self.lines.len() - 1 {
            self.current += 1;
        } else {
            self.current = self.lines.len() - 1;
        }
        self.lines.get(index).map(String::as_str)
    }

    pub fn is_finished(&self) -> bool {
        self.lines.is_empty() || self.current + 1 >= self.lines.len()
    }
}

#[derive(Debug, Clone)]
pub struct NonPlayableCharacter {
    pub core: EntityCore,
    pub is_alive: bool,
    pub items: Vec<Item>,
    pub conversation: Conversation,
    pub commands: Vec<CustomCommand>,
    pub interaction: Behavior<InteractionFn>,
}

impl NonPlayableCharacter {
    pub fn new(ctx: &mut ConstructionContext, name: &str, description: Description) -> Self {
        Self {
            core: EntityCore::new(ctx, EntityKind::Character, name, description),
            is_alive: true,
            items: Vec::new(),
            conversation: Conversation::default(),
            commands: Vec::new(),
            interaction: Behavior::Default,
        }
    }

    pub fn with_id(mut self, stable_id: &str) -> Self {
        self.core.stable_id = stable_id.to_string();
        self
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Self {
            core: EntityCore::placeholder(ctx, stable_id),
            is_alive: true,
            items: Vec::new(),
            conversation: Conversation::default(),
            commands: Vec::new(),
            interaction: Behavior::Default,
        }
    }

    pub fn talk(&mut self) -> Option<String> {
        if !self.is_alive {
            return None;
        }
        self.conversation.next_line().map(str::to_string)
    }

    pub fn interact_with(&self, item: &Item) -> InteractionResult {
        run_interaction(&self.interaction, item)
    }

    pub fn set_interaction(&mut self, callback: Arc<InteractionFn>) {
        self.interaction = Behavior::bound(callback);
    }
}

impl Examinable for NonPlayableCharacter {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }
}

impl Identified for NonPlayableCharacter {
    fn kind(&self) -> EntityKind {
        EntityKind::Character
    }

    fn session_id(&self) -> &str {
        &self.core.session_id
    }

    fn stable_id(&self) -> &str {
        &self.core.stable_id
    }
}

#[derive(Debug, Clone)]
pub struct PlayableCharacter {
    pub core: EntityCore,
    pub is_alive: bool,
    pub items: Vec<Item>,
    pub interaction: Behavior<InteractionFn>,
}

impl PlayableCharacter {
    pub fn new(ctx: &mut ConstructionContext, name: &str, description: Description) -> Self {
        Self {
            core: EntityCore::new(ctx, EntityKind::Player, name, description),
            is_alive: true,
            items: Vec::new(),
            interaction: Behavior::Default,
        }
    }

    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Self {
            core: EntityCore::placeholder(ctx, stable_id),
            is_alive: true,
            items: Vec::new(),
            interaction: Behavior::Default,
        }
    }

    pub fn acquire(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Remove a carried item by stable id.
    pub fn give_up(&mut self, stable_id: &str) -> Option<Item> {
        let index = self.items.iter().position(|i| i.core.stable_id == stable_id)?;
        Some(self.items.remove(index))
    }

    pub fn find_item(&self, name: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|i| i.core.name.eq_ignore_ascii_case(name))
    }

    pub fn interact_with(&self, item: &Item) -> InteractionResult {
        run_interaction(&self.interaction, item)
    }
}

impl Examinable for PlayableCharacter {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }
}

impl Identified for PlayableCharacter {
    fn kind(&self) -> EntityKind {
        EntityKind::Player
    }

    fn session_id(&self) -> &str {
        &self.core.session_id
    }

    fn stable_id(&self) -> &str {
        &self.core.stable_id
    }
}

/// A host-authored verb attached to a room, a character, or the game itself.
#[derive(Debug, Clone)]
pub struct CustomCommand {
    pub core: EntityCore,
    pub action: Behavior<CommandFn>,
}

impl CustomCommand {
    pub fn new(
        ctx: &mut ConstructionContext,
        command: &str,
        description: &str,
        action: Arc<CommandFn>,
    ) -> Self {
        Self {
            core: EntityCore::new(ctx, EntityKind::Command, command, Description::fixed(description)),
            action: Behavior::bound(action),
        }
    }

    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Self {
            core: EntityCore::placeholder(ctx, stable_id),
            action: Behavior::Default,
        }
    }

    pub fn command(&self) -> &str {
        &self.core.name
    }

    pub fn matches(&self, text: &str) -> bool {
        self.core.name.eq_ignore_ascii_case(text.trim())
    }

    pub fn hidden(mut self) -> Self {
        self.core.is_player_visible = false;
        self
    }

    pub fn action(&self) -> Option<Arc<CommandFn>> {
        self.action.get().cloned()
    }
}

impl Examinable for CustomCommand {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }
}

impl Identified for CustomCommand {
    fn kind(&self) -> EntityKind {
        EntityKind::Command
    }

    fn session_id(&self) -> &str {
        &self.core.session_id
    }

    fn stable_id(&self) -> &str {
        &self.core.stable_id
    }

    fn matching_key(&self) -> String {
        format!(
            "command:{}:{}",
            self.core.name.to_ascii_lowercase(),
            self.core.description.text()
        )
    }
}

/// Run an unbound command action: commands without an action report that explicitly.
pub fn unbound_command(command: &CustomCommand) -> Reaction {
    Reaction::Error(format!("'{}' does nothing yet.", command.command()))
}
