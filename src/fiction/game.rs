//! The game root: player, overworld, game-wide commands and the completion check.

use std::sync::Arc;

use log::debug;

use crate::fiction::behavior::{Behavior, CommandFn, CompletionFn, Reaction};
use crate::fiction::entities::{unbound_command, CustomCommand, PlayableCharacter};
use crate::fiction::errors::FictionError;
use crate::fiction::identity::{ConstructionContext, EntityKind, Identified};
use crate::fiction::spatial::Overworld;
use crate::fiction::types::{Description, Direction, EntityCore, Examinable};

/// Why a game stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    ApplicationExit,
    ReturnToTitle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    NoExit,
    Locked,
    NoRoom,
    NoLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakeOutcome {
    Taken(String),
    NotFound,
    NotTakeable,
}

#[derive(Debug, Clone)]
pub struct Game {
    pub core: EntityCore,
    pub player: PlayableCharacter,
    pub overworld: Overworld,
    pub commands: Vec<CustomCommand>,
    pub completion: Behavior<CompletionFn>,
    pub ended: Option<EndReason>,
}

impl Game {
    pub fn new(
        ctx: &mut ConstructionContext,
        name: &str,
        description: Description,
        player: PlayableCharacter,
        overworld: Overworld,
    ) -> Self {
        let mut game = Self {
            core: EntityCore::new(ctx, EntityKind::Game, name, description),
            player,
            overworld,
            commands: Vec::new(),
            completion: Behavior::Default,
            ended: None,
        };
        if let Some(room) = game.overworld.current_room_mut() {
            room.has_been_visited = true;
        }
        game
    }

    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        let core = EntityCore::placeholder(ctx, stable_id);
        let player = PlayableCharacter::placeholder(ctx, "");
        let overworld = Overworld::placeholder(ctx, "");
        Self {
            core,
            player,
            overworld,
            commands: Vec::new(),
            completion: Behavior::Default,
            ended: None,
        }
    }

    pub fn with_completion(mut self, check: Arc<CompletionFn>) -> Self {
        self.completion = Behavior::bound(check);
        self
    }

    pub fn with_command(mut self, command: CustomCommand) -> Self {
        self.commands.push(command);
        self
    }

    /// Evaluate the host's completion predicate. Unbound means never complete.
    pub fn is_complete(&self) -> bool {
        match self.completion.get() {
            Some(check) => check(self),
            None => false,
        }
    }

    pub fn end(&mut self, reason: EndReason) {
        self.ended = Some(reason);
    }

    pub fn describe_current_room(&self) -> String {
        match self.overworld.current_room() {
            Some(room) => format!("{}\n{}", room.core.name, room.describe()),
            None => "You are nowhere.".to_string(),
        }
    }

    /// Walk through the exit in `direction` of the current room.
    pub fn move_player(&mut self, direction: Direction) -> MoveOutcome {
        let Some(region) = self.overworld.current_region_mut() else {
            return MoveOutcome::NoLocation;
        };
        let Some(from) = region.current_position() else {
            return MoveOutcome::NoLocation;
        };
        match region.room_at(from).and_then(|r| r.exit(direction)) {
            None => return MoveOutcome::NoExit,
            Some(exit) if exit.is_locked => return MoveOutcome::Locked,
            Some(_) => {}
        }
        let Some(target) = region.adjacent_room(from, direction).map(|r| r.position) else {
            return MoveOutcome::NoRoom;
        };
        region.set_current_room(target);
        if let Some(room) = region.current_room_mut() {
            room.has_been_visited = true;
            debug!("player moved {} to '{}'", direction, room.core.name);
        }
        MoveOutcome::Moved
    }

    /// Move a takeable item from the current room to the player.
    pub fn take(&mut self, name: &str) -> TakeOutcome {
        let Some(room) = self.overworld.current_room_mut() else {
            return TakeOutcome::NotFound;
        };
        let Some(item) = room.find_item(name) else {
            return TakeOutcome::NotFound;
        };
        if !item.is_takeable {
            return TakeOutcome::NotTakeable;
        }
        let stable_id = item.core.stable_id.clone();
        match room.remove_item(&stable_id) {
            Some(item) => {
                let name = item.core.name.clone();
                self.player.acquire(item);
                TakeOutcome::Taken(name)
            }
            None => TakeOutcome::NotFound,
        }
    }

    /// Unlock the door pair leaving the current room in `direction`.
    pub fn unlock_door(&mut self, direction: Direction) -> Result<(), FictionError> {
        let region = self
            .overworld
            .current_region_mut()
            .ok_or_else(|| FictionError::NotFound("current region".into()))?;
        let position = region
            .current_position()
            .ok_or_else(|| FictionError::NotFound("current room".into()))?;
        region.unlock_door_pair(position, direction)
    }

    pub fn talk_to(&mut self, name: &str) -> Option<String> {
        self.overworld
            .current_room_mut()
            .and_then(|room| room.find_character_mut(name))
            .and_then(|npc| npc.talk())
    }

    fn find_command_action(&self, text: &str) -> Option<Result<Arc<CommandFn>, Reaction>> {
        let resolve = |command: &CustomCommand| match command.action() {
            Some(action) => Ok(action),
            None => Err(unbound_command(command)),
        };
        if let Some(room) = self.overworld.current_room() {
            if let Some(command) = room.commands.iter().find(|c| c.matches(text)) {
                return Some(resolve(command));
            }
            for npc in &room.characters {
                if let Some(command) = npc.commands.iter().find(|c| c.matches(text)) {
                    return Some(resolve(command));
                }
            }
        }
        self.commands
            .iter()
            .find(|c| c.matches(text))
            .map(resolve)
    }

    /// Run the first custom command named `text` in scope: current room, its characters,
    /// then the game itself.
    pub fn invoke_command(&mut self, text: &str, args: &str) -> Option<Reaction> {
        match self.find_command_action(text)? {
            Ok(action) => Some(action(self, args)),
            Err(reaction) => Some(reaction),
        }
    }
}

impl Examinable for Game {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }
}

impl Identified for Game {
    fn kind(&self) -> EntityKind {
        EntityKind::Game
    }

    fn session_id(&self) -> &str {
        &self.core.session_id
    }

    fn stable_id(&self) -> &str {
        &self.core.stable_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiction::entities::{Exit, Item};
    use crate::fiction::spatial::{Region, Room};

    fn two_room_game(locked: bool) -> Game {
        let mut ctx = ConstructionContext::new();
        let west = Room::new(&mut ctx, "West", Description::fixed("West room."))
            .with_exit(Exit::new(&mut ctx, Direction::East, locked))
            .with_item(Item::new(&mut ctx, "Coin", Description::fixed("Shiny."), true))
            .with_item(Item::new(&mut ctx, "Statue", Description::fixed("Heavy."), false));
        let east = Room::new(&mut ctx, "East", Description::fixed("East room."))
            .with_exit(Exit::new(&mut ctx, Direction::West, locked));
        let mut region = Region::new(&mut ctx, "Hall", Description::fixed("A hall."));
        region.add_room(west, 0, 0);
        region.add_room(east, 1, 0);
        let mut world = Overworld::new(&mut ctx, "World", Description::fixed("All."));
        world.add_region(region, 0, 0);
        let player = PlayableCharacter::new(&mut ctx, "Hero", Description::fixed("You."));
        Game::new(&mut ctx, "Test", Description::fixed("A test."), player, world)
    }

    #[test]
    fn locked_exit_blocks_movement_until_unlocked() {
        let mut game = two_room_game(true);
        assert_eq!(game.move_player(Direction::East), MoveOutcome::Locked);
        assert_eq!(game.move_player(Direction::North), MoveOutcome::NoExit);
        game.unlock_door(Direction::East).expect("door pair");
        assert_eq!(game.move_player(Direction::East), MoveOutcome::Moved);
        let room = game.overworld.current_room().expect("room");
        assert_eq!(room.core.name, "East");
        assert!(room.has_been_visited);
    }

    #[test]
    fn take_respects_takeable_flag() {
        let mut game = two_room_game(false);
        assert_eq!(game.take("statue"), TakeOutcome::NotTakeable);
        assert_eq!(game.take("coin"), TakeOutcome::Taken("Coin".into()));
        assert_eq!(game.take("coin"), TakeOutcome::NotFound);
        assert!(game.player.find_item("Coin").is_some());
    }

    #[test]
    fn commands_can_mutate_the_game() {
        let mut ctx = ConstructionContext::new();
        let game = two_room_game(false).with_command(CustomCommand::new(
            &mut ctx,
            "quit",
            "Leave the game.",
            Arc::new(|game: &mut Game, _args: &str| {
                game.end(EndReason::ApplicationExit);
                Reaction::Inform("Bye.".into())
            }),
        ));
        let mut game = game;
        assert_eq!(
            game.invoke_command("QUIT", ""),
            Some(Reaction::Inform("Bye.".into()))
        );
        assert_eq!(game.ended, Some(EndReason::ApplicationExit));
        assert_eq!(game.invoke_command("dance", ""), None);
    }

    #[test]
    fn completion_defaults_to_incomplete() {
        let game = two_room_game(false);
        assert!(!game.is_complete());
        let game = game.with_completion(Arc::new(|g: &Game| g.player.items.len() == 1));
        assert!(!game.is_complete());
    }
}
