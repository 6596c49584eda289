//! Overworld → Region → Room hierarchy.
//!
//! Adjacency is never stored. A neighbour in a direction exists when a sibling sits at
//! the coordinate one unit step away. "Current" cursors are coordinates, lazily
//! defaulting to the first member when unset or stale.

use std::sync::Arc;

use log::debug;

use crate::fiction::behavior::{Behavior, InteractionFn, InteractionResult};
use crate::fiction::entities::{CustomCommand, Exit, Item, NonPlayableCharacter};
use crate::fiction::errors::FictionError;
use crate::fiction::identity::{ConstructionContext, EntityKind, Identified};
use crate::fiction::types::{Description, Direction, EntityCore, Examinable, GridPosition};

#[derive(Debug, Clone)]
pub struct Room {
    pub core: EntityCore,
    pub position: GridPosition,
    pub exits: Vec<Exit>,
    pub items: Vec<Item>,
    pub characters: Vec<NonPlayableCharacter>,
    pub commands: Vec<CustomCommand>,
    pub has_been_visited: bool,
    pub interaction: Behavior<InteractionFn>,
}

/// Stable id of the exit leaving `room_id` towards `direction`.
pub fn exit_stable_id(room_id: &str, direction: Direction) -> String {
    format!("{}/{}", room_id, direction)
}

impl Room {
    pub fn new(ctx: &mut ConstructionContext, name: &str, description: Description) -> Self {
        Self {
            core: EntityCore::new(ctx, EntityKind::Room, name, description),
            position: GridPosition::default(),
            exits: Vec::new(),
            items: Vec::new(),
            characters: Vec::new(),
            commands: Vec::new(),
            has_been_visited: false,
            interaction: Behavior::Default,
        }
    }

    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Self {
            core: EntityCore::placeholder(ctx, stable_id),
            position: GridPosition::default(),
            exits: Vec::new(),
            items: Vec::new(),
            characters: Vec::new(),
            commands: Vec::new(),
            has_been_visited: false,
            interaction: Behavior::Default,
        }
    }

    pub fn with_id(mut self, stable_id: &str) -> Self {
        self.core.stable_id = stable_id.to_string();
        for exit in &mut self.exits {
            exit.core.stable_id = exit_stable_id(stable_id, exit.direction);
        }
        self
    }

    /// Attach an exit. A room has at most one exit per direction; the exit's stable id
    /// is derived from this room and the direction.
    pub fn add_exit(&mut self, mut exit: Exit) -> bool {
        if self.exit(exit.direction).is_some() {
            return false;
        }
        exit.core.stable_id = exit_stable_id(&self.core.stable_id, exit.direction);
        self.exits.push(exit);
        true
    }

    pub fn with_exit(mut self, exit: Exit) -> Self {
        self.add_exit(exit);
        self
    }

    pub fn exit(&self, direction: Direction) -> Option<&Exit> {
        self.exits.iter().find(|e| e.direction == direction)
    }

    pub fn exit_mut(&mut self, direction: Direction) -> Option<&mut Exit> {
        self.exits.iter_mut().find(|e| e.direction == direction)
    }

    pub fn add_item(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn add_character(&mut self, character: NonPlayableCharacter) {
        self.characters.push(character);
    }

    pub fn with_character(mut self, character: NonPlayableCharacter) -> Self {
        self.characters.push(character);
        self
    }

    pub fn add_command(&mut self, command: CustomCommand) {
        self.commands.push(command);
    }

    pub fn find_item(&self, name: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|i| i.core.is_player_visible && i.core.name.eq_ignore_ascii_case(name))
    }

    pub fn remove_item(&mut self, stable_id: &str) -> Option<Item> {
        let index = self.items.iter().position(|i| i.core.stable_id == stable_id)?;
        Some(self.items.remove(index))
    }

    pub fn find_character_mut(&mut self, name: &str) -> Option<&mut NonPlayableCharacter> {
        self.characters
            .iter_mut()
            .find(|c| c.core.is_player_visible && c.core.name.eq_ignore_ascii_case(name))
    }

    pub fn interact_with(&self, item: &Item) -> InteractionResult {
        match self.interaction.get() {
            Some(callback) => callback(item),
            None => InteractionResult::no_effect(),
        }
    }

    pub fn set_interaction(&mut self, callback: Arc<InteractionFn>) {
        self.interaction = Behavior::bound(callback);
    }

    /// Description plus visible contents and exits, one line each.
    pub fn describe(&self) -> String {
        let mut out = self.examine().description;
        let items: Vec<&str> = self
            .items
            .iter()
            .filter(|i| i.core.is_player_visible)
            .map(|i| i.core.name.as_str())
            .collect();
        if !items.is_empty() {
            out.push_str(&format!("\nYou see: {}.", items.join(", ")));
        }
        let people: Vec<&str> = self
            .characters
            .iter()
            .filter(|c| c.core.is_player_visible)
            .map(|c| c.core.name.as_str())
            .collect();
        if !people.is_empty() {
            out.push_str(&format!("\nHere: {}.", people.join(", ")));
        }
        let exits: Vec<String> = self
            .exits
            .iter()
            .filter(|e| e.core.is_player_visible)
            .map(|e| {
                if e.is_locked {
                    format!("{} (locked)", e.direction)
                } else {
                    e.direction.to_string()
                }
            })
            .collect();
        if !exits.is_empty() {
            out.push_str(&format!("\nExits: {}.", exits.join(", ")));
        }
        out
    }
}

impl Examinable for Room {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }
}

impl Identified for Room {
    fn kind(&self) -> EntityKind {
        EntityKind::Room
    }

    fn session_id(&self) -> &str {
        &self.core.session_id
    }

    fn stable_id(&self) -> &str {
        &self.core.stable_id
    }
}

#[derive(Debug, Clone)]
pub struct Region {
    pub core: EntityCore,
    pub position: GridPosition,
    pub rooms: Vec<Room>,
    pub(crate) current_room: Option<GridPosition>,
}

impl Region {
    pub fn new(ctx: &mut ConstructionContext, name: &str, description: Description) -> Self {
        Self {
            core: EntityCore::new(ctx, EntityKind::Region, name, description),
            position: GridPosition::default(),
            rooms: Vec::new(),
            current_room: None,
        }
    }

    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Self {
            core: EntityCore::placeholder(ctx, stable_id),
            position: GridPosition::default(),
            rooms: Vec::new(),
            current_room: None,
        }
    }

    /// Place `room` at (column, row). Returns false and leaves the region unchanged when
    /// the coordinate is already taken.
    pub fn add_room(&mut self, mut room: Room, column: i32, row: i32) -> bool {
        let position = GridPosition::new(column, row);
        if self.room_at(position).is_some() {
            debug!(
                "rejecting room '{}' at {}: occupied in region '{}'",
                room.core.name, position, self.core.name
            );
            return false;
        }
        room.position = position;
        self.rooms.push(room);
        true
    }

    pub fn room_at(&self, position: GridPosition) -> Option<&Room> {
        self.rooms.iter().find(|r| r.position == position)
    }

    pub fn room_at_mut(&mut self, position: GridPosition) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|r| r.position == position)
    }

    pub fn find_room(&self, name: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.core.name == name)
    }

    /// The room one unit step from `from` in `direction`, if any.
    pub fn adjacent_room(&self, from: GridPosition, direction: Direction) -> Option<&Room> {
        from.step(direction).and_then(|p| self.room_at(p))
    }

    /// Cursor coordinate, defaulting to the first room.
    pub fn current_position(&self) -> Option<GridPosition> {
        match self.current_room {
            Some(p) if self.room_at(p).is_some() => Some(p),
            _ => self.rooms.first().map(|r| r.position),
        }
    }

    pub fn current_room(&self) -> Option<&Room> {
        self.current_position().and_then(|p| self.room_at(p))
    }

    pub fn current_room_mut(&mut self) -> Option<&mut Room> {
        let position = self.current_position()?;
        self.room_at_mut(position)
    }

    pub fn set_current_room(&mut self, position: GridPosition) -> bool {
        if self.room_at(position).is_none() {
            return false;
        }
        self.current_room = Some(position);
        true
    }

    /// Unlock an exit and the exit facing it from the adjacent room.
    pub fn unlock_door_pair(
        &mut self,
        position: GridPosition,
        direction: Direction,
    ) -> Result<(), FictionError> {
        self.set_door_pair_locked(position, direction, false)
    }

    /// Lock an exit and the exit facing it from the adjacent room.
    pub fn lock_door_pair(
        &mut self,
        position: GridPosition,
        direction: Direction,
    ) -> Result<(), FictionError> {
        self.set_door_pair_locked(position, direction, true)
    }

    fn set_door_pair_locked(
        &mut self,
        position: GridPosition,
        direction: Direction,
        locked: bool,
    ) -> Result<(), FictionError> {
        let local = self
            .rooms
            .iter()
            .position(|r| r.position == position)
            .ok_or_else(|| FictionError::NotFound(format!("room at {}", position)))?;
        let door_pair_error = || FictionError::DoorPair {
            room: self.rooms[local].core.name.clone(),
            direction,
        };
        if self.rooms[local].exit(direction).is_none() {
            return Err(door_pair_error());
        }
        let opposing = position
            .step(direction)
            .and_then(|p| self.rooms.iter().position(|r| r.position == p))
            .filter(|&i| self.rooms[i].exit(direction.opposite()).is_some())
            .ok_or_else(door_pair_error)?;

        for (index, facing) in [(local, direction), (opposing, direction.opposite())] {
            if let Some(exit) = self.rooms[index].exit_mut(facing) {
                exit.is_locked = locked;
            }
        }
        debug!(
            "door pair at {} facing {} now {}",
            position,
            direction,
            if locked { "locked" } else { "unlocked" }
        );
        Ok(())
    }
}

impl Examinable for Region {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }
}

impl Identified for Region {
    fn kind(&self) -> EntityKind {
        EntityKind::Region
    }

    fn session_id(&self) -> &str {
        &self.core.session_id
    }

    fn stable_id(&self) -> &str {
        &self.core.stable_id
    }
}

#[derive(Debug, Clone)]
pub struct Overworld {
    pub core: EntityCore,
    pub regions: Vec<Region>,
    pub(crate) current_region: Option<GridPosition>,
}

impl Overworld {
    pub fn new(ctx: &mut ConstructionContext, name: &str, description: Description) -> Self {
        Self {
            core: EntityCore::new(ctx, EntityKind::Overworld, name, description),
            regions: Vec::new(),
            current_region: None,
        }
    }

    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Self {
            core: EntityCore::placeholder(ctx, stable_id),
            regions: Vec::new(),
            current_region: None,
        }
    }

    /// Place `region` at (column, row). Returns false when the coordinate is taken.
    pub fn add_region(&mut self, mut region: Region, column: i32, row: i32) -> bool {
        let position = GridPosition::new(column, row);
        if self.region_at(position).is_some() {
            debug!(
                "rejecting region '{}' at {}: occupied",
                region.core.name, position
            );
            return false;
        }
        region.position = position;
        self.regions.push(region);
        true
    }

    pub fn region_at(&self, position: GridPosition) -> Option<&Region> {
        self.regions.iter().find(|r| r.position == position)
    }

    pub fn region_at_mut(&mut self, position: GridPosition) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.position == position)
    }

    pub fn adjacent_region(&self, from: GridPosition, direction: Direction) -> Option<&Region> {
        from.step(direction).and_then(|p| self.region_at(p))
    }

    pub fn current_position(&self) -> Option<GridPosition> {
        match self.current_region {
            Some(p) if self.region_at(p).is_some() => Some(p),
            _ => self.regions.first().map(|r| r.position),
        }
    }

    pub fn current_region(&self) -> Option<&Region> {
        self.current_position().and_then(|p| self.region_at(p))
    }

    pub fn current_region_mut(&mut self) -> Option<&mut Region> {
        let position = self.current_position()?;
        self.region_at_mut(position)
    }

    pub fn set_current_region(&mut self, position: GridPosition) -> bool {
        if self.region_at(position).is_none() {
            return false;
        }
        self.current_region = Some(position);
        true
    }

    /// Move the region cursor to the neighbour in `direction`.
    pub fn move_region(&mut self, direction: Direction) -> bool {
        let Some(from) = self.current_position() else {
            return false;
        };
        match self.adjacent_region(from, direction).map(|r| r.position) {
            Some(target) => self.set_current_region(target),
            None => false,
        }
    }

    pub fn current_room(&self) -> Option<&Room> {
        self.current_region().and_then(Region::current_room)
    }

    pub fn current_room_mut(&mut self) -> Option<&mut Room> {
        self.current_region_mut().and_then(Region::current_room_mut)
    }
}

impl Examinable for Overworld {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }
}

impl Identified for Overworld {
    fn kind(&self) -> EntityKind {
        EntityKind::Overworld
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

    fn room(ctx: &mut ConstructionContext, name: &str) -> Room {
        Room::new(ctx, name, Description::fixed(format!("The {}.", name)))
    }

    #[test]
    fn cursor_defaults_to_first_room() {
        let mut ctx = ConstructionContext::new();
        let mut region = Region::new(&mut ctx, "Town", Description::fixed("A town."));
        assert!(region.current_room().is_none());
        assert!(region.add_room(room(&mut ctx, "Square"), 2, 3));
        assert!(region.add_room(room(&mut ctx, "Inn"), 2, 4));
        assert_eq!(region.current_room().map(|r| r.core.name.as_str()), Some("Square"));
        assert!(region.set_current_room(GridPosition::new(2, 4)));
        assert_eq!(region.current_room().map(|r| r.core.name.as_str()), Some("Inn"));
        assert!(!region.set_current_room(GridPosition::new(9, 9)));
    }

    #[test]
    fn adjacency_uses_unit_offsets() {
        let mut ctx = ConstructionContext::new();
        let mut region = Region::new(&mut ctx, "Town", Description::fixed("A town."));
        region.add_room(room(&mut ctx, "Square"), 0, 0);
        region.add_room(room(&mut ctx, "Inn"), 0, 1);
        region.add_room(room(&mut ctx, "Smithy"), -1, 0);
        let origin = GridPosition::new(0, 0);
        assert_eq!(
            region.adjacent_room(origin, Direction::North).map(|r| r.core.name.as_str()),
            Some("Inn")
        );
        assert_eq!(
            region.adjacent_room(origin, Direction::West).map(|r| r.core.name.as_str()),
            Some("Smithy")
        );
        assert!(region.adjacent_room(origin, Direction::South).is_none());
        assert!(region.adjacent_room(origin, Direction::Up).is_none());
    }

    #[test]
    fn exits_are_unique_per_direction() {
        let mut ctx = ConstructionContext::new();
        let mut hall = room(&mut ctx, "Hall");
        assert!(hall.add_exit(Exit::new(&mut ctx, Direction::North, false)));
        assert!(!hall.add_exit(Exit::new(&mut ctx, Direction::North, true)));
        assert_eq!(hall.exits.len(), 1);
        assert_eq!(hall.exits[0].core.stable_id, "room.hall/north");
    }

    #[test]
    fn with_id_rewrites_exit_ids() {
        let mut ctx = ConstructionContext::new();
        let hall = room(&mut ctx, "Hall")
            .with_exit(Exit::new(&mut ctx, Direction::Up, false))
            .with_id("great-hall");
        assert_eq!(hall.exits[0].core.stable_id, "great-hall/up");
    }

    #[test]
    fn region_move_follows_overworld_grid() {
        let mut ctx = ConstructionContext::new();
        let mut world = Overworld::new(&mut ctx, "World", Description::fixed("Everything."));
        world.add_region(Region::new(&mut ctx, "Town", Description::fixed("")), 0, 0);
        world.add_region(Region::new(&mut ctx, "Forest", Description::fixed("")), 1, 0);
        assert!(!world.add_region(Region::new(&mut ctx, "Dupe", Description::fixed("")), 1, 0));
        assert!(world.move_region(Direction::East));
        assert_eq!(world.current_region().map(|r| r.core.name.as_str()), Some("Forest"));
        assert!(!world.move_region(Direction::East));
    }
}
