//! Snapshot tree codec.
//!
//! A snapshot is a tree of named nodes carrying string attributes and ordered children,
//! mirroring the containment hierarchy:
//!
//! ```text
//! game
//! ├── description
//! ├── player ── description, items
//! ├── overworld ── description, regions
//! │   └── region ── description, rooms
//! │       └── room ── description, exits, items, characters, commands
//! └── commands
//! ```
//!
//! Decoding always targets a skeleton. Children are matched to skeleton entities by
//! their persisted `id` attribute; unmatched nodes become fresh placeholders and
//! skeleton entities absent from the snapshot are dropped. Behavior slots are never
//! encoded.
//!
//! Attribute names are part of the durable format. Renaming one breaks old saves.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::fiction::behavior::Behavior;
use crate::fiction::entities::{Conversation, CustomCommand, Exit, Item, NonPlayableCharacter, PlayableCharacter};
use crate::fiction::errors::FictionError;
use crate::fiction::game::Game;
use crate::fiction::identity::ConstructionContext;
use crate::fiction::spatial::{Overworld, Region, Room};
use crate::fiction::types::{ConditionalDescription, Description, Direction, EntityCore, GridPosition};

pub const ATTR_ID: &str = "id";
pub const ATTR_NAME: &str = "name";
pub const ATTR_VISIBLE: &str = "visible";
pub const ATTR_COLUMN: &str = "column";
pub const ATTR_ROW: &str = "row";
pub const ATTR_DIRECTION: &str = "direction";
pub const ATTR_LOCKED: &str = "locked";
pub const ATTR_TAKEABLE: &str = "takeable";
pub const ATTR_ALIVE: &str = "alive";
pub const ATTR_CONVERSATION: &str = "conversation";
pub const ATTR_VISITED: &str = "visited";
pub const ATTR_CURRENT_ROOM: &str = "current_room";
pub const ATTR_CURRENT_REGION: &str = "current_region";
pub const ATTR_CURRENT_ROOM_ID: &str = "current_room_id";
pub const ATTR_CURRENT_REGION_ID: &str = "current_region_id";
pub const ATTR_KIND: &str = "kind";
pub const ATTR_TEXT: &str = "text";
pub const ATTR_WHEN_TRUE: &str = "when_true";
pub const ATTR_WHEN_FALSE: &str = "when_false";

const NODE_DESCRIPTION: &str = "description";

/// One element of a snapshot tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl ToString) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn set_attr(&mut self, key: &str, value: impl ToString) {
        self.attributes.insert(key.to_string(), value.to_string());
    }

    pub fn with_child(mut self, child: SnapshotNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn required_attr(&self, key: &'static str) -> Result<&str, FictionError> {
        self.attr(key).ok_or_else(|| FictionError::MissingAttribute {
            element: self.name.clone(),
            attribute: key,
        })
    }

    /// Required attribute parsed with `FromStr`.
    pub fn parse_attr<T: FromStr>(&self, key: &'static str) -> Result<T, FictionError> {
        let raw = self.required_attr(key)?;
        raw.parse::<T>().map_err(|_| FictionError::InvalidAttribute {
            element: self.name.clone(),
            attribute: key,
            value: raw.to_string(),
        })
    }

    pub fn child(&self, name: &str) -> Option<&SnapshotNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn required_child(&self, name: &'static str) -> Result<&SnapshotNode, FictionError> {
        self.child(name).ok_or_else(|| FictionError::MissingNode {
            element: self.name.clone(),
            child: name,
        })
    }

    fn expect_element(&self, expected: &'static str) -> Result<(), FictionError> {
        if self.name == expected {
            Ok(())
        } else {
            Err(FictionError::UnexpectedElement {
                expected,
                found: self.name.clone(),
            })
        }
    }

    /// Total number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(SnapshotNode::node_count).sum::<usize>()
    }
}

/// Encode/decode capability shared by every persisted entity kind.
pub trait Persist: Sized {
    /// Element name in the snapshot tree.
    const ELEMENT: &'static str;

    fn encode(&self) -> SnapshotNode;

    /// Populate `self` from `node`. Behavior slots are left untouched.
    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError>;

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self;

    fn persisted_id(&self) -> &str;
}

fn encode_description(description: &Description) -> SnapshotNode {
    match description {
        Description::Fixed(text) => SnapshotNode::new(NODE_DESCRIPTION)
            .with_attr(ATTR_KIND, "fixed")
            .with_attr(ATTR_TEXT, text),
        Description::Conditional(c) => SnapshotNode::new(NODE_DESCRIPTION)
            .with_attr(ATTR_KIND, "conditional")
            .with_attr(ATTR_WHEN_TRUE, &c.when_true)
            .with_attr(ATTR_WHEN_FALSE, &c.when_false),
    }
}

/// Conditional branches are replaced but an existing predicate slot is kept so the
/// skeleton's callback survives until reattachment.
fn decode_description(current: &mut Description, node: &SnapshotNode) -> Result<(), FictionError> {
    match node.required_attr(ATTR_KIND)? {
        "fixed" => {
            *current = Description::Fixed(node.required_attr(ATTR_TEXT)?.to_string());
        }
        "conditional" => {
            let when_true = node.required_attr(ATTR_WHEN_TRUE)?.to_string();
            let when_false = node.required_attr(ATTR_WHEN_FALSE)?.to_string();
            let condition = match current {
                Description::Conditional(existing) => existing.condition.clone(),
                Description::Fixed(_) => Behavior::Default,
            };
            *current = Description::Conditional(ConditionalDescription {
                when_true,
                when_false,
                condition,
            });
        }
        other => {
            return Err(FictionError::InvalidAttribute {
                element: node.name.clone(),
                attribute: ATTR_KIND,
                value: other.to_string(),
            })
        }
    }
    Ok(())
}

fn encode_core(element: &str, core: &EntityCore) -> SnapshotNode {
    SnapshotNode::new(element)
        .with_attr(ATTR_ID, &core.stable_id)
        .with_attr(ATTR_NAME, &core.name)
        .with_attr(ATTR_VISIBLE, core.is_player_visible)
        .with_child(encode_description(&core.description))
}

fn decode_core(core: &mut EntityCore, node: &SnapshotNode) -> Result<(), FictionError> {
    let stable_id = node.required_attr(ATTR_ID)?.to_string();
    let name = node.required_attr(ATTR_NAME)?.to_string();
    let visible: bool = node.parse_attr(ATTR_VISIBLE)?;
    decode_description(&mut core.description, node.required_child(NODE_DESCRIPTION)?)?;
    core.stable_id = stable_id;
    core.name = name;
    core.is_player_visible = visible;
    Ok(())
}

fn encode_position(node: &mut SnapshotNode, position: GridPosition) {
    node.set_attr(ATTR_COLUMN, position.column);
    node.set_attr(ATTR_ROW, position.row);
}

fn decode_position(node: &SnapshotNode) -> Result<GridPosition, FictionError> {
    Ok(GridPosition::new(
        node.parse_attr(ATTR_COLUMN)?,
        node.parse_attr(ATTR_ROW)?,
    ))
}

pub fn encode_collection<T: Persist>(name: &str, items: &[T]) -> SnapshotNode {
    let mut node = SnapshotNode::new(name);
    node.children = items.iter().map(Persist::encode).collect();
    node
}

/// Synchronise `items` with the `collection` child of `parent` by persisted id.
///
/// Existing entities whose id appears in the snapshot are decoded in place and keep
/// their identity. Ids missing from the skeleton get a placeholder. Skeleton entities
/// the snapshot does not mention are removed. The resulting order is the snapshot order.
pub fn sync_collection<T: Persist>(
    parent: &SnapshotNode,
    collection: &'static str,
    items: &mut Vec<T>,
    ctx: &mut ConstructionContext,
) -> Result<(), FictionError> {
    let list = parent.required_child(collection)?;
    let mut pool: Vec<Option<T>> = std::mem::take(items).into_iter().map(Some).collect();
    let mut synced = Vec::with_capacity(list.children.len());

    for child in &list.children {
        child.expect_element(T::ELEMENT)?;
        let id = child.required_attr(ATTR_ID)?;
        let existing = pool
            .iter_mut()
            .find(|slot| slot.as_ref().map(|e| e.persisted_id() == id).unwrap_or(false))
            .and_then(Option::take);
        let mut entity = match existing {
            Some(entity) => entity,
            None => T::placeholder(ctx, id),
        };
        entity.decode_into(child, ctx)?;
        synced.push(entity);
    }

    let removed = pool.iter().filter(|slot| slot.is_some()).count();
    if removed > 0 {
        debug!(
            "snapshot sync dropped {} <{}> not present in <{}>",
            removed,
            T::ELEMENT,
            parent.name
        );
    }
    *items = synced;
    Ok(())
}

/// A cursor as written by `encode`: the member's name plus, optionally, its id.
struct CursorAttrs {
    name: &'static str,
    id: &'static str,
}

const ROOM_CURSOR: CursorAttrs = CursorAttrs {
    name: ATTR_CURRENT_ROOM,
    id: ATTR_CURRENT_ROOM_ID,
};

const REGION_CURSOR: CursorAttrs = CursorAttrs {
    name: ATTR_CURRENT_REGION,
    id: ATTR_CURRENT_REGION_ID,
};

/// Resolve a cursor over `(name, stable id, position)` members. An empty name means
/// unset. The id wins when present; a bare name must pick exactly one member.
fn decode_cursor<'a>(
    node: &SnapshotNode,
    attrs: CursorAttrs,
    members: impl IntoIterator<Item = (&'a str, &'a str, GridPosition)>,
) -> Result<Option<GridPosition>, FictionError> {
    let wanted = node.required_attr(attrs.name)?;
    if wanted.is_empty() {
        return Ok(None);
    }
    let invalid = |attribute: &'static str, value: &str| FictionError::InvalidAttribute {
        element: node.name.clone(),
        attribute,
        value: value.to_string(),
    };
    let members: Vec<_> = members.into_iter().collect();

    if let Some(id) = node.attr(attrs.id).filter(|id| !id.is_empty()) {
        return members
            .iter()
            .find(|(_, member_id, _)| *member_id == id)
            .map(|(_, _, position)| Some(*position))
            .ok_or_else(|| invalid(attrs.id, id));
    }

    let mut named = members.iter().filter(|(name, _, _)| *name == wanted);
    match (named.next(), named.next()) {
        (Some((_, _, position)), None) => Ok(Some(*position)),
        // Zero matches, or a name shared by several members.
        _ => Err(invalid(attrs.name, wanted)),
    }
}

/// Fail if two members of a grid occupy the same cell.
fn ensure_distinct_cells(
    element: &str,
    positions: impl IntoIterator<Item = GridPosition>,
) -> Result<(), FictionError> {
    let mut seen = HashSet::new();
    for position in positions {
        if !seen.insert(position) {
            return Err(FictionError::InvalidAttribute {
                element: element.to_string(),
                attribute: ATTR_COLUMN,
                value: format!("{} (cell {} already occupied)", position.column, position),
            });
        }
    }
    Ok(())
}

impl Persist for Exit {
    const ELEMENT: &'static str = "exit";

    fn encode(&self) -> SnapshotNode {
        encode_core(Self::ELEMENT, &self.core)
            .with_attr(ATTR_DIRECTION, self.direction)
            .with_attr(ATTR_LOCKED, self.is_locked)
    }

    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        _ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError> {
        node.expect_element(Self::ELEMENT)?;
        decode_core(&mut self.core, node)?;
        self.direction = node.parse_attr::<Direction>(ATTR_DIRECTION)?;
        self.is_locked = node.parse_attr(ATTR_LOCKED)?;
        Ok(())
    }

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Exit::placeholder(ctx, stable_id)
    }

    fn persisted_id(&self) -> &str {
        &self.core.stable_id
    }
}

impl Persist for Item {
    const ELEMENT: &'static str = "item";

    fn encode(&self) -> SnapshotNode {
        encode_core(Self::ELEMENT, &self.core).with_attr(ATTR_TAKEABLE, self.is_takeable)
    }

    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        _ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError> {
        node.expect_element(Self::ELEMENT)?;
        decode_core(&mut self.core, node)?;
        self.is_takeable = node.parse_attr(ATTR_TAKEABLE)?;
        Ok(())
    }

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Item::placeholder(ctx, stable_id)
    }

    fn persisted_id(&self) -> &str {
        &self.core.stable_id
    }
}

impl Persist for CustomCommand {
    const ELEMENT: &'static str = "command";

    fn encode(&self) -> SnapshotNode {
        encode_core(Self::ELEMENT, &self.core)
    }

    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        _ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError> {
        node.expect_element(Self::ELEMENT)?;
        decode_core(&mut self.core, node)
    }

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        CustomCommand::placeholder(ctx, stable_id)
    }

    fn persisted_id(&self) -> &str {
        &self.core.stable_id
    }
}

impl Persist for NonPlayableCharacter {
    const ELEMENT: &'static str = "character";

    fn encode(&self) -> SnapshotNode {
        encode_core(Self::ELEMENT, &self.core)
            .with_attr(ATTR_ALIVE, self.is_alive)
            .with_attr(ATTR_CONVERSATION, self.conversation.current)
            .with_child(encode_collection("items", &self.items))
            .with_child(encode_collection("commands", &self.commands))
    }

    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError> {
        node.expect_element(Self::ELEMENT)?;
        decode_core(&mut self.core, node)?;
        self.is_alive = node.parse_attr(ATTR_ALIVE)?;
        let current: usize = node.parse_attr(ATTR_CONVERSATION)?;
        self.conversation = Conversation {
            lines: std::mem::take(&mut self.conversation.lines),
            current,
        };
        sync_collection(node, "items", &mut self.items, ctx)?;
        sync_collection(node, "commands", &mut self.commands, ctx)
    }

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        NonPlayableCharacter::placeholder(ctx, stable_id)
    }

    fn persisted_id(&self) -> &str {
        &self.core.stable_id
    }
}

impl Persist for PlayableCharacter {
    const ELEMENT: &'static str = "player";

    fn encode(&self) -> SnapshotNode {
        encode_core(Self::ELEMENT, &self.core)
            .with_attr(ATTR_ALIVE, self.is_alive)
            .with_child(encode_collection("items", &self.items))
    }

    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError> {
        node.expect_element(Self::ELEMENT)?;
        decode_core(&mut self.core, node)?;
        self.is_alive = node.parse_attr(ATTR_ALIVE)?;
        sync_collection(node, "items", &mut self.items, ctx)
    }

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        PlayableCharacter::placeholder(ctx, stable_id)
    }

    fn persisted_id(&self) -> &str {
        &self.core.stable_id
    }
}

impl Persist for Room {
    const ELEMENT: &'static str = "room";

    fn encode(&self) -> SnapshotNode {
        let mut node = encode_core(Self::ELEMENT, &self.core)
            .with_attr(ATTR_VISITED, self.has_been_visited);
        encode_position(&mut node, self.position);
        node.with_child(encode_collection("exits", &self.exits))
            .with_child(encode_collection("items", &self.items))
            .with_child(encode_collection("characters", &self.characters))
            .with_child(encode_collection("commands", &self.commands))
    }

    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError> {
        node.expect_element(Self::ELEMENT)?;
        decode_core(&mut self.core, node)?;
        self.position = decode_position(node)?;
        self.has_been_visited = node.parse_attr(ATTR_VISITED)?;
        sync_collection(node, "exits", &mut self.exits, ctx)?;
        sync_collection(node, "items", &mut self.items, ctx)?;
        sync_collection(node, "characters", &mut self.characters, ctx)?;
        sync_collection(node, "commands", &mut self.commands, ctx)
    }

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Room::placeholder(ctx, stable_id)
    }

    fn persisted_id(&self) -> &str {
        &self.core.stable_id
    }
}

impl Persist for Region {
    const ELEMENT: &'static str = "region";

    fn encode(&self) -> SnapshotNode {
        let (name, id) = self
            .current_room()
            .map(|r| (r.core.name.clone(), r.core.stable_id.clone()))
            .unwrap_or_default();
        let mut node = encode_core(Self::ELEMENT, &self.core)
            .with_attr(ATTR_CURRENT_ROOM, name)
            .with_attr(ATTR_CURRENT_ROOM_ID, id);
        encode_position(&mut node, self.position);
        node.with_child(encode_collection("rooms", &self.rooms))
    }

    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError> {
        node.expect_element(Self::ELEMENT)?;
        decode_core(&mut self.core, node)?;
        self.position = decode_position(node)?;
        sync_collection(node, "rooms", &mut self.rooms, ctx)?;
        ensure_distinct_cells(Room::ELEMENT, self.rooms.iter().map(|r| r.position))?;
        self.current_room = decode_cursor(
            node,
            ROOM_CURSOR,
            self.rooms
                .iter()
                .map(|r| (r.core.name.as_str(), r.core.stable_id.as_str(), r.position)),
        )?;
        Ok(())
    }

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Region::placeholder(ctx, stable_id)
    }

    fn persisted_id(&self) -> &str {
        &self.core.stable_id
    }
}

impl Persist for Overworld {
    const ELEMENT: &'static str = "overworld";

    fn encode(&self) -> SnapshotNode {
        let (name, id) = self
            .current_region()
            .map(|r| (r.core.name.clone(), r.core.stable_id.clone()))
            .unwrap_or_default();
        encode_core(Self::ELEMENT, &self.core)
            .with_attr(ATTR_CURRENT_REGION, name)
            .with_attr(ATTR_CURRENT_REGION_ID, id)
            .with_child(encode_collection("regions", &self.regions))
    }

    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError> {
        node.expect_element(Self::ELEMENT)?;
        decode_core(&mut self.core, node)?;
        sync_collection(node, "regions", &mut self.regions, ctx)?;
        ensure_distinct_cells(Region::ELEMENT, self.regions.iter().map(|r| r.position))?;
        self.current_region = decode_cursor(
            node,
            REGION_CURSOR,
            self.regions
                .iter()
                .map(|r| (r.core.name.as_str(), r.core.stable_id.as_str(), r.position)),
        )?;
        Ok(())
    }

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Overworld::placeholder(ctx, stable_id)
    }

    fn persisted_id(&self) -> &str {
        &self.core.stable_id
    }
}

impl Persist for Game {
    const ELEMENT: &'static str = "game";

    fn encode(&self) -> SnapshotNode {
        encode_core(Self::ELEMENT, &self.core)
            .with_child(self.player.encode())
            .with_child(self.overworld.encode())
            .with_child(encode_collection("commands", &self.commands))
    }

    fn decode_into(
        &mut self,
        node: &SnapshotNode,
        ctx: &mut ConstructionContext,
    ) -> Result<(), FictionError> {
        node.expect_element(Self::ELEMENT)?;
        decode_core(&mut self.core, node)?;
        self.player
            .decode_into(node.required_child(PlayableCharacter::ELEMENT)?, ctx)?;
        self.overworld
            .decode_into(node.required_child(Overworld::ELEMENT)?, ctx)?;
        sync_collection(node, "commands", &mut self.commands, ctx)
    }

    fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        Game::placeholder(ctx, stable_id)
    }

    fn persisted_id(&self) -> &str {
        &self.core.stable_id
    }
}

/// Encode a live game. Never mutates it.
pub fn encode(game: &Game) -> SnapshotNode {
    game.encode()
}

/// Decode `node` into `skeleton`, or into a fresh placeholder game when none is given.
pub fn decode(
    node: &SnapshotNode,
    skeleton: Option<Game>,
    ctx: &mut ConstructionContext,
) -> Result<Game, FictionError> {
    let mut game = match skeleton {
        Some(game) => game,
        None => {
            let id = node.required_attr(ATTR_ID)?;
            Game::placeholder(ctx, id)
        }
    };
    game.decode_into(node, ctx)?;
    Ok(game)
}
