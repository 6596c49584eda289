use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fiction::behavior::{Behavior, ConditionFn, Examination, ExaminationRequest, ExamineFn};
use crate::fiction::identity::{ConstructionContext, EntityKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    /// Explicit opposition table.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Unit vector on the (column, row) grid. Vertical directions have none.
    pub fn offset(self) -> Option<(i32, i32)> {
        match self {
            Direction::North => Some((0, 1)),
            Direction::South => Some((0, -1)),
            Direction::East => Some((1, 0)),
            Direction::West => Some((-1, 0)),
            Direction::Up | Direction::Down => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" | "n" => Ok(Direction::North),
            "east" | "e" => Ok(Direction::East),
            "south" | "s" => Ok(Direction::South),
            "west" | "w" => Ok(Direction::West),
            "up" | "u" => Ok(Direction::Up),
            "down" | "d" => Ok(Direction::Down),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Integer (column, row) coordinates of a region in the overworld or a room in a region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct GridPosition {
    pub column: i32,
    pub row: i32,
}

impl GridPosition {
    pub fn new(column: i32, row: i32) -> Self {
        Self { column, row }
    }

    /// Neighbouring coordinate in `direction`, if the direction is planar.
    pub fn step(self, direction: Direction) -> Option<GridPosition> {
        direction
            .offset()
            .map(|(dc, dr)| GridPosition::new(self.column + dc, self.row + dr))
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.column, self.row)
    }
}

/// Two description branches selected by a predicate at read time. Only the branches
/// are persisted.
#[derive(Debug, Clone)]
pub struct ConditionalDescription {
    pub when_true: String,
    pub when_false: String,
    pub condition: Behavior<ConditionFn>,
}

impl ConditionalDescription {
    pub fn pick(&self, flag: bool) -> &str {
        if flag {
            &self.when_true
        } else {
            &self.when_false
        }
    }

    /// Evaluate the predicate. An unbound predicate selects the `when_true` branch.
    pub fn evaluate(&self) -> bool {
        match self.condition.get() {
            Some(condition) => condition(),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Description {
    Fixed(String),
    Conditional(ConditionalDescription),
}

impl Description {
    pub fn fixed(text: impl Into<String>) -> Self {
        Description::Fixed(text.into())
    }

    pub fn conditional(
        when_true: impl Into<String>,
        when_false: impl Into<String>,
        condition: Arc<ConditionFn>,
    ) -> Self {
        Description::Conditional(ConditionalDescription {
            when_true: when_true.into(),
            when_false: when_false.into(),
            condition: Behavior::bound(condition),
        })
    }

    pub fn text(&self) -> &str {
        match self {
            Description::Fixed(text) => text,
            Description::Conditional(c) => c.pick(c.evaluate()),
        }
    }

    pub fn condition(&self) -> Option<&Behavior<ConditionFn>> {
        match self {
            Description::Fixed(_) => None,
            Description::Conditional(c) => Some(&c.condition),
        }
    }
}

impl Default for Description {
    fn default() -> Self {
        Description::Fixed(String::new())
    }
}

/// Attributes shared by every examinable entity.
#[derive(Debug, Clone)]
pub struct EntityCore {
    pub name: String,
    pub description: Description,
    pub is_player_visible: bool,
    pub session_id: String,
    pub stable_id: String,
    pub on_examine: Behavior<ExamineFn>,
}

impl EntityCore {
    pub fn new(
        ctx: &mut ConstructionContext,
        kind: EntityKind,
        name: &str,
        description: Description,
    ) -> Self {
        Self {
            name: name.to_string(),
            description,
            is_player_visible: true,
            session_id: ctx.next_session_id(),
            stable_id: ctx.stable_id_for(kind.tag(), name),
            on_examine: Behavior::Default,
        }
    }

    /// Empty core for an entity the decoder is about to populate. The id is claimed in
    /// `ctx` so later construction cannot mint it again.
    pub fn placeholder(ctx: &mut ConstructionContext, stable_id: &str) -> Self {
        ctx.claim_stable_id(stable_id);
        Self {
            name: String::new(),
            description: Description::default(),
            is_player_visible: true,
            session_id: ctx.next_session_id(),
            stable_id: stable_id.to_string(),
            on_examine: Behavior::Default,
        }
    }
}

/// Entities a player can look at.
pub trait Examinable {
    fn core(&self) -> &EntityCore;
    fn core_mut(&mut self) -> &mut EntityCore;

    fn name(&self) -> &str {
        &self.core().name
    }

    fn description_text(&self) -> String {
        self.core().description.text().to_string()
    }

    /// Run the examine callback, or fall back to the description.
    fn examine(&self) -> Examination {
        let description = self.description_text();
        let core = self.core();
        match core.on_examine.get() {
            Some(callback) => callback(&ExaminationRequest {
                name: &core.name,
                description: &description,
                is_player_visible: core.is_player_visible,
            }),
            None => Examination::new(description),
        }
    }

    fn set_on_examine(&mut self, callback: Arc<ExamineFn>) {
        self.core_mut().on_examine = Behavior::bound(callback);
    }
}
