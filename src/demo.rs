//! A small bundled world: three rooms on a headland, a keeper, a locked door pair.
//!
//! Used by the `fablekit play` command and as the fixture for tests. Every behavior slot
//! kind is bound somewhere in it so a save/load cycle exercises reattachment fully.
//!
//! ```text
//!   row 1   Keeper's Path ──E/W (locked)── Lamp Room
//!              │
//!   row 0   Shore
//!          col 0                          col 1
//! ```

use std::sync::Arc;

use chrono::{Local, Timelike};

use crate::fiction::behavior::{
    Examination, ExaminationRequest, InteractionEffect, InteractionResult, Reaction,
};
use crate::fiction::entities::{
    Conversation, CustomCommand, Exit, Item, NonPlayableCharacter, PlayableCharacter,
};
use crate::fiction::game::Game;
use crate::fiction::identity::ConstructionContext;
use crate::fiction::spatial::{Overworld, Region, Room};
use crate::fiction::types::Examinable;
use crate::fiction::types::{Description, Direction};
use crate::session::WorldBuilder;

pub const KEY_NAME: &str = "Brass Key";
pub const LOGBOOK_NAME: &str = "Logbook";
pub const LANTERN_NAME: &str = "Lantern";
/// Hidden in the Lamp Room until the lamp is lit. Its visibility is the lit flag, so it
/// is saved and restored with the rest of the graph.
pub const BEAM_NAME: &str = "Beam";

/// [`build_world`] as a session [`WorldBuilder`].
pub fn world_builder() -> WorldBuilder {
    Arc::new(build_world)
}

pub fn build_world(ctx: &mut ConstructionContext) -> Game {
    let mut key = Item::new(
        ctx,
        KEY_NAME,
        Description::fixed("A heavy brass key, green at the teeth."),
        true,
    );
    key.set_on_examine(Arc::new(|req: &ExaminationRequest<'_>| {
        Examination::new(format!("{} Stamped on the bow: LIGHT.", req.description))
    }));

    let mut shore = Room::new(
        ctx,
        "Shore",
        Description::fixed("Shingle and kelp. A path climbs north."),
    )
    .with_exit(Exit::new(ctx, Direction::North, false))
    .with_item(key)
    .with_item(Item::new(
        ctx,
        "Driftwood",
        Description::fixed("Bleached and smooth."),
        true,
    ))
    .with_item(Item::new(
        ctx,
        "Anchor",
        Description::fixed("Rusted into the rocks."),
        false,
    ));
    shore.add_command(CustomCommand::new(
        ctx,
        "listen",
        "Listen to the sea.",
        Arc::new(|_: &mut Game, _: &str| Reaction::Inform("Waves drag at the shingle.".into())),
    ));

    let door = Exit::new(ctx, Direction::East, true).with_descriptions(
        "A storm door, locked fast.",
        "The storm door stands open.",
    );
    let mut path = Room::new(
        ctx,
        "Keeper's Path",
        Description::fixed("A worn path between gorse. The lighthouse door is east."),
    )
    .with_exit(Exit::new(ctx, Direction::South, false))
    .with_exit(door);
    if let Some(door) = path.exit_mut(Direction::East) {
        door.set_interaction(Arc::new(|item: &Item| {
            if item.core.name == KEY_NAME {
                InteractionResult::new(InteractionEffect::SelfContained, "The key turns.")
            } else {
                InteractionResult::no_effect()
            }
        }));
    }

    let mut keeper = NonPlayableCharacter::new(
        ctx,
        "Keeper",
        Description::fixed("An old keeper in oilskins."),
    )
    .with_conversation(Conversation::new(&[
        "Lamp's been dark three nights.",
        "Key's down on the shore, if the tide left it.",
        "Light it, and write it in the log.",
    ]))
    .with_item(Item::new(
        ctx,
        LANTERN_NAME,
        Description::fixed("A hand lantern, wick trimmed."),
        true,
    ));
    keeper.set_on_examine(Arc::new(|req: &ExaminationRequest<'_>| {
        Examination::new(format!("{} He squints at you.", req.description))
    }));
    keeper.commands.push(CustomCommand::new(
        ctx,
        "ask keeper",
        "Ask the keeper for help.",
        Arc::new(|game: &mut Game, _: &str| hand_over_lantern(game)),
    ));
    path.add_character(keeper);

    let mut beam = Item::new(
        ctx,
        BEAM_NAME,
        Description::fixed("A beam of light sweeps the water."),
        false,
    );
    beam.core.is_player_visible = false;
    let mut lamp_room = Room::new(
        ctx,
        "Lamp Room",
        Description::conditional(
            "Daylight fills the lamp room. The great lamp sits at its heart.",
            "Night presses on the glass around the great lamp.",
            Arc::new(is_daytime),
        ),
    )
    .with_exit(Exit::new(ctx, Direction::West, true))
    .with_item(Item::new(
        ctx,
        LOGBOOK_NAME,
        Description::fixed("The keeper's log. The last entry is a week old."),
        true,
    ))
    .with_item(beam);
    lamp_room.add_command(CustomCommand::new(
        ctx,
        "light lamp",
        "Light the great lamp.",
        Arc::new(|game: &mut Game, _: &str| light_lamp(game)),
    ));

    let mut headland = Region::new(ctx, "Headland", Description::fixed("A windy headland."));
    headland.add_room(shore, 0, 0);
    headland.add_room(path, 0, 1);
    headland.add_room(lamp_room, 1, 1);

    let mut world = Overworld::new(ctx, "Coast", Description::fixed("The north coast."));
    world.add_region(headland, 0, 0);

    let player = PlayableCharacter::new(ctx, "You", Description::fixed("Salt-stiff and tired."));
    Game::new(
        ctx,
        "The Lighthouse",
        Description::fixed("Relight the lamp and log it."),
        player,
        world,
    )
    .with_completion(Arc::new(|game: &Game| {
        lamp_is_lit(game) && game.player.find_item(LOGBOOK_NAME).is_some()
    }))
    .with_command(CustomCommand::new(
        ctx,
        "score",
        "Count visited rooms.",
        Arc::new(|game: &mut Game, _: &str| {
            let visited = game
                .overworld
                .regions
                .iter()
                .flat_map(|r| r.rooms.iter())
                .filter(|room| room.has_been_visited)
                .count();
            Reaction::Inform(format!("You have visited {} rooms.", visited))
        }),
    ))
}

fn is_daytime() -> bool {
    (7..19).contains(&Local::now().hour())
}

/// True once the beam in the Lamp Room is showing.
pub fn lamp_is_lit(game: &Game) -> bool {
    game.overworld
        .regions
        .iter()
        .flat_map(|region| region.rooms.iter())
        .flat_map(|room| room.items.iter())
        .any(|item| item.core.name == BEAM_NAME && item.core.is_player_visible)
}

fn light_lamp(game: &mut Game) -> Reaction {
    if game.player.find_item(LANTERN_NAME).is_none() {
        return Reaction::Error("You have nothing to light it with.".into());
    }
    let Some(beam) = game
        .overworld
        .current_room_mut()
        .and_then(|room| room.items.iter_mut().find(|item| item.core.name == BEAM_NAME))
    else {
        return Reaction::Error("There is no lamp here.".into());
    };
    if beam.core.is_player_visible {
        return Reaction::Inform("The lamp is already burning.".into());
    }
    beam.core.is_player_visible = true;
    Reaction::Inform("The lamp catches. Light sweeps the water.".into())
}

fn hand_over_lantern(game: &mut Game) -> Reaction {
    let Some(room) = game.overworld.current_room_mut() else {
        return Reaction::Error("Nobody is here.".into());
    };
    let Some(keeper) = room.find_character_mut("Keeper") else {
        return Reaction::Error("The keeper is not here.".into());
    };
    let Some(index) = keeper
        .items
        .iter()
        .position(|i| i.core.name == LANTERN_NAME)
    else {
        return Reaction::Inform("\"I've nothing more for you.\"".into());
    };
    let lantern = keeper.items.remove(index);
    game.player.acquire(lantern);
    Reaction::Inform("The keeper hands you a lantern.".into())
}

/// Does any carried item open the exit in `direction`? Uses the exit's interaction slot.
pub fn carried_key_opens(game: &Game, direction: Direction) -> bool {
    let Some(exit) = game
        .overworld
        .current_room()
        .and_then(|room| room.exit(direction))
    else {
        return false;
    };
    game.player
        .items
        .iter()
        .any(|item| exit.interact_with(item).effect != InteractionEffect::NoEffect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiction::game::{MoveOutcome, TakeOutcome};

    #[test]
    fn builds_identically_from_a_reset_context() {
        let mut ctx = ConstructionContext::new();
        let first = build_world(&mut ctx);
        ctx.reset_session_ids();
        let second = build_world(&mut ctx);
        assert_eq!(
            crate::fiction::snapshot::encode(&first),
            crate::fiction::snapshot::encode(&second)
        );
        assert_eq!(first.player.core.session_id, second.player.core.session_id);
    }

    #[test]
    fn walkthrough_completes() {
        let mut ctx = ConstructionContext::new();
        let mut game = build_world(&mut ctx);
        assert_eq!(game.take("brass key"), TakeOutcome::Taken(KEY_NAME.into()));
        assert_eq!(game.move_player(Direction::North), MoveOutcome::Moved);
        assert_eq!(game.move_player(Direction::East), MoveOutcome::Locked);
        assert!(carried_key_opens(&game, Direction::East));
        game.unlock_door(Direction::East).unwrap();
        assert!(game.invoke_command("ask keeper", "").is_some());
        assert_eq!(game.move_player(Direction::East), MoveOutcome::Moved);
        assert!(!game.is_complete());
        assert_eq!(game.take("logbook"), TakeOutcome::Taken(LOGBOOK_NAME.into()));
        assert_eq!(
            game.invoke_command("light lamp", ""),
            Some(Reaction::Inform(
                "The lamp catches. Light sweeps the water.".into()
            ))
        );
        assert!(game.is_complete());
        assert!(lamp_is_lit(&game));
        let room = game.overworld.current_room().unwrap();
        assert!(room.describe().contains(BEAM_NAME));
        assert_eq!(
            game.invoke_command("light lamp", ""),
            Some(Reaction::Inform("The lamp is already burning.".into()))
        );
    }

    #[test]
    fn beam_stays_hidden_until_lit() {
        let mut ctx = ConstructionContext::new();
        let game = build_world(&mut ctx);
        assert!(!lamp_is_lit(&game));
        let lamp_room = game.overworld.current_region().unwrap().find_room("Lamp Room").unwrap();
        assert!(lamp_room.find_item(BEAM_NAME).is_none());
        assert!(!lamp_room.describe().contains(BEAM_NAME));
    }
}
