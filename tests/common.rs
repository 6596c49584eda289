//! Test utilities & fixtures.
//! Worlds small enough to reason about by hand, plus a session on a temp save dir.

use std::sync::Arc;

use fablekit::demo;
use fablekit::fiction::{
    ConstructionContext, Description, Direction, Exit, Game, Item, Overworld, PlayableCharacter,
    Region, Room,
};
use fablekit::session::{HostSignal, Session};
use fablekit::storage::FileSlotStore;
use tokio::sync::mpsc::UnboundedReceiver;

/// One region with rooms at (0,0) "West" and (1,0) "East", joined by an East/West exit
/// pair. A coin lies in the west room.
#[allow(dead_code)]
pub fn two_room_world(ctx: &mut ConstructionContext, locked: bool) -> Game {
    let west = Room::new(ctx, "West", Description::fixed("The west room."))
        .with_exit(Exit::new(ctx, Direction::East, locked))
        .with_item(Item::new(ctx, "Coin", Description::fixed("A coin."), true));
    let east = Room::new(ctx, "East", Description::fixed("The east room."))
        .with_exit(Exit::new(ctx, Direction::West, locked));
    let mut region = Region::new(ctx, "Hall", Description::fixed("A hall."));
    assert!(region.add_room(west, 0, 0));
    assert!(region.add_room(east, 1, 0));
    let mut world = Overworld::new(ctx, "World", Description::fixed("Everything."));
    assert!(world.add_region(region, 0, 0));
    let player = PlayableCharacter::new(ctx, "Hero", Description::fixed("You."));
    Game::new(ctx, "Two Rooms", Description::fixed("A test."), player, world)
}

/// Session over the demo world with slots in a fresh temp dir.
#[allow(dead_code)]
pub fn demo_session() -> (tempfile::TempDir, Session, UnboundedReceiver<HostSignal>) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FileSlotStore::new(tmp.path()).expect("store"));
    let (session, signals) = Session::new(demo::world_builder(), store).expect("session");
    (tmp, session, signals)
}

/// Pull every signal currently queued.
#[allow(dead_code)]
pub fn drain(signals: &mut UnboundedReceiver<HostSignal>) -> Vec<HostSignal> {
    let mut out = Vec::new();
    while let Ok(signal) = signals.try_recv() {
        out.push(signal);
    }
    out
}
