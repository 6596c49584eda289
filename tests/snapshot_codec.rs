mod common;

use fablekit::demo;
use fablekit::fiction::snapshot::{self, SnapshotNode};
use fablekit::fiction::{
    ConstructionContext, Description, Direction, Examinable, FictionError, Game, GridPosition,
    Item, Overworld, PlayableCharacter, Region, Room,
};
use fablekit::storage::transform::Gzip;
use fablekit::storage::{pack, unpack, FileSlotStore, SlotStore, SnapshotFormat};

#[test]
fn decode_without_skeleton_reproduces_every_attribute() {
    let mut ctx = ConstructionContext::new();
    let mut game = demo::build_world(&mut ctx);
    game.take("brass key");
    game.move_player(Direction::North);
    game.talk_to("keeper");

    let tree = snapshot::encode(&game);
    let mut fresh = ConstructionContext::new();
    let restored = snapshot::decode(&tree, None, &mut fresh).expect("decode");

    assert_eq!(snapshot::encode(&restored), tree);

    let region = restored.overworld.current_region().expect("region");
    let path = region.current_room().expect("room");
    assert_eq!(path.core.name, "Keeper's Path");
    assert_eq!(path.position, GridPosition::new(0, 1));
    assert!(path.has_been_visited);
    let door = path.exit(Direction::East).expect("door");
    assert!(door.is_locked);
    assert_eq!(door.description_text(), "A storm door, locked fast.");
    assert_eq!(path.characters[0].conversation.current, 1);
    assert!(restored.player.find_item("Brass Key").is_some());
}

#[test]
fn decoded_conditional_keeps_both_branches_but_not_the_predicate() {
    let mut ctx = ConstructionContext::new();
    let game = demo::build_world(&mut ctx);
    let tree = snapshot::encode(&game);

    let restored = snapshot::decode(&tree, None, &mut ConstructionContext::new()).unwrap();
    let lamp_room = restored
        .overworld
        .current_region()
        .and_then(|r| r.find_room("Lamp Room"))
        .expect("lamp room");
    match &lamp_room.core.description {
        Description::Conditional(c) => {
            assert_eq!(
                c.when_true,
                "Daylight fills the lamp room. The great lamp sits at its heart."
            );
            assert_eq!(c.when_false, "Night presses on the glass around the great lamp.");
            assert!(!c.condition.is_bound());
        }
        Description::Fixed(_) => panic!("conditional description lost"),
    }
}

#[test]
fn decoded_graph_has_no_bound_behaviors() {
    let mut ctx = ConstructionContext::new();
    let game = demo::build_world(&mut ctx);
    let restored =
        snapshot::decode(&snapshot::encode(&game), None, &mut ConstructionContext::new()).unwrap();
    assert!(!restored.completion.is_bound());
    assert!(!restored.commands[0].action.is_bound());
    let shore = restored.overworld.current_room().expect("shore");
    let key = shore.find_item("brass key").expect("key");
    assert!(!key.core.on_examine.is_bound());
    assert_eq!(key.examine().description, "A heavy brass key, green at the teeth.");
}

#[test]
fn tree_survives_the_storage_pipeline() {
    let mut ctx = ConstructionContext::new();
    let tree = snapshot::encode(&demo::build_world(&mut ctx));
    for format in [SnapshotFormat::Bincode, SnapshotFormat::Json] {
        let bytes = pack(&tree, format, &Gzip::default()).unwrap();
        let (_, back) = unpack("t", bytes, &Gzip::default()).unwrap();
        assert_eq!(back, tree);
    }
}

#[test]
fn stored_slot_that_inflates_past_the_limit_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSlotStore::new(tmp.path()).unwrap();
    let mut ctx = ConstructionContext::new();
    let tree = snapshot::encode(&demo::build_world(&mut ctx));
    let bytes = pack(&tree, SnapshotFormat::Bincode, &Gzip::default()).unwrap();
    store.write("big", &bytes).unwrap();

    let stored = store.read("big").unwrap();
    let tight = Gzip::default().with_max_output(256);
    assert!(matches!(
        unpack("big", stored.clone(), &tight),
        Err(FictionError::Io(_))
    ));
    assert!(unpack("big", stored, &Gzip::default()).is_ok());
}

fn strip_attr(node: &mut SnapshotNode, element: &str, attribute: &str) -> bool {
    if node.name == element && node.attributes.remove(attribute).is_some() {
        return true;
    }
    node.children
        .iter_mut()
        .any(|child| strip_attr(child, element, attribute))
}

#[test]
fn missing_required_attribute_is_fatal() {
    let mut ctx = ConstructionContext::new();
    let mut tree = snapshot::encode(&demo::build_world(&mut ctx));
    assert!(strip_attr(&mut tree, "exit", "locked"));
    let err = snapshot::decode(&tree, None, &mut ConstructionContext::new()).unwrap_err();
    assert!(err.is_structural());
    assert!(matches!(
        err,
        FictionError::MissingAttribute {
            attribute: "locked",
            ..
        }
    ));
}

#[test]
fn malformed_coordinate_is_fatal() {
    let mut ctx = ConstructionContext::new();
    let mut tree = snapshot::encode(&demo::build_world(&mut ctx));
    fn corrupt(node: &mut SnapshotNode) -> bool {
        if node.name == "room" {
            node.set_attr("column", "east-ish");
            return true;
        }
        node.children.iter_mut().any(corrupt)
    }
    assert!(corrupt(&mut tree));
    let err = snapshot::decode(&tree, None, &mut ConstructionContext::new()).unwrap_err();
    assert!(matches!(
        err,
        FictionError::InvalidAttribute {
            attribute: "column",
            ..
        }
    ));
}

#[test]
fn items_added_after_capture_decode_as_placeholders() {
    let mut ctx = ConstructionContext::new();
    let mut game = common::two_room_world(&mut ctx, false);
    game.overworld
        .current_room_mut()
        .unwrap()
        .add_item(Item::new(&mut ctx, "Gem", Description::fixed("Red."), true));
    let tree = snapshot::encode(&game);

    let mut fresh = ConstructionContext::new();
    let skeleton = common::two_room_world(&mut fresh, false);
    let restored = snapshot::decode(&tree, Some(skeleton), &mut fresh).unwrap();
    let room = restored.overworld.current_room().unwrap();
    let names: Vec<&str> = room.items.iter().map(|i| i.core.name.as_str()).collect();
    assert_eq!(names, vec!["Coin", "Gem"]);
}

#[test]
fn building_after_decode_never_reuses_a_decoded_id() {
    let mut ctx = ConstructionContext::new();
    let mut game = common::two_room_world(&mut ctx, false);
    let gem = Item::new(&mut ctx, "Gem", Description::fixed("Red."), true);
    assert_eq!(gem.core.stable_id, "item.gem");
    game.overworld.current_room_mut().unwrap().add_item(gem);
    let tree = snapshot::encode(&game);

    let mut fresh = ConstructionContext::new();
    let skeleton = common::two_room_world(&mut fresh, false);
    let mut restored = snapshot::decode(&tree, Some(skeleton), &mut fresh).unwrap();

    let another = Item::new(&mut fresh, "Gem", Description::fixed("Blue."), true);
    assert_eq!(another.core.stable_id, "item.gem-2");
    let room = restored.overworld.current_room_mut().unwrap();
    room.add_item(another);
    let ids: Vec<&str> = room.items.iter().map(|i| i.core.stable_id.as_str()).collect();
    assert_eq!(ids, vec!["item.coin", "item.gem", "item.gem-2"]);
}

/// Two rooms that share the name "Corridor", at (0,0) and (1,0).
fn twin_corridors(ctx: &mut ConstructionContext) -> Game {
    let mut region = Region::new(ctx, "Wing", Description::fixed("A wing."));
    for column in 0..2 {
        let room = Room::new(ctx, "Corridor", Description::fixed("A corridor."));
        assert!(region.add_room(room, column, 0));
    }
    let mut world = Overworld::new(ctx, "World", Description::fixed("All of it."));
    world.add_region(region, 0, 0);
    let player = PlayableCharacter::new(ctx, "Hero", Description::fixed("You."));
    Game::new(ctx, "Twins", Description::fixed("Twins."), player, world)
}

fn region_node(tree: &mut SnapshotNode) -> &mut SnapshotNode {
    tree.children
        .iter_mut()
        .find(|n| n.name == "overworld")
        .and_then(|o| o.children.iter_mut().find(|n| n.name == "regions"))
        .and_then(|r| r.children.first_mut())
        .expect("region node")
}

#[test]
fn cursor_survives_rooms_with_the_same_name() {
    let mut ctx = ConstructionContext::new();
    let mut game = twin_corridors(&mut ctx);
    let region = game.overworld.current_region_mut().unwrap();
    assert!(region.set_current_room(GridPosition::new(1, 0)));

    let tree = snapshot::encode(&game);
    let restored = snapshot::decode(&tree, None, &mut ConstructionContext::new()).unwrap();
    let region = restored.overworld.current_region().unwrap();
    assert_eq!(region.current_position(), Some(GridPosition::new(1, 0)));
}

#[test]
fn ambiguous_cursor_name_without_id_is_rejected() {
    let mut ctx = ConstructionContext::new();
    let mut game = twin_corridors(&mut ctx);
    game.overworld
        .current_region_mut()
        .unwrap()
        .set_current_room(GridPosition::new(1, 0));
    let mut tree = snapshot::encode(&game);
    region_node(&mut tree).attributes.remove("current_room_id");

    let err = snapshot::decode(&tree, None, &mut ConstructionContext::new()).unwrap_err();
    assert!(matches!(
        err,
        FictionError::InvalidAttribute {
            attribute: "current_room",
            ..
        }
    ));
}

#[test]
fn two_rooms_on_one_cell_are_rejected() {
    let mut ctx = ConstructionContext::new();
    let mut tree = snapshot::encode(&common::two_room_world(&mut ctx, false));
    let rooms = region_node(&mut tree)
        .children
        .iter_mut()
        .find(|n| n.name == "rooms")
        .expect("rooms");
    rooms.children[1].set_attr("column", 0);

    let err = snapshot::decode(&tree, None, &mut ConstructionContext::new()).unwrap_err();
    assert!(err.is_structural());
    assert!(matches!(
        err,
        FictionError::InvalidAttribute {
            attribute: "column",
            ..
        }
    ));
}
