mod common;

use std::sync::Arc;

use fablekit::demo;
use fablekit::fiction::reattach::Reattach;
use fablekit::fiction::snapshot;
use fablekit::fiction::{
    collect_entities, reattach, reattach_naive, BehaviorCatalog, ConstructionContext, Description,
    Examinable, Game, InteractionEffect, InteractionResult, Item, Reaction,
};

fn decoded_copy(game: &Game) -> Game {
    snapshot::decode(&snapshot::encode(game), None, &mut ConstructionContext::new())
        .expect("decode")
}

fn bindings(root: &dyn Reattach) -> Vec<(String, fablekit::fiction::BehaviorSet)> {
    collect_entities(root)
        .into_iter()
        .map(|e| (e.matching_key(), e.capture_behaviors()))
        .collect()
}

#[test]
fn interaction_callback_survives_save_and_reattach() {
    let mut ctx = ConstructionContext::new();
    let mut game = common::two_room_world(&mut ctx, false);
    let offered_coin = Item::new(&mut ctx, "Probe", Description::fixed("p"), true);
    game.overworld.current_room_mut().unwrap().items[0].set_interaction(Arc::new(
        |other: &Item| {
            InteractionResult::new(
                InteractionEffect::ItemMorphed,
                format!("The coin melts into the {}.", other.core.name),
            )
        },
    ));
    let expected = game.overworld.current_room().unwrap().items[0].interact_with(&offered_coin);

    let mut restored = decoded_copy(&game);
    assert_eq!(
        restored.overworld.current_room().unwrap().items[0]
            .interact_with(&offered_coin)
            .effect,
        InteractionEffect::NoEffect
    );

    let report = reattach(&game, &mut restored);
    assert_eq!(report.collisions, 0);
    assert_eq!(report.reattached, report.targets);
    let actual = restored.overworld.current_room().unwrap().items[0].interact_with(&offered_coin);
    assert_eq!(actual, expected);
}

#[test]
fn demo_world_gets_every_slot_back() {
    let mut ctx = ConstructionContext::new();
    let live = demo::build_world(&mut ctx);
    let mut restored = decoded_copy(&live);
    reattach(&live, &mut restored);

    assert!(restored.completion.is_bound());
    assert_eq!(
        restored.invoke_command("score", ""),
        Some(Reaction::Inform("You have visited 1 rooms.".into()))
    );
    let key = restored
        .overworld
        .current_room()
        .and_then(|r| r.find_item("brass key"))
        .expect("key");
    assert!(key.examine().description.ends_with("Stamped on the bow: LIGHT."));
    let lamp_room = restored
        .overworld
        .current_region()
        .and_then(|r| r.find_room("Lamp Room"))
        .expect("lamp room");
    assert!(lamp_room.core.description.condition().unwrap().is_bound());
    let live_lamp_room = live
        .overworld
        .current_region()
        .and_then(|r| r.find_room("Lamp Room"))
        .expect("live lamp room");
    assert_eq!(lamp_room.description_text(), live_lamp_room.description_text());
}

#[test]
fn naive_and_indexed_strategies_agree() {
    let mut ctx = ConstructionContext::new();
    let mut live = demo::build_world(&mut ctx);
    // Duplicate key on the source side to exercise the collision path too.
    let dup = live.overworld.current_room().unwrap().items[0].clone();
    live.overworld.current_room_mut().unwrap().add_item(dup);

    let mut indexed = decoded_copy(&live);
    let mut naive = decoded_copy(&live);
    let indexed_report = reattach(&live, &mut indexed);
    let naive_report = reattach_naive(&live, &mut naive);
    assert_eq!(indexed_report, naive_report);
    assert_eq!(indexed_report.collisions, 1);

    let a = bindings(&indexed);
    let b = bindings(&naive);
    assert_eq!(a.len(), b.len());
    for ((key_a, set_a), (key_b, set_b)) in a.iter().zip(b.iter()) {
        assert_eq!(key_a, key_b);
        assert!(set_a.ptr_eq(set_b), "behaviors differ for {}", key_a);
    }
}

#[test]
fn target_only_entities_keep_defaults_and_data_is_untouched() {
    let mut ctx = ConstructionContext::new();
    let live = common::two_room_world(&mut ctx, true);

    let mut target = decoded_copy(&live);
    let mut extra = Item::new(&mut ConstructionContext::new(), "Newcomer", Description::fixed("n"), true);
    let marker: Arc<fablekit::fiction::behavior::InteractionFn> =
        Arc::new(|_: &Item| InteractionResult::no_effect());
    extra.set_interaction(Arc::clone(&marker));
    target.overworld.current_room_mut().unwrap().add_item(extra);
    let before = snapshot::encode(&target);

    let report = reattach(&live, &mut target);
    assert_eq!(report.targets, report.reattached + 1);
    assert_eq!(snapshot::encode(&target), before);
    let newcomer = target
        .overworld
        .current_room()
        .unwrap()
        .find_item("newcomer")
        .unwrap();
    assert!(newcomer
        .interaction
        .ptr_eq(&fablekit::fiction::Behavior::bound(marker)));
}

#[test]
fn duplicate_targets_all_receive_the_source_behavior() {
    let mut ctx = ConstructionContext::new();
    let mut live = common::two_room_world(&mut ctx, false);
    live.overworld.current_room_mut().unwrap().items[0]
        .set_interaction(Arc::new(|_: &Item| InteractionResult::no_effect()));
    let source_slot = live.overworld.current_room().unwrap().items[0]
        .interaction
        .clone();

    let mut target = decoded_copy(&live);
    let twin = target.overworld.current_room().unwrap().items[0].clone();
    target.overworld.current_room_mut().unwrap().add_item(twin);

    let catalog = BehaviorCatalog::capture(&live);
    catalog.apply(&mut target);
    for item in &target.overworld.current_room().unwrap().items {
        assert!(item.interaction.ptr_eq(&source_slot));
    }
}
