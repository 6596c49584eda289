//! Behavior reattachment.
//!
//! Callbacks cannot be persisted, so after a snapshot is decoded into a fresh graph the
//! behavior slots of the previously live graph are copied across. Entities are
//! correlated by matching key.
//!
//! The step is additive and partial: targets with no source keep what they have,
//! sources with no target are ignored, nothing is created or deleted.
//!
//! Known limitation: when two source entities share a matching key, every target with
//! that key receives the behaviors of the *first* source in pre-order. The collision is
//! logged and counted in the report.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::fiction::behavior::{Behavior, BehaviorSet};
use crate::fiction::entities::{CustomCommand, Exit, Item, NonPlayableCharacter, PlayableCharacter};
use crate::fiction::game::Game;
use crate::fiction::identity::Identified;
use crate::fiction::spatial::{Overworld, Region, Room};
use crate::fiction::types::{Description, EntityCore};

/// Traversal and behavior access shared by every entity kind.
pub trait Reattach: Identified {
    fn capture_behaviors(&self) -> BehaviorSet;
    fn restore_behaviors(&mut self, behaviors: &BehaviorSet);
    fn children(&self) -> Vec<&dyn Reattach>;
    fn for_each_child_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Reattach));
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReattachReport {
    /// Entities in the source graph.
    pub sources: usize,
    /// Entities in the target graph.
    pub targets: usize,
    /// Targets that received behaviors.
    pub reattached: usize,
    /// Source entities whose key was already taken by an earlier source.
    pub collisions: usize,
}

/// Depth-first pre-order flatten of `root` and everything it owns.
pub fn collect_entities(root: &dyn Reattach) -> Vec<&dyn Reattach> {
    let mut out = Vec::new();
    collect_into(root, &mut out);
    out
}

fn collect_into<'a>(entity: &'a dyn Reattach, out: &mut Vec<&'a dyn Reattach>) {
    out.push(entity);
    for child in entity.children() {
        collect_into(child, out);
    }
}

/// Visit `root` and all descendants mutably, in the same pre-order as [`collect_entities`].
pub fn walk_mut(root: &mut dyn Reattach, visit: &mut dyn FnMut(&mut dyn Reattach)) {
    visit(&mut *root);
    root.for_each_child_mut(&mut |child: &mut dyn Reattach| walk_mut(child, visit));
}

/// Behaviors of a source graph indexed by matching key.
#[derive(Debug, Clone, Default)]
pub struct BehaviorCatalog {
    entries: HashMap<String, BehaviorSet>,
    sources: usize,
    collisions: usize,
}

impl BehaviorCatalog {
    /// Flatten `root` and keep the behaviors of the first entity seen per key.
    pub fn capture(root: &dyn Reattach) -> Self {
        let mut catalog = Self::default();
        for entity in collect_entities(root) {
            catalog.sources += 1;
            let key = entity.matching_key();
            if catalog.entries.contains_key(&key) {
                warn!("matching key collision on '{}': keeping first source", key);
                catalog.collisions += 1;
                continue;
            }
            catalog.entries.insert(key, entity.capture_behaviors());
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&BehaviorSet> {
        self.entries.get(key)
    }

    /// Copy captured behaviors onto every entity of `target` whose key is known.
    pub fn apply(&self, target: &mut dyn Reattach) -> ReattachReport {
        let mut report = ReattachReport {
            sources: self.sources,
            collisions: self.collisions,
            ..ReattachReport::default()
        };
        walk_mut(target, &mut |entity: &mut dyn Reattach| {
            report.targets += 1;
            if let Some(behaviors) = self.entries.get(&entity.matching_key()) {
                entity.restore_behaviors(behaviors);
                report.reattached += 1;
            }
        });
        debug!(
            "reattached {} of {} targets from {} sources ({} collisions)",
            report.reattached, report.targets, report.sources, report.collisions
        );
        report
    }
}

/// Reattach behaviors from `source` onto `target` using a key index.
pub fn reattach(source: &dyn Reattach, target: &mut dyn Reattach) -> ReattachReport {
    BehaviorCatalog::capture(source).apply(target)
}

/// Quadratic form of [`reattach`]: for each source, scan the whole target graph.
/// Produces the same result and report.
pub fn reattach_naive(source: &dyn Reattach, target: &mut dyn Reattach) -> ReattachReport {
    let sources = collect_entities(source);
    let mut report = ReattachReport {
        sources: sources.len(),
        ..ReattachReport::default()
    };
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut claimed: HashSet<usize> = HashSet::new();

    for entity in &sources {
        let key = entity.matching_key();
        if !seen_keys.insert(key.clone()) {
            report.collisions += 1;
        }
        let behaviors = entity.capture_behaviors();
        let mut index = 0usize;
        walk_mut(target, &mut |candidate: &mut dyn Reattach| {
            if !claimed.contains(&index) && candidate.matching_key() == key {
                candidate.restore_behaviors(&behaviors);
                claimed.insert(index);
            }
            index += 1;
        });
        report.targets = index;
    }
    if sources.is_empty() {
        walk_mut(target, &mut |_: &mut dyn Reattach| report.targets += 1);
    }
    report.reattached = claimed.len();
    report
}

fn capture_core(core: &EntityCore) -> BehaviorSet {
    BehaviorSet {
        examine: core.on_examine.clone(),
        condition: core
            .description
            .condition()
            .cloned()
            .unwrap_or(Behavior::Default),
        ..BehaviorSet::default()
    }
}

fn restore_core(core: &mut EntityCore, behaviors: &BehaviorSet) {
    core.on_examine = behaviors.examine.clone();
    if let Description::Conditional(c) = &mut core.description {
        c.condition = behaviors.condition.clone();
    }
}

fn visit_all<T: Reattach>(items: &mut [T], visit: &mut dyn FnMut(&mut dyn Reattach)) {
    for item in items {
        visit(item as &mut dyn Reattach);
    }
}

fn as_dyn<T: Reattach>(items: &[T]) -> impl Iterator<Item = &dyn Reattach> {
    items.iter().map(|i| i as &dyn Reattach)
}

impl Reattach for Exit {
    fn capture_behaviors(&self) -> BehaviorSet {
        BehaviorSet {
            interaction: self.interaction.clone(),
            ..capture_core(&self.core)
        }
    }

    fn restore_behaviors(&mut self, behaviors: &BehaviorSet) {
        restore_core(&mut self.core, behaviors);
        self.interaction = behaviors.interaction.clone();
    }

    fn children(&self) -> Vec<&dyn Reattach> {
        Vec::new()
    }

    fn for_each_child_mut(&mut self, _visit: &mut dyn FnMut(&mut dyn Reattach)) {}
}

impl Reattach for Item {
    fn capture_behaviors(&self) -> BehaviorSet {
        BehaviorSet {
            interaction: self.interaction.clone(),
            ..capture_core(&self.core)
        }
    }

    fn restore_behaviors(&mut self, behaviors: &BehaviorSet) {
        restore_core(&mut self.core, behaviors);
        self.interaction = behaviors.interaction.clone();
    }

    fn children(&self) -> Vec<&dyn Reattach> {
        Vec::new()
    }

    fn for_each_child_mut(&mut self, _visit: &mut dyn FnMut(&mut dyn Reattach)) {}
}

impl Reattach for CustomCommand {
    fn capture_behaviors(&self) -> BehaviorSet {
        BehaviorSet {
            command: self.action.clone(),
            ..capture_core(&self.core)
        }
    }

    fn restore_behaviors(&mut self, behaviors: &BehaviorSet) {
        restore_core(&mut self.core, behaviors);
        self.action = behaviors.command.clone();
    }

    fn children(&self) -> Vec<&dyn Reattach> {
        Vec::new()
    }

    fn for_each_child_mut(&mut self, _visit: &mut dyn FnMut(&mut dyn Reattach)) {}
}

impl Reattach for NonPlayableCharacter {
    fn capture_behaviors(&self) -> BehaviorSet {
        BehaviorSet {
            interaction: self.interaction.clone(),
            ..capture_core(&self.core)
        }
    }

    fn restore_behaviors(&mut self, behaviors: &BehaviorSet) {
        restore_core(&mut self.core, behaviors);
        self.interaction = behaviors.interaction.clone();
    }

    fn children(&self) -> Vec<&dyn Reattach> {
        as_dyn(&self.items).chain(as_dyn(&self.commands)).collect()
    }

    fn for_each_child_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Reattach)) {
        visit_all(&mut self.items, visit);
        visit_all(&mut self.commands, visit);
    }
}

impl Reattach for PlayableCharacter {
    fn capture_behaviors(&self) -> BehaviorSet {
        BehaviorSet {
            interaction: self.interaction.clone(),
            ..capture_core(&self.core)
        }
    }

    fn restore_behaviors(&mut self, behaviors: &BehaviorSet) {
        restore_core(&mut self.core, behaviors);
        self.interaction = behaviors.interaction.clone();
    }

    fn children(&self) -> Vec<&dyn Reattach> {
        as_dyn(&self.items).collect()
    }

    fn for_each_child_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Reattach)) {
        visit_all(&mut self.items, visit);
    }
}

impl Reattach for Room {
    fn capture_behaviors(&self) -> BehaviorSet {
        BehaviorSet {
            interaction: self.interaction.clone(),
            ..capture_core(&self.core)
        }
    }

    fn restore_behaviors(&mut self, behaviors: &BehaviorSet) {
        restore_core(&mut self.core, behaviors);
        self.interaction = behaviors.interaction.clone();
    }

    fn children(&self) -> Vec<&dyn Reattach> {
        as_dyn(&self.exits)
            .chain(as_dyn(&self.items))
            .chain(as_dyn(&self.characters))
            .chain(as_dyn(&self.commands))
            .collect()
    }

    fn for_each_child_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Reattach)) {
        visit_all(&mut self.exits, visit);
        visit_all(&mut self.items, visit);
        visit_all(&mut self.characters, visit);
        visit_all(&mut self.commands, visit);
    }
}

impl Reattach for Region {
    fn capture_behaviors(&self) -> BehaviorSet {
        capture_core(&self.core)
    }

    fn restore_behaviors(&mut self, behaviors: &BehaviorSet) {
        restore_core(&mut self.core, behaviors);
    }

    fn children(&self) -> Vec<&dyn Reattach> {
        as_dyn(&self.rooms).collect()
    }

    fn for_each_child_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Reattach)) {
        visit_all(&mut self.rooms, visit);
    }
}

impl Reattach for Overworld {
    fn capture_behaviors(&self) -> BehaviorSet {
        capture_core(&self.core)
    }

    fn restore_behaviors(&mut self, behaviors: &BehaviorSet) {
        restore_core(&mut self.core, behaviors);
    }

    fn children(&self) -> Vec<&dyn Reattach> {
        as_dyn(&self.regions).collect()
    }

    fn for_each_child_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Reattach)) {
        visit_all(&mut self.regions, visit);
    }
}

impl Reattach for Game {
    fn capture_behaviors(&self) -> BehaviorSet {
        BehaviorSet {
            completion: self.completion.clone(),
            ..capture_core(&self.core)
        }
    }

    fn restore_behaviors(&mut self, behaviors: &BehaviorSet) {
        restore_core(&mut self.core, behaviors);
        self.completion = behaviors.completion.clone();
    }

    fn children(&self) -> Vec<&dyn Reattach> {
        let mut out: Vec<&dyn Reattach> = vec![&self.player, &self.overworld];
        out.extend(as_dyn(&self.commands));
        out
    }

    fn for_each_child_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Reattach)) {
        visit(&mut self.player);
        visit(&mut self.overworld);
        visit_all(&mut self.commands, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiction::identity::ConstructionContext;
    use crate::fiction::types::Description;
    use std::sync::Arc;

    #[test]
    fn collect_is_preorder() {
        let mut ctx = ConstructionContext::new();
        let npc = NonPlayableCharacter::new(&mut ctx, "Guard", Description::fixed("Stern."))
            .with_item(Item::new(&mut ctx, "Spear", Description::fixed("Sharp."), false));
        let room = Room::new(&mut ctx, "Gate", Description::fixed("A gate."))
            .with_item(Item::new(&mut ctx, "Rock", Description::fixed("Grey."), true))
            .with_character(npc);
        let keys: Vec<String> = collect_entities(&room)
            .iter()
            .map(|e| e.matching_key())
            .collect();
        assert_eq!(
            keys,
            vec![
                "room:room.gate",
                "item:item.rock",
                "character:character.guard",
                "item:item.spear",
            ]
        );
    }

    #[test]
    fn first_source_wins_on_collision() {
        let mut ctx = ConstructionContext::new();
        let mut first = Item::new(&mut ctx, "Coin", Description::fixed("a"), true).with_id("coin");
        first.set_interaction(Arc::new(|_: &Item| {
            crate::fiction::behavior::InteractionResult::no_effect()
        }));
        let second = Item::new(&mut ctx, "Coin", Description::fixed("b"), true).with_id("coin");
        let source = Room::new(&mut ctx, "Vault", Description::fixed("v"))
            .with_item(first.clone())
            .with_item(second);
        let mut target = Room::new(&mut ctx, "Vault", Description::fixed("v"))
            .with_item(Item::new(&mut ctx, "Coin", Description::fixed("c"), true).with_id("coin"));

        let report = reattach(&source, &mut target);
        assert_eq!(report.collisions, 1);
        assert!(target.items[0].interaction.ptr_eq(&first.interaction));
    }

    #[test]
    fn restore_leaves_fixed_descriptions_alone() {
        let mut ctx = ConstructionContext::new();
        let mut item = Item::new(&mut ctx, "Cup", Description::fixed("A cup."), true);
        let behaviors = BehaviorSet {
            condition: Behavior::bound(Arc::new(|| false)),
            ..BehaviorSet::default()
        };
        item.restore_behaviors(&behaviors);
        assert_eq!(item.core.description.text(), "A cup.");
    }
}
