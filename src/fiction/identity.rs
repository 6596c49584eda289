//! Session identifiers and stable ids.
//!
//! Every entity receives a transient session id when it is constructed. Session ids are
//! only unique inside one running playthrough and are never written to a snapshot as
//! identity. Entities also carry a *stable id*, which is persisted and is what matching
//! keys are derived from.
//!
//! Both are drawn from a [`ConstructionContext`] that is passed explicitly to world
//! builders and to the snapshot decoder. Two worlds built by the same code path from a
//! freshly reset context assign identical ids to structurally corresponding entities.

use std::collections::{HashMap, HashSet};

/// Allocates session ids and default stable ids for one world construction.
#[derive(Debug, Default, Clone)]
pub struct ConstructionContext {
    next_session: u64,
    slugs: HashMap<String, u32>,
    claimed: HashSet<String>,
}

impl ConstructionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the next session id from the counter.
    pub fn next_session_id(&mut self) -> String {
        self.next_session += 1;
        self.next_session.to_string()
    }

    /// Rewind the counter and forget allocated stable ids. Must be called before every
    /// fresh world construction.
    pub fn reset_session_ids(&mut self) {
        self.next_session = 0;
        self.slugs.clear();
        self.claimed.clear();
    }

    /// Number of session ids issued since the last reset.
    pub fn issued(&self) -> u64 {
        self.next_session
    }

    /// Derive a stable id from an entity name. Repeated names within one construction
    /// get an ordinal suffix (`lamp`, `lamp-2`, ...). Ids already claimed are skipped.
    pub fn stable_id_for(&mut self, kind: &str, name: &str) -> String {
        let base = format!("{}.{}", kind, slugify(name));
        loop {
            let seen = self.slugs.entry(base.clone()).or_insert(0);
            *seen += 1;
            let candidate = if *seen == 1 {
                base.clone()
            } else {
                format!("{}-{}", base, seen)
            };
            if self.claimed.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Record an id that did not come from [`stable_id_for`](Self::stable_id_for), such
    /// as one read back from a snapshot. Returns false if it was already taken.
    pub fn claim_stable_id(&mut self, stable_id: &str) -> bool {
        self.claimed.insert(stable_id.to_string())
    }
}

/// Lowercase a name and collapse everything that is not alphanumeric into single dashes.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        out.push_str("unnamed");
    }
    out
}

/// Kind tags used as matching key prefixes and snapshot element names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Game,
    Player,
    Overworld,
    Region,
    Room,
    Exit,
    Item,
    Character,
    Command,
}

impl EntityKind {
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Game => "game",
            EntityKind::Player => "player",
            EntityKind::Overworld => "overworld",
            EntityKind::Region => "region",
            EntityKind::Room => "room",
            EntityKind::Exit => "exit",
            EntityKind::Item => "item",
            EntityKind::Character => "character",
            EntityKind::Command => "command",
        }
    }
}

/// Anything that can be correlated across two independently built graphs.
pub trait Identified {
    fn kind(&self) -> EntityKind;

    /// Transient id from the construction context. Never part of a matching key.
    fn session_id(&self) -> &str;

    /// Persisted stable id.
    fn stable_id(&self) -> &str;

    /// Deterministic key derived from stable semantic attributes only.
    fn matching_key(&self) -> String {
        format!("{}:{}", self.kind().tag(), self.stable_id())
    }
}

/// Free-function form of [`Identified::matching_key`].
pub fn matching_key(entity: &dyn Identified) -> String {
    entity.matching_key()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_restart_after_reset() {
        let mut ctx = ConstructionContext::new();
        assert_eq!(ctx.next_session_id(), "1");
        assert_eq!(ctx.next_session_id(), "2");
        ctx.reset_session_ids();
        assert_eq!(ctx.next_session_id(), "1");
        assert_eq!(ctx.issued(), 1);
    }

    #[test]
    fn repeated_names_get_ordinals() {
        let mut ctx = ConstructionContext::new();
        assert_eq!(ctx.stable_id_for("item", "Brass Lamp"), "item.brass-lamp");
        assert_eq!(ctx.stable_id_for("item", "brass  lamp!"), "item.brass-lamp-2");
        assert_eq!(ctx.stable_id_for("room", "Brass Lamp"), "room.brass-lamp");
        ctx.reset_session_ids();
        assert_eq!(ctx.stable_id_for("item", "Brass Lamp"), "item.brass-lamp");
    }

    #[test]
    fn slugify_handles_symbols_only() {
        assert_eq!(slugify("???"), "unnamed");
        assert_eq!(slugify("  Old  Towne "), "old-towne");
    }

    #[test]
    fn claimed_ids_are_never_minted() {
        let mut ctx = ConstructionContext::new();
        assert!(ctx.claim_stable_id("item.lamp"));
        assert!(ctx.claim_stable_id("item.lamp-2"));
        assert!(!ctx.claim_stable_id("item.lamp"));
        assert_eq!(ctx.stable_id_for("item", "Lamp"), "item.lamp-3");
        assert_eq!(ctx.stable_id_for("item", "Lamp"), "item.lamp-4");
        ctx.reset_session_ids();
        assert_eq!(ctx.stable_id_for("item", "Lamp"), "item.lamp");
    }
}
