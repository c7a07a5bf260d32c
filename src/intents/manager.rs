//! The intent manager
//!
//! Collects intents, deduplicates them by post-rename namespace, routes
//! the special kinds (users, roles, auth version, oplog, prelude) into
//! dedicated slots, and orders the collection queue for the scheduler.
//!
//! Restore order within the queue:
//! 1. user collections before `system.*` collections within a database,
//!    views last (their base collections must exist first);
//! 2. the `admin` database after everything else (users/roles live there);
//! 3. databases otherwise alphabetical, collections alphabetical.
//!
//! Dump order: user-visible collections first, `system.*` after; users and
//! roles ride in their slots and are handled last by the pipeline.

use std::collections::BTreeSet;

use crate::catalog::Namespace;

use super::errors::{IntentError, IntentResult};
use super::intent::{Intent, IntentKind};

/// The plan: every intent for one dump or restore run.
#[derive(Debug, Default)]
pub struct IntentManager {
    queue: Vec<Intent>,
    users: Option<Intent>,
    roles: Option<Intent>,
    auth_version: Option<Intent>,
    oplog: Option<Intent>,
    prelude: Option<Intent>,
    seen: BTreeSet<Namespace>,
    frozen: bool,
}

impl IntentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an intent, routing special kinds to their slots.
    pub fn insert(&mut self, intent: Intent) -> IntentResult<()> {
        debug_assert!(!self.frozen, "plan mutated after freeze");
        match intent.kind() {
            IntentKind::Users => Self::fill(&mut self.users, intent, "users"),
            IntentKind::Roles => Self::fill(&mut self.roles, intent, "roles"),
            IntentKind::AuthVersion => Self::fill(&mut self.auth_version, intent, "auth version"),
            IntentKind::Oplog => Self::fill(&mut self.oplog, intent, "oplog"),
            IntentKind::PreludeMetadata => Self::fill(&mut self.prelude, intent, "prelude"),
            IntentKind::Normal | IntentKind::View | IntentKind::Timeseries => {
                if !self.seen.insert(intent.namespace().clone()) {
                    return Err(IntentError::duplicate_namespace(intent.namespace()));
                }
                self.queue.push(intent);
                Ok(())
            }
        }
    }

    fn fill(slot: &mut Option<Intent>, intent: Intent, what: &'static str) -> IntentResult<()> {
        if slot.is_some() {
            return Err(IntentError::duplicate_special(what));
        }
        *slot = Some(intent);
        Ok(())
    }

    /// Number of queued collection intents.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// All queued intents, in current order.
    pub fn iter(&self) -> impl Iterator<Item = &Intent> {
        self.queue.iter()
    }

    /// Looks up a queued intent by post-rename namespace.
    pub fn get(&self, ns: &Namespace) -> Option<&Intent> {
        self.queue.iter().find(|i| i.namespace() == ns)
    }

    pub fn users(&self) -> Option<&Intent> {
        self.users.as_ref()
    }

    pub fn roles(&self) -> Option<&Intent> {
        self.roles.as_ref()
    }

    pub fn auth_version(&self) -> Option<&Intent> {
        self.auth_version.as_ref()
    }

    pub fn oplog(&self) -> Option<&Intent> {
        self.oplog.as_ref()
    }

    pub fn prelude(&self) -> Option<&Intent> {
        self.prelude.as_ref()
    }

    /// Takes the users and roles intents out of their slots.
    pub fn take_users_roles(&mut self) -> (Option<Intent>, Option<Intent>) {
        (self.users.take(), self.roles.take())
    }

    /// Takes the oplog intent out of its slot.
    pub fn take_oplog(&mut self) -> Option<Intent> {
        self.oplog.take()
    }

    fn restore_rank(intent: &Intent) -> (u8, String, u8, String) {
        let admin_last = u8::from(intent.namespace().db() == "admin");
        let class = match intent.kind() {
            // Views wait for their base collections
            IntentKind::View => 2,
            _ if intent.is_special_collection() => 1,
            _ => 0,
        };
        (
            admin_last,
            intent.namespace().db().to_string(),
            class,
            intent.namespace().coll().to_string(),
        )
    }

    fn dump_rank(intent: &Intent) -> (String, u8, String) {
        (
            intent.namespace().db().to_string(),
            u8::from(intent.is_special_collection()),
            intent.namespace().coll().to_string(),
        )
    }

    /// Orders the queue for restore and freezes the plan.
    pub fn finalize_restore(&mut self) {
        self.queue.sort_by(|a, b| {
            Self::restore_rank(a).cmp(&Self::restore_rank(b))
        });
        self.frozen = true;
    }

    /// Orders the queue for dump and freezes the plan.
    pub fn finalize_dump(&mut self) {
        self.queue.sort_by(|a, b| Self::dump_rank(a).cmp(&Self::dump_rank(b)));
        self.frozen = true;
    }

    /// Next intent to schedule, if any.
    pub fn peek(&self) -> Option<&Intent> {
        self.queue.first()
    }

    /// Removes and returns the next intent.
    pub fn pop(&mut self) -> Option<Intent> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    /// Drains the whole queue in order.
    pub fn drain(&mut self) -> Vec<Intent> {
        std::mem::take(&mut self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::IntentErrorCode;
    use super::*;

    fn intent(db: &str, coll: &str, kind: IntentKind) -> Intent {
        Intent::new(Namespace::new(db, coll), kind)
    }

    #[test]
    fn test_duplicate_namespace_rejected() {
        let mut manager = IntentManager::new();
        manager
            .insert(intent("db", "users", IntentKind::Normal))
            .unwrap();
        let err = manager
            .insert(intent("db", "users", IntentKind::Normal))
            .unwrap_err();
        assert_eq!(err.code(), IntentErrorCode::DvIntentDuplicate);
    }

    #[test]
    fn test_rename_dedupes_by_target() {
        let mut manager = IntentManager::new();
        manager
            .insert(
                intent("src1", "a", IntentKind::Normal)
                    .with_rename(Namespace::new("dst", "a")),
            )
            .unwrap();
        // A different source mapping onto the same target collides
        let err = manager
            .insert(
                intent("src2", "a", IntentKind::Normal)
                    .with_rename(Namespace::new("dst", "a")),
            )
            .unwrap_err();
        assert_eq!(err.code(), IntentErrorCode::DvIntentDuplicate);
    }

    #[test]
    fn test_special_slots() {
        let mut manager = IntentManager::new();
        manager
            .insert(intent("admin", "system.users", IntentKind::Users))
            .unwrap();
        manager
            .insert(intent("admin", "system.roles", IntentKind::Roles))
            .unwrap();
        manager
            .insert(intent("admin", "system.version", IntentKind::AuthVersion))
            .unwrap();
        manager
            .insert(intent("local", "oplog.rs", IntentKind::Oplog))
            .unwrap();

        assert!(manager.users().is_some());
        assert!(manager.roles().is_some());
        assert!(manager.auth_version().is_some());
        assert!(manager.oplog().is_some());
        assert!(manager.is_empty());

        let err = manager
            .insert(intent("admin", "system.users", IntentKind::Users))
            .unwrap_err();
        assert_eq!(err.code(), IntentErrorCode::DvIntentSpecialSlot);
        assert!(err.message().contains("users"));
    }

    #[test]
    fn test_restore_order() {
        let mut manager = IntentManager::new();
        manager
            .insert(intent("admin", "settings", IntentKind::Normal))
            .unwrap();
        manager
            .insert(intent("db1", "system.js", IntentKind::Normal))
            .unwrap();
        manager
            .insert(intent("db1", "top_view", IntentKind::View))
            .unwrap();
        manager
            .insert(intent("db1", "accounts", IntentKind::Normal))
            .unwrap();
        manager
            .insert(intent("db0", "zeta", IntentKind::Normal))
            .unwrap();
        manager.finalize_restore();

        let order: Vec<String> = manager.iter().map(|i| i.namespace().to_string()).collect();
        assert_eq!(
            order,
            vec![
                "db0.zeta",
                "db1.accounts",
                "db1.system.js",
                "db1.top_view",
                "admin.settings",
            ]
        );
    }

    #[test]
    fn test_dump_order_user_collections_first() {
        let mut manager = IntentManager::new();
        manager
            .insert(intent("db1", "system.js", IntentKind::Normal))
            .unwrap();
        manager
            .insert(intent("db1", "alpha", IntentKind::Normal))
            .unwrap();
        manager.finalize_dump();

        let order: Vec<String> = manager.iter().map(|i| i.namespace().to_string()).collect();
        assert_eq!(order, vec!["db1.alpha", "db1.system.js"]);
    }

    #[test]
    fn test_pop_drains_in_order() {
        let mut manager = IntentManager::new();
        manager
            .insert(intent("db", "b", IntentKind::Normal))
            .unwrap();
        manager
            .insert(intent("db", "a", IntentKind::Normal))
            .unwrap();
        manager.finalize_restore();

        assert_eq!(manager.peek().unwrap().namespace().coll(), "a");
        assert_eq!(manager.pop().unwrap().namespace().coll(), "a");
        assert_eq!(manager.pop().unwrap().namespace().coll(), "b");
        assert!(manager.pop().is_none());
    }
}
