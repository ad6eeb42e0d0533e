//! Feed fixtures: scripted change-event sequences with consistent indexes.

use inferadb_issues_types::{
    ChangeEvent, EntityId, EntityKind, FeedMessage, config::DetectorConfig,
};

/// Builds a feed the way the metadata layer would emit it.
///
/// Every scripted change gets the next log index, so tests never have to
/// track indexes by hand.
///
/// ```no_run
/// use inferadb_issues_test_utils::FeedScript;
/// use inferadb_issues_types::EntityKind;
///
/// let mut feed = FeedScript::new();
/// feed.create(EntityKind::Namespace, "users");
/// let b = feed.create(EntityKind::Namespace, "USERS");
/// feed.delete(b);
/// let messages = feed.caught_up().take_messages();
/// ```
#[derive(Debug, Clone, Default)]
pub struct FeedScript {
    messages: Vec<FeedMessage>,
    kinds: Vec<(EntityId, EntityKind)>,
    log_index: u64,
}

impl FeedScript {
    /// Creates an empty script starting at log index 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the creation of a fresh entity and returns its id.
    pub fn create(&mut self, kind: EntityKind, name: &str) -> EntityId {
        let id = EntityId::random();
        self.create_with_id(id, kind, name);
        id
    }

    /// Scripts the creation (or re-creation) of `id`.
    pub fn create_with_id(&mut self, id: EntityId, kind: EntityKind, name: &str) -> &mut Self {
        self.remember(id, kind);
        let log_index = self.next_index();
        self.push(ChangeEvent::created(id, kind, name, log_index))
    }

    /// Scripts a rename of a previously scripted entity.
    pub fn rename(&mut self, id: EntityId, name: &str) -> &mut Self {
        let kind = self.kind_of(id);
        let log_index = self.next_index();
        self.push(ChangeEvent::renamed(id, kind, name, log_index))
    }

    /// Scripts a deletion of a previously scripted entity.
    pub fn delete(&mut self, id: EntityId) -> &mut Self {
        let kind = self.kind_of(id);
        let log_index = self.next_index();
        self.push(ChangeEvent::deleted(id, kind, log_index))
    }

    /// Appends the end-of-replay marker at the current index.
    pub fn caught_up(&mut self) -> &mut Self {
        self.messages.push(FeedMessage::CaughtUp { log_index: self.log_index });
        self
    }

    /// Appends an exact copy of every change scripted so far.
    pub fn redeliver_all(&mut self) -> &mut Self {
        let replay: Vec<FeedMessage> = self
            .messages
            .iter()
            .filter(|message| matches!(message, FeedMessage::Change(_)))
            .cloned()
            .collect();
        self.messages.extend(replay);
        self
    }

    /// Index of the last scripted change.
    pub fn last_index(&self) -> u64 {
        self.log_index
    }

    /// Scripted messages so far, leaving the script in place.
    pub fn messages(&self) -> &[FeedMessage] {
        &self.messages
    }

    /// Takes the scripted messages, leaving the script empty but keeping its
    /// index counter and known entities.
    pub fn take_messages(&mut self) -> Vec<FeedMessage> {
        std::mem::take(&mut self.messages)
    }

    fn next_index(&mut self) -> u64 {
        self.log_index += 1;
        self.log_index
    }

    fn push(&mut self, event: ChangeEvent) -> &mut Self {
        self.messages.push(FeedMessage::Change(event));
        self
    }

    fn remember(&mut self, id: EntityId, kind: EntityKind) {
        if !self.kinds.iter().any(|(known, _)| *known == id) {
            self.kinds.push((id, kind));
        }
    }

    fn kind_of(&self, id: EntityId) -> EntityKind {
        self.kinds
            .iter()
            .find(|(known, _)| *known == id)
            .map(|(_, kind)| *kind)
            .unwrap_or(EntityKind::Namespace)
    }
}

/// Detector configuration for tests: a few workers and small queues, so
/// backpressure paths run too.
pub fn test_detector_config() -> DetectorConfig {
    DetectorConfig { workers: 3, feed_capacity: 8, ..DetectorConfig::default() }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_script_assigns_consecutive_indexes() {
        let mut script = FeedScript::new();
        let a = script.create(EntityKind::Server, "a");
        script.rename(a, "b").delete(a).caught_up();

        let indexes: Vec<u64> = script.messages().iter().map(FeedMessage::log_index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 3]);
        assert_eq!(script.last_index(), 3);
    }

    #[test]
    fn test_script_remembers_kinds() {
        let mut script = FeedScript::new();
        let a = script.create(EntityKind::Datacenter, "east");
        script.delete(a);
        let messages = script.take_messages();
        let FeedMessage::Change(event) = &messages[1] else { panic!("expected a change") };
        assert_eq!(event.kind, EntityKind::Datacenter);
        assert!(script.messages().is_empty());
    }

    #[test]
    fn test_redeliver_all_duplicates_changes_only() {
        let mut script = FeedScript::new();
        script.create(EntityKind::Namespace, "x");
        script.caught_up().redeliver_all();
        assert_eq!(script.messages().len(), 3);
        assert_eq!(script.messages()[2], script.messages()[0]);
    }

    #[test]
    fn test_config_is_valid() {
        test_detector_config().validate().unwrap();
    }
}
