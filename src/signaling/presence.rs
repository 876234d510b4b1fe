use std::collections::HashMap;

use crate::signaling::protocol::ParticipantId;
use crate::signaling::types::ClientId;

/// Tracks which connection currently speaks for which participant.
///
/// At most one connection per participant: registering a participant again
/// replaces the previous connection. Both directions are kept so lookups by
/// participant (routing) and by connection (disconnect cleanup) are O(1).
#[derive(Debug, Default)]
pub struct PresenceDirectory {
    participant_to_client: HashMap<ParticipantId, ClientId>,
    client_to_participant: HashMap<ClientId, ParticipantId>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `participant` to `client`.
    ///
    /// Returns:
    /// - Some(previous_client) if another connection was replaced.
    /// - None if the participant was offline or already bound to `client`.
    pub fn register(&mut self, participant: ParticipantId, client: ClientId) -> Option<ClientId> {
        // A connection re-announcing itself under a new id drops its old binding.
        if let Some(prev_id) = self.client_to_participant.get(&client).cloned()
            && prev_id != participant
            && self.participant_to_client.get(&prev_id) == Some(&client)
        {
            self.participant_to_client.remove(&prev_id);
        }

        let replaced = self
            .participant_to_client
            .insert(participant.clone(), client)
            .filter(|old| *old != client);
        if let Some(old) = replaced {
            self.client_to_participant.remove(&old);
        }
        self.client_to_participant.insert(client, participant);
        replaced
    }

    /// Remove the participant's entry; returns the connection it pointed at.
    /// Absent participants are a no-op.
    pub fn deregister(&mut self, participant: &str) -> Option<ClientId> {
        let client = self.participant_to_client.remove(participant)?;
        self.client_to_participant.remove(&client);
        Some(client)
    }

    /// Remove whatever participant `client` currently speaks for.
    ///
    /// A connection that was replaced by a newer one no longer owns an
    /// entry, so its disconnect leaves the newer binding untouched.
    pub fn deregister_client(&mut self, client: ClientId) -> Option<ParticipantId> {
        let participant = self.client_to_participant.remove(&client)?;
        if self.participant_to_client.get(&participant) == Some(&client) {
            self.participant_to_client.remove(&participant);
        }
        Some(participant)
    }

    /// Connection currently bound to `participant`.
    pub fn lookup(&self, participant: &str) -> Option<ClientId> {
        self.participant_to_client.get(participant).copied()
    }

    /// Participant a connection speaks for, if it completed `hello`.
    pub fn participant_for(&self, client: ClientId) -> Option<&ParticipantId> {
        self.client_to_participant.get(&client)
    }

    /// All online participant ids, sorted.
    pub fn online_participants(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> = self.participant_to_client.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All connections bound to a participant, sorted.
    /// This is used to iterate over all clients to broadcast updates.
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.client_to_participant.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.participant_to_client.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participant_to_client.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut p = PresenceDirectory::new();
        assert_eq!(p.register("alice".into(), 1), None);
        assert_eq!(p.lookup("alice"), Some(1));
        assert_eq!(p.participant_for(1).map(String::as_str), Some("alice"));
        assert_eq!(p.lookup("bob"), None);
    }

    #[test]
    fn register_is_idempotent_for_same_connection() {
        let mut p = PresenceDirectory::new();
        p.register("alice".into(), 1);
        assert_eq!(p.register("alice".into(), 1), None);
        assert_eq!(p.len(), 1);
        assert_eq!(p.client_ids(), vec![1]);
    }

    #[test]
    fn new_connection_replaces_prior_entry() {
        let mut p = PresenceDirectory::new();
        p.register("alice".into(), 1);
        assert_eq!(p.register("alice".into(), 2), Some(1));

        assert_eq!(p.lookup("alice"), Some(2));
        assert_eq!(p.participant_for(1), None);
        assert_eq!(p.client_ids(), vec![2]);
    }

    #[test]
    fn disconnect_of_replaced_connection_keeps_new_entry() {
        let mut p = PresenceDirectory::new();
        p.register("alice".into(), 1);
        p.register("alice".into(), 2);

        assert_eq!(p.deregister_client(1), None);
        assert_eq!(p.lookup("alice"), Some(2));

        assert_eq!(p.deregister_client(2).as_deref(), Some("alice"));
        assert!(p.is_empty());
    }

    #[test]
    fn connection_renaming_itself_drops_old_id() {
        let mut p = PresenceDirectory::new();
        p.register("alice".into(), 1);
        p.register("alice2".into(), 1);

        assert_eq!(p.lookup("alice"), None);
        assert_eq!(p.lookup("alice2"), Some(1));
        assert_eq!(p.online_participants(), vec!["alice2".to_string()]);
    }

    #[test]
    fn deregister_absent_is_noop() {
        let mut p = PresenceDirectory::new();
        assert_eq!(p.deregister("ghost"), None);
        assert_eq!(p.deregister_client(42), None);
        assert!(p.is_empty());
    }

    #[test]
    fn online_participants_are_sorted() {
        let mut p = PresenceDirectory::new();
        p.register("carol".into(), 3);
        p.register("alice".into(), 1);
        p.register("bob".into(), 2);
        assert_eq!(
            p.online_participants(),
            vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
        );
    }
}
