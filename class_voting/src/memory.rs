use std::collections::HashMap;

use chrono::Utc;
use log::debug;

use crate::model::*;
use crate::store::VotingStore;

/// A store that keeps everything in memory.
///
/// It is used for dry runs of a whole session and applies the same integrity
/// rules as the SQLite schema: cascading deletes and one vote per voter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Vec<VotingSession>,
    parents: Vec<Parent>,
    votes: Vec<Vote>,
    last_id: i64,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn parent_mut(&mut self, id: ParentId) -> Result<&mut Parent, VotingErrors> {
        self.parents
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| VotingErrors::NotFound(format!("parent {}", id)))
    }

    fn sorted_parents<F>(&self, id: SessionId, pred: F) -> Vec<Parent>
    where
        F: Fn(&Parent) -> bool,
    {
        let mut res: Vec<Parent> = self
            .parents
            .iter()
            .filter(|p| p.session_id == id && pred(p))
            .cloned()
            .collect();
        res.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        res
    }
}

impl VotingStore for MemoryStore {
    fn create_session(&mut self, class_name: &str) -> Result<VotingSession, VotingErrors> {
        let id = SessionId(self.next_id());
        let session = VotingSession::new(id, class_name, SessionStatus::Setup, Utc::now())?;
        self.sessions.push(session.clone());
        Ok(session)
    }

    fn update_session_status(
        &mut self,
        id: SessionId,
        status: SessionStatus,
    ) -> Result<(), VotingErrors> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| VotingErrors::NotFound(format!("session {}", id)))?;
        session.status = status;
        Ok(())
    }

    fn current_session(&self) -> Result<Option<VotingSession>, VotingErrors> {
        Ok(self.sessions.iter().rev().find(|s| s.is_active()).cloned())
    }

    fn session(&self, id: SessionId) -> Result<Option<VotingSession>, VotingErrors> {
        Ok(self.sessions.iter().find(|s| s.id == id).cloned())
    }

    fn sessions(&self) -> Result<Vec<VotingSession>, VotingErrors> {
        Ok(self.sessions.iter().rev().cloned().collect())
    }

    fn delete_session(&mut self, id: SessionId) -> Result<(), VotingErrors> {
        self.sessions.retain(|s| s.id != id);
        self.parents.retain(|p| p.session_id != id);
        self.votes.retain(|v| v.session_id != id);
        Ok(())
    }

    fn insert_parent(&mut self, parent: &NewParent) -> Result<Parent, VotingErrors> {
        if !self.sessions.iter().any(|s| s.id == parent.session_id) {
            return Err(VotingErrors::NotFound(format!(
                "session {}",
                parent.session_id
            )));
        }
        let stored = Parent {
            id: ParentId(self.next_id()),
            name: parent.name.clone(),
            is_candidate: parent.is_candidate,
            has_voted: false,
            session_id: parent.session_id,
            created_at: Utc::now(),
        };
        self.parents.push(stored.clone());
        Ok(stored)
    }

    fn mark_as_candidate(
        &mut self,
        id: ParentId,
        is_candidate: bool,
    ) -> Result<(), VotingErrors> {
        self.parent_mut(id)?.is_candidate = is_candidate;
        Ok(())
    }

    fn mark_as_voted(&mut self, id: ParentId) -> Result<(), VotingErrors> {
        self.parent_mut(id)?.has_voted = true;
        Ok(())
    }

    fn delete_parent(&mut self, id: ParentId) -> Result<(), VotingErrors> {
        self.parents.retain(|p| p.id != id);
        self.votes
            .retain(|v| v.voter_id != id && v.candidate_id != id);
        Ok(())
    }

    fn parent(&self, id: ParentId) -> Result<Option<Parent>, VotingErrors> {
        Ok(self.parents.iter().find(|p| p.id == id).cloned())
    }

    fn parents_by_session(&self, id: SessionId) -> Result<Vec<Parent>, VotingErrors> {
        Ok(self.sorted_parents(id, |_| true))
    }

    fn candidates_by_session(&self, id: SessionId) -> Result<Vec<Parent>, VotingErrors> {
        Ok(self.sorted_parents(id, |p| p.is_candidate))
    }

    fn unvoted_parents_by_session(&self, id: SessionId) -> Result<Vec<Parent>, VotingErrors> {
        Ok(self.sorted_parents(id, |p| !p.has_voted))
    }

    fn record_vote(&mut self, vote: &NewVote) -> Result<Vote, VotingErrors> {
        // All the checks happen before any change.
        for pid in [vote.voter_id, vote.candidate_id] {
            match self.parents.iter().find(|p| p.id == pid) {
                Some(p) if p.session_id == vote.session_id => {}
                Some(_) => {
                    return Err(VotingErrors::Validation(format!(
                        "parent {} does not belong to session {}",
                        pid, vote.session_id
                    )))
                }
                None => return Err(VotingErrors::NotFound(format!("parent {}", pid))),
            }
        }
        if self
            .votes
            .iter()
            .any(|v| v.voter_id == vote.voter_id && v.session_id == vote.session_id)
        {
            return Err(VotingErrors::InvalidState(format!(
                "parent {} already voted in session {}",
                vote.voter_id, vote.session_id
            )));
        }

        let stored = Vote {
            id: VoteId(self.next_id()),
            voter_id: vote.voter_id,
            candidate_id: vote.candidate_id,
            session_id: vote.session_id,
            cast_at: Utc::now(),
        };
        self.parent_mut(vote.voter_id)?.has_voted = true;
        self.votes.push(stored.clone());
        debug!("MemoryStore::record_vote: {:?}", stored);
        Ok(stored)
    }

    fn votes_by_session(&self, id: SessionId) -> Result<Vec<Vote>, VotingErrors> {
        Ok(self
            .votes
            .iter()
            .filter(|v| v.session_id == id)
            .cloned()
            .collect())
    }

    fn vote_counts_by_session(
        &self,
        id: SessionId,
    ) -> Result<HashMap<ParentId, u64>, VotingErrors> {
        let mut counts: HashMap<ParentId, u64> = HashMap::new();
        for v in self.votes.iter().filter(|v| v.session_id == id) {
            *counts.entry(v.candidate_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn total_votes(&self, id: SessionId) -> Result<u64, VotingErrors> {
        Ok(self.votes.iter().filter(|v| v.session_id == id).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_parents(names: &[&str]) -> (MemoryStore, SessionId, Vec<Parent>) {
        let mut store = MemoryStore::new();
        let s = store.create_session("6c").unwrap();
        let parents = names
            .iter()
            .map(|n| {
                store
                    .insert_parent(&NewParent::new(s.id, n).unwrap())
                    .unwrap()
            })
            .collect();
        (store, s.id, parents)
    }

    #[test]
    fn parents_are_sorted_by_name() {
        let (store, sid, _) = store_with_parents(&["Clara", "Anna", "Bob"]);
        let names: Vec<String> = store
            .parents_by_session(sid)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Anna", "Bob", "Clara"]);
    }

    #[test]
    fn second_vote_of_same_voter_is_refused() {
        let (mut store, sid, ps) = store_with_parents(&["Anna", "Bob"]);
        let vote = NewVote {
            voter_id: ps[0].id,
            candidate_id: ps[1].id,
            session_id: sid,
        };
        store.record_vote(&vote).unwrap();
        let again = NewVote {
            candidate_id: ps[0].id,
            ..vote
        };
        assert!(matches!(
            store.record_vote(&again),
            Err(VotingErrors::InvalidState(_))
        ));
        assert_eq!(store.total_votes(sid).unwrap(), 1);
        assert!(store.parent(ps[0].id).unwrap().unwrap().has_voted);
    }

    #[test]
    fn delete_session_cascades() {
        let (mut store, sid, ps) = store_with_parents(&["Anna", "Bob"]);
        store
            .record_vote(&NewVote {
                voter_id: ps[0].id,
                candidate_id: ps[1].id,
                session_id: sid,
            })
            .unwrap();
        store.delete_session(sid).unwrap();
        assert!(store.session(sid).unwrap().is_none());
        assert!(store.parents_by_session(sid).unwrap().is_empty());
        assert_eq!(store.total_votes(sid).unwrap(), 0);
    }

    #[test]
    fn unknown_parent_is_not_found() {
        let (mut store, _, _) = store_with_parents(&["Anna"]);
        assert!(matches!(
            store.mark_as_voted(ParentId(999)),
            Err(VotingErrors::NotFound(_))
        ));
    }
}
