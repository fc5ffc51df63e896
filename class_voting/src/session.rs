use chrono::Utc;
use log::{debug, info, warn};

use crate::model::*;
use crate::store::VotingStore;
use crate::run_tally;

/// Drives one voting session at a time: setup, sequential voting and completion.
///
/// The manager owns its store. All the mutations take `&mut self`, which is
/// what keeps two sessions from being created at the same time.
pub struct SessionManager<S: VotingStore> {
    store: S,
    session: Option<VotingSession>,
    // Voters in roster order. Only meaningful while voting.
    roster: Vec<Parent>,
    cursor: usize,
}

impl<S: VotingStore> SessionManager<S> {
    /// Creates a manager and picks up the active session of the store, if any.
    pub fn new(store: S) -> Result<SessionManager<S>, VotingErrors> {
        let session = store.current_session()?;
        let mut manager = SessionManager {
            store,
            session,
            roster: Vec::new(),
            cursor: 0,
        };
        if let Some(s) = manager.session.clone() {
            info!(
                "Loaded session {} ({}) with status {}",
                s.id,
                s.class_name,
                s.status.code()
            );
            if s.is_voting() {
                manager.load_roster(s.id)?;
            }
        }
        Ok(manager)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// The session handled by this manager. It stays available after completion
    /// until [`SessionManager::clear_session`] is called.
    pub fn session(&self) -> Option<&VotingSession> {
        self.session.as_ref()
    }

    pub fn has_active_session(&self) -> bool {
        self.session.as_ref().map(|s| s.is_active()).unwrap_or(false)
    }

    pub fn create_session(&mut self, class_name: &str) -> Result<&VotingSession, VotingErrors> {
        if self.has_active_session() {
            return Err(VotingErrors::Conflict(
                "cannot create a new session while another is active".to_string(),
            ));
        }
        if let Some(other) = self.store.current_session()? {
            return Err(VotingErrors::Conflict(format!(
                "session {} ({}) is still active",
                other.id, other.class_name
            )));
        }
        let class_name = class_name.trim();
        if class_name.is_empty() {
            return Err(VotingErrors::Validation(
                "class name cannot be empty".to_string(),
            ));
        }
        let session = self.store.create_session(class_name)?;
        info!(
            "Created voting session {} for class {}",
            session.id, session.class_name
        );
        self.roster.clear();
        self.cursor = 0;
        Ok(&*self.session.insert(session))
    }

    pub fn add_parent(&mut self, name: &str) -> Result<Parent, VotingErrors> {
        let sid = self.setup_session()?.id;
        let parent = self.store.insert_parent(&NewParent::new(sid, name)?)?;
        debug!("add_parent: {:?}", parent);
        Ok(parent)
    }

    pub fn remove_parent(&mut self, id: ParentId) -> Result<Parent, VotingErrors> {
        let sid = self.setup_session()?.id;
        let parent = self.session_parent(sid, id)?;
        self.store.delete_parent(id)?;
        info!("Removed parent {} ({})", parent.name, parent.id);
        Ok(parent)
    }

    pub fn set_candidate(&mut self, id: ParentId, is_candidate: bool) -> Result<Parent, VotingErrors> {
        let sid = self.setup_session()?.id;
        let parent = self.session_parent(sid, id)?;
        self.store.mark_as_candidate(id, is_candidate)?;
        debug!("set_candidate: {} -> {}", parent.name, is_candidate);
        Ok(Parent {
            is_candidate,
            ..parent
        })
    }

    pub fn parents(&self) -> Result<Vec<Parent>, VotingErrors> {
        match &self.session {
            Some(s) => self.store.parents_by_session(s.id),
            None => Ok(Vec::new()),
        }
    }

    pub fn candidates(&self) -> Result<Vec<Parent>, VotingErrors> {
        match &self.session {
            Some(s) => self.store.candidates_by_session(s.id),
            None => Ok(Vec::new()),
        }
    }

    /// Moves the session from setup to voting.
    ///
    /// At least two candidates are required. On failure the session stays in setup.
    pub fn start_voting(&mut self) -> Result<(), VotingErrors> {
        let session = match &self.session {
            None => return Err(VotingErrors::InvalidState("no active session".to_string())),
            Some(s) if !s.can_start_voting() => {
                return Err(VotingErrors::InvalidState(format!(
                    "session {} is not in setup (status: {})",
                    s.id,
                    s.status.code()
                )))
            }
            Some(s) => s.clone(),
        };
        let candidates = self.store.candidates_by_session(session.id)?;
        if candidates.len() < 2 {
            return Err(VotingErrors::PreconditionFailed(format!(
                "at least 2 candidates are required to start voting, found {}",
                candidates.len()
            )));
        }
        self.store
            .update_session_status(session.id, SessionStatus::Voting)?;
        self.session = Some(VotingSession {
            status: SessionStatus::Voting,
            ..session
        });
        self.load_roster(session.id)?;
        info!(
            "Started voting for session {} with {} candidates and {} voters",
            session.id,
            candidates.len(),
            self.roster.len()
        );
        Ok(())
    }

    /// The parent whose turn it is, or none when everyone voted or was skipped.
    pub fn current_voter(&self) -> Option<&Parent> {
        match &self.session {
            Some(s) if s.is_voting() => self.roster.get(self.cursor),
            _ => None,
        }
    }

    /// Records the vote of the current voter and moves to the next one.
    ///
    /// Voting for oneself is allowed.
    pub fn record_vote(&mut self, candidate_id: ParentId) -> Result<Vote, VotingErrors> {
        let sid = self.voting_session()?.id;
        let voter = self
            .current_voter()
            .cloned()
            .ok_or_else(|| VotingErrors::InvalidState("no current voter".to_string()))?;
        let candidate = self.session_parent(sid, candidate_id)?;
        if !candidate.is_candidate {
            return Err(VotingErrors::Validation(format!(
                "{} ({}) is not a candidate",
                candidate.name, candidate.id
            )));
        }

        let vote = self.store.record_vote(&NewVote {
            voter_id: voter.id,
            candidate_id,
            session_id: sid,
        })?;
        if vote.is_self_vote() {
            info!("{} voted for themselves", voter.name);
        } else {
            info!("{} voted for {}", voter.name, candidate.name);
        }
        self.advance();
        Ok(vote)
    }

    /// Passes over the current voter without recording a vote.
    pub fn skip(&mut self) -> Result<Parent, VotingErrors> {
        self.voting_session()?;
        let voter = self
            .current_voter()
            .cloned()
            .ok_or_else(|| VotingErrors::InvalidState("no current voter".to_string()))?;
        self.store.mark_as_voted(voter.id)?;
        info!("Skipped voter {} ({})", voter.name, voter.id);
        self.advance();
        Ok(Parent {
            has_voted: true,
            ..voter
        })
    }

    /// Completes the session. Allowed at any point of the voting phase.
    pub fn end_voting(&mut self) -> Result<&VotingSession, VotingErrors> {
        let session = self.voting_session()?.clone();
        if let Some(voter) = self.current_voter() {
            warn!(
                "Ending session {} before all parents voted (next was {})",
                session.id, voter.name
            );
        }
        let status = SessionStatus::Completed {
            completed_at: Utc::now(),
        };
        self.store.update_session_status(session.id, status)?;
        self.roster.clear();
        self.cursor = 0;
        info!("Completed voting session {}", session.id);
        Ok(&*self.session.insert(VotingSession { status, ..session }))
    }

    /// Forgets a completed session, so that a new one can be created.
    pub fn clear_session(&mut self) -> Result<(), VotingErrors> {
        if self.has_active_session() {
            return Err(VotingErrors::InvalidState(
                "the current session is still active".to_string(),
            ));
        }
        self.session = None;
        self.roster.clear();
        self.cursor = 0;
        Ok(())
    }

    pub fn progress(&self) -> Result<VotingProgress, VotingErrors> {
        let parents = self.parents()?;
        let total_parents = parents.len() as u64;
        let voted = parents.iter().filter(|p| p.has_voted).count() as u64;
        Ok(VotingProgress {
            total_parents,
            voted,
            remaining: total_parents - voted,
        })
    }

    /// Tallies the votes of the session handled by the manager.
    pub fn results(&self) -> Result<TallyResult, VotingErrors> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| VotingErrors::InvalidState("no session to tally".to_string()))?;
        tally_session(&self.store, session.id)
    }

    fn advance(&mut self) {
        self.cursor += 1;
        match self.roster.get(self.cursor) {
            Some(next) => debug!("Next voter: {} ({})", next.name, next.id),
            None => info!("No more voters remaining, voting is complete"),
        }
    }

    fn load_roster(&mut self, sid: SessionId) -> Result<(), VotingErrors> {
        let mut roster = self.store.unvoted_parents_by_session(sid)?;
        roster.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        debug!("load_roster: {} remaining voters", roster.len());
        self.roster = roster;
        self.cursor = 0;
        Ok(())
    }

    fn setup_session(&self) -> Result<&VotingSession, VotingErrors> {
        match &self.session {
            Some(s) if s.can_start_voting() => Ok(s),
            Some(s) => Err(VotingErrors::InvalidState(format!(
                "parents can only be changed during setup (status: {})",
                s.status.code()
            ))),
            None => Err(VotingErrors::InvalidState("no active session".to_string())),
        }
    }

    fn voting_session(&self) -> Result<&VotingSession, VotingErrors> {
        match &self.session {
            Some(s) if s.is_voting() => Ok(s),
            Some(s) => Err(VotingErrors::InvalidState(format!(
                "session {} is not voting (status: {})",
                s.id,
                s.status.code()
            ))),
            None => Err(VotingErrors::InvalidState("no active session".to_string())),
        }
    }

    fn session_parent(&self, sid: SessionId, id: ParentId) -> Result<Parent, VotingErrors> {
        match self.store.parent(id)? {
            Some(p) if p.session_id == sid => Ok(p),
            _ => Err(VotingErrors::NotFound(format!(
                "parent {} in session {}",
                id, sid
            ))),
        }
    }
}

/// Tallies any stored session, active or not.
pub fn tally_session<S: VotingStore>(store: &S, id: SessionId) -> Result<TallyResult, VotingErrors> {
    let candidates = store.candidates_by_session(id)?;
    let counts = store.vote_counts_by_session(id)?;
    let total_votes = store.total_votes(id)?;
    let total_parents = store.parents_by_session(id)?.len() as u64;
    Ok(run_tally(&candidates, &counts, total_votes, total_parents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::collections::HashSet;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // Creates a session with the given parents; the flagged ones are candidates.
    fn setup(parents: &[(&str, bool)]) -> (SessionManager<MemoryStore>, Vec<Parent>) {
        init();
        let mut m = SessionManager::new(MemoryStore::new()).unwrap();
        m.create_session("6c").unwrap();
        let mut res = Vec::new();
        for (name, cand) in parents {
            let p = m.add_parent(name).unwrap();
            let p = if *cand {
                m.set_candidate(p.id, true).unwrap()
            } else {
                p
            };
            res.push(p);
        }
        (m, res)
    }

    #[test]
    fn start_requires_two_candidates() {
        let (mut m, _) = setup(&[("Anna", true), ("Bob", false)]);
        let res = m.start_voting();
        assert!(matches!(res, Err(VotingErrors::PreconditionFailed(_))));
        assert_eq!(m.session().unwrap().status, SessionStatus::Setup);
        assert!(m.current_voter().is_none());
    }

    #[test]
    fn start_without_session_is_invalid() {
        init();
        let mut m = SessionManager::new(MemoryStore::new()).unwrap();
        assert!(matches!(
            m.start_voting(),
            Err(VotingErrors::InvalidState(_))
        ));
    }

    #[test]
    fn roster_is_sorted_by_name() {
        let (mut m, _) = setup(&[("Dora", false), ("Bob", true), ("Anna", true), ("Clara", false)]);
        m.start_voting().unwrap();
        let mut seen = Vec::new();
        while let Some(v) = m.current_voter() {
            seen.push(v.name.clone());
            m.skip().unwrap();
        }
        assert_eq!(seen, vec!["Anna", "Bob", "Clara", "Dora"]);
    }

    #[test]
    fn each_parent_is_current_voter_once() {
        let (mut m, ps) = setup(&[("A", true), ("B", true), ("C", false), ("D", false), ("E", false)]);
        m.start_voting().unwrap();
        let mut seen: HashSet<ParentId> = HashSet::new();
        let mut step = 0;
        while let Some(v) = m.current_voter().cloned() {
            assert!(seen.insert(v.id), "{} was current voter twice", v.name);
            let progress = m.progress().unwrap();
            assert!(progress.remaining > 0);
            if step % 2 == 0 {
                m.record_vote(ps[0].id).unwrap();
            } else {
                m.skip().unwrap();
            }
            step += 1;
        }
        assert_eq!(seen.len(), ps.len());
        let progress = m.progress().unwrap();
        assert_eq!(progress.remaining, 0);
        assert_eq!(progress.voted, 5);
        assert!(matches!(m.skip(), Err(VotingErrors::InvalidState(_))));
        assert!(matches!(
            m.record_vote(ps[0].id),
            Err(VotingErrors::InvalidState(_))
        ));
    }

    #[test]
    fn every_vote_skip_pattern_visits_each_parent_once() {
        // Bit i of the mask: the i-th voter votes, otherwise they are skipped.
        for mask in 0u32..16 {
            let (mut m, ps) = setup(&[("A", true), ("B", true), ("C", false), ("D", false)]);
            m.start_voting().unwrap();
            let mut seen: HashSet<ParentId> = HashSet::new();
            let mut step = 0;
            while let Some(v) = m.current_voter().cloned() {
                assert!(step < ps.len(), "mask {:04b}: too many turns", mask);
                assert!(seen.insert(v.id), "mask {:04b}: {} twice", mask, v.name);
                if mask & (1 << step) != 0 {
                    m.record_vote(ps[1].id).unwrap();
                } else {
                    m.skip().unwrap();
                }
                step += 1;
                assert_eq!(m.current_voter().is_none(), step == ps.len());
            }
            assert_eq!(step, ps.len(), "mask {:04b}", mask);
            let progress = m.progress().unwrap();
            assert_eq!(progress.voted, 4);
            assert_eq!(progress.remaining, 0);
            assert_eq!(m.results().unwrap().total_votes, mask.count_ones() as u64);
        }
    }

    #[test]
    fn self_vote_counts() {
        let (mut m, ps) = setup(&[("Anna", true), ("Bob", true)]);
        m.start_voting().unwrap();
        assert_eq!(m.current_voter().unwrap().id, ps[0].id);
        let vote = m.record_vote(ps[0].id).unwrap();
        assert!(vote.is_self_vote());
        let res = m.results().unwrap();
        assert_eq!(res.ranked[0].name, "Anna");
        assert_eq!(res.ranked[0].votes, 1);
    }

    #[test]
    fn vote_for_non_candidate_is_refused() {
        let (mut m, ps) = setup(&[("Anna", true), ("Bob", true), ("Clara", false)]);
        m.start_voting().unwrap();
        let res = m.record_vote(ps[2].id);
        assert!(matches!(res, Err(VotingErrors::Validation(_))));
        let res = m.record_vote(ParentId(4242));
        assert!(matches!(res, Err(VotingErrors::NotFound(_))));
        // Nothing changed: Anna is still up.
        assert_eq!(m.current_voter().unwrap().name, "Anna");
        assert_eq!(m.store().total_votes(m.session().unwrap().id).unwrap(), 0);
    }

    #[test]
    fn example_session_tally() {
        let (mut m, ps) = setup(&[("A", true), ("B", true), ("C", false), ("D", false)]);
        let (a, b) = (ps[0].id, ps[1].id);
        m.start_voting().unwrap();
        m.record_vote(b).unwrap(); // A -> B
        m.record_vote(b).unwrap(); // B -> B
        m.skip().unwrap(); // C
        m.skip().unwrap(); // D
        assert!(m.current_voter().is_none());
        // Completion is a separate action.
        assert!(m.session().unwrap().is_voting());
        m.end_voting().unwrap();

        let res = m.results().unwrap();
        assert_eq!(res.total_votes, 2);
        assert_eq!(res.total_parents, 4);
        assert_eq!(res.turnout, 50.0);
        let winner = res.winner.unwrap();
        assert_eq!(winner.result.candidate_id, b);
        assert_eq!(winner.result.votes, 2);
        assert_eq!(winner.result.percentage, 100.0);
        assert!(!winner.tied);
        let deputy = res.deputy.unwrap();
        assert_eq!(deputy.result.candidate_id, a);
        assert_eq!(deputy.result.votes, 0);
        assert_eq!(deputy.result.percentage, 0.0);
        assert!(!deputy.tied);
    }

    #[test]
    fn end_voting_early_completes() {
        let (mut m, ps) = setup(&[("A", true), ("B", true), ("C", false)]);
        m.start_voting().unwrap();
        m.record_vote(ps[1].id).unwrap();
        let session = m.end_voting().unwrap();
        assert!(session.completed_at().is_some());
        assert!(!session.is_active());
        assert!(m.current_voter().is_none());
        assert!(!m.has_active_session());

        // Completed is terminal.
        assert!(matches!(m.skip(), Err(VotingErrors::InvalidState(_))));
        assert!(matches!(
            m.record_vote(ps[0].id),
            Err(VotingErrors::InvalidState(_))
        ));
        assert!(matches!(m.add_parent("Zoe"), Err(VotingErrors::InvalidState(_))));
        assert!(matches!(
            m.set_candidate(ps[2].id, true),
            Err(VotingErrors::InvalidState(_))
        ));
        assert!(matches!(
            m.remove_parent(ps[2].id),
            Err(VotingErrors::InvalidState(_))
        ));
        assert!(matches!(m.start_voting(), Err(VotingErrors::InvalidState(_))));
        assert!(matches!(m.end_voting(), Err(VotingErrors::InvalidState(_))));
    }

    #[test]
    fn end_voting_requires_voting() {
        let (mut m, _) = setup(&[("A", true), ("B", true)]);
        assert!(matches!(m.end_voting(), Err(VotingErrors::InvalidState(_))));
        assert_eq!(m.session().unwrap().status, SessionStatus::Setup);
    }

    #[test]
    fn second_session_conflicts() {
        let (mut m, _) = setup(&[("A", true)]);
        let before = m.session().unwrap().clone();
        let res = m.create_session("7a");
        assert!(matches!(res, Err(VotingErrors::Conflict(_))));
        assert_eq!(m.session().unwrap(), &before);
        assert_eq!(m.store().sessions().unwrap().len(), 1);
    }

    #[test]
    fn new_session_after_completion() {
        let (mut m, _) = setup(&[("A", true), ("B", true)]);
        m.start_voting().unwrap();
        m.end_voting().unwrap();
        m.create_session("7a").unwrap();
        assert_eq!(m.session().unwrap().class_name, "7a");
        assert_eq!(m.store().sessions().unwrap().len(), 2);
    }

    #[test]
    fn active_session_cannot_be_cleared() {
        let (mut m, _) = setup(&[("A", true)]);
        assert!(matches!(
            m.clear_session(),
            Err(VotingErrors::InvalidState(_))
        ));
    }

    #[test]
    fn restart_resumes_with_same_voter() {
        let (mut m, ps) = setup(&[("A", true), ("B", true), ("C", false)]);
        m.start_voting().unwrap();
        m.record_vote(ps[1].id).unwrap();
        let store = m.into_store();

        let m2 = SessionManager::new(store).unwrap();
        assert!(m2.session().unwrap().is_voting());
        assert_eq!(m2.current_voter().unwrap().name, "B");
        assert_eq!(m2.progress().unwrap().voted, 1);
    }

    #[test]
    fn remove_and_toggle_parents_in_setup() {
        let (mut m, ps) = setup(&[("A", true), ("B", false)]);
        let b = m.set_candidate(ps[1].id, true).unwrap();
        assert!(b.is_candidate);
        assert_eq!(m.candidates().unwrap().len(), 2);
        m.remove_parent(ps[0].id).unwrap();
        assert_eq!(m.parents().unwrap().len(), 1);
        assert!(matches!(
            m.remove_parent(ps[0].id),
            Err(VotingErrors::NotFound(_))
        ));
        assert!(matches!(m.add_parent(" "), Err(VotingErrors::Validation(_))));
    }

    #[test]
    fn empty_class_name_is_refused() {
        init();
        let mut m = SessionManager::new(MemoryStore::new()).unwrap();
        assert!(matches!(
            m.create_session("  "),
            Err(VotingErrors::Validation(_))
        ));
        assert!(m.session().is_none());
    }
}
