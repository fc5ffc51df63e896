use std::collections::HashMap;

use crate::model::*;

/// Storage for sessions, parents and votes.
///
/// Implementations must surface storage failures as [`VotingErrors::Persistence`]
/// and report unknown ids as [`VotingErrors::NotFound`].
pub trait VotingStore {
    /// Creates a session in the `Setup` state.
    fn create_session(&mut self, class_name: &str) -> Result<VotingSession, VotingErrors>;

    fn update_session_status(
        &mut self,
        id: SessionId,
        status: SessionStatus,
    ) -> Result<(), VotingErrors>;

    /// The most recently created session that is not completed.
    fn current_session(&self) -> Result<Option<VotingSession>, VotingErrors>;

    fn session(&self, id: SessionId) -> Result<Option<VotingSession>, VotingErrors>;

    /// All the sessions, newest first.
    fn sessions(&self) -> Result<Vec<VotingSession>, VotingErrors>;

    /// Deletes a session with all its parents and votes.
    fn delete_session(&mut self, id: SessionId) -> Result<(), VotingErrors>;

    fn insert_parent(&mut self, parent: &NewParent) -> Result<Parent, VotingErrors>;

    fn mark_as_candidate(&mut self, id: ParentId, is_candidate: bool)
        -> Result<(), VotingErrors>;

    fn mark_as_voted(&mut self, id: ParentId) -> Result<(), VotingErrors>;

    fn delete_parent(&mut self, id: ParentId) -> Result<(), VotingErrors>;

    fn parent(&self, id: ParentId) -> Result<Option<Parent>, VotingErrors>;

    /// Parents of the session, ordered by name.
    fn parents_by_session(&self, id: SessionId) -> Result<Vec<Parent>, VotingErrors>;

    /// Candidate-flagged parents of the session, ordered by name.
    fn candidates_by_session(&self, id: SessionId) -> Result<Vec<Parent>, VotingErrors>;

    /// Parents of the session that have neither voted nor been skipped, ordered by name.
    fn unvoted_parents_by_session(&self, id: SessionId) -> Result<Vec<Parent>, VotingErrors>;

    /// Stores the vote and marks the voter as voted, as a single atomic step.
    ///
    /// A voter may only have one vote per session.
    fn record_vote(&mut self, vote: &NewVote) -> Result<Vote, VotingErrors>;

    fn votes_by_session(&self, id: SessionId) -> Result<Vec<Vote>, VotingErrors>;

    /// Number of votes received, per candidate id. Candidates without votes are absent.
    fn vote_counts_by_session(
        &self,
        id: SessionId,
    ) -> Result<HashMap<ParentId, u64>, VotingErrors>;

    fn total_votes(&self, id: SessionId) -> Result<u64, VotingErrors>;
}
