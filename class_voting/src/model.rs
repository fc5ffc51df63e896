use std::error::Error;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

// ********* Identifiers ***********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct SessionId(pub i64);

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct ParentId(pub i64);

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct VoteId(pub i64);

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ParentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ********* Sessions ***********

/// The lifecycle of a voting session.
///
/// The completion time only exists in the `Completed` state, so a completed
/// session without a completion time cannot be represented.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SessionStatus {
    Setup,
    Voting,
    Completed { completed_at: DateTime<Utc> },
}

impl SessionStatus {
    /// The name used when the status is stored.
    pub fn code(&self) -> &'static str {
        match self {
            SessionStatus::Setup => "SETUP",
            SessionStatus::Voting => "VOTING",
            SessionStatus::Completed { .. } => "COMPLETED",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SessionStatus::Setup => "Setup Phase",
            SessionStatus::Voting => "Voting in Progress",
            SessionStatus::Completed { .. } => "Voting Completed",
        }
    }

    /// Rebuilds a status from its stored name and the optional completion time.
    pub fn from_code(
        code: &str,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<SessionStatus, VotingErrors> {
        match (code, completed_at) {
            ("SETUP", None) => Ok(SessionStatus::Setup),
            ("VOTING", None) => Ok(SessionStatus::Voting),
            ("COMPLETED", Some(completed_at)) => Ok(SessionStatus::Completed { completed_at }),
            ("COMPLETED", None) => Err(VotingErrors::Validation(
                "completed session must have a completion time".to_string(),
            )),
            (c, Some(_)) if c == "SETUP" || c == "VOTING" => Err(VotingErrors::Validation(
                format!("session in status {} cannot have a completion time", c),
            )),
            (c, _) => Err(VotingErrors::Validation(format!(
                "unknown session status {:?}",
                c
            ))),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VotingSession {
    pub id: SessionId,
    pub class_name: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

impl VotingSession {
    pub fn new(
        id: SessionId,
        class_name: &str,
        status: SessionStatus,
        created_at: DateTime<Utc>,
    ) -> Result<VotingSession, VotingErrors> {
        Ok(VotingSession {
            id,
            class_name: validate_name("class name", class_name)?,
            status,
            created_at,
        })
    }

    /// Any session that is not completed.
    pub fn is_active(&self) -> bool {
        !matches!(self.status, SessionStatus::Completed { .. })
    }

    pub fn can_start_voting(&self) -> bool {
        self.status == SessionStatus::Setup
    }

    pub fn is_voting(&self) -> bool {
        self.status == SessionStatus::Voting
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SessionStatus::Completed { completed_at } => Some(completed_at),
            _ => None,
        }
    }
}

// ********* Parents ***********

/// A registered voter in a class, possibly also a candidate.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Parent {
    pub id: ParentId,
    pub name: String,
    pub is_candidate: bool,
    pub has_voted: bool,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
}

/// A parent that has not been stored yet.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NewParent {
    pub session_id: SessionId,
    pub name: String,
    pub is_candidate: bool,
}

impl NewParent {
    pub fn new(session_id: SessionId, name: &str) -> Result<NewParent, VotingErrors> {
        Ok(NewParent {
            session_id,
            name: validate_name("parent name", name)?,
            is_candidate: false,
        })
    }

    pub fn candidate(self) -> NewParent {
        NewParent {
            is_candidate: true,
            ..self
        }
    }
}

// ********* Votes ***********

/// A vote that has not been stored yet.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct NewVote {
    pub voter_id: ParentId,
    pub candidate_id: ParentId,
    pub session_id: SessionId,
}

/// A recorded vote.
///
/// Two votes are the same if they have the same voter, candidate and session.
/// The storage id and the timestamp do not matter.
#[derive(Debug, Clone)]
pub struct Vote {
    pub id: VoteId,
    pub voter_id: ParentId,
    pub candidate_id: ParentId,
    pub session_id: SessionId,
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    pub fn key(&self) -> NewVote {
        NewVote {
            voter_id: self.voter_id,
            candidate_id: self.candidate_id,
            session_id: self.session_id,
        }
    }

    pub fn is_self_vote(&self) -> bool {
        self.voter_id == self.candidate_id
    }
}

impl PartialEq for Vote {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Vote {}

impl Hash for Vote {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

// ******** Output data structures *********

/// Counters describing how far a voting round has progressed.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct VotingProgress {
    pub total_parents: u64,
    /// Parents who voted or were skipped.
    pub voted: u64,
    pub remaining: u64,
}

impl VotingProgress {
    /// 1-based position of the current voter, if any is left.
    pub fn current_position(&self) -> Option<u64> {
        if self.remaining > 0 {
            Some(self.voted + 1)
        } else {
            None
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct CandidateResult {
    pub candidate_id: ParentId,
    pub name: String,
    pub votes: u64,
    /// Share of all votes cast, rounded to one decimal.
    pub percentage: f64,
}

/// A winning position (winner or deputy) in the ranking.
#[derive(PartialEq, Debug, Clone)]
pub struct Placement {
    pub result: CandidateResult,
    /// The next rank has the same number of votes. No tiebreak is applied.
    pub tied: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TallyResult {
    pub ranked: Vec<CandidateResult>,
    pub winner: Option<Placement>,
    pub deputy: Option<Placement>,
    pub total_votes: u64,
    pub total_parents: u64,
    /// Votes cast over registered parents, rounded to one decimal.
    pub turnout: f64,
}

// ******** Errors *********

/// Errors returned by the session manager, the tally and the stores.
///
/// None of them is retried: every failed operation leaves the previous state untouched.
#[derive(Debug)]
pub enum VotingErrors {
    /// Empty name or missing required field.
    Validation(String),
    /// Not enough candidates to start voting.
    PreconditionFailed(String),
    /// The action is not allowed in the current lifecycle phase.
    InvalidState(String),
    /// A second active session was requested.
    Conflict(String),
    NotFound(String),
    /// Failure of the underlying storage.
    Persistence(Box<dyn Error + Send + Sync>),
}

impl VotingErrors {
    pub fn persistence<E: Error + Send + Sync + 'static>(err: E) -> VotingErrors {
        VotingErrors::Persistence(Box::new(err))
    }
}

impl Error for VotingErrors {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            VotingErrors::Persistence(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl Display for VotingErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VotingErrors::Validation(msg) => write!(f, "validation error: {}", msg),
            VotingErrors::PreconditionFailed(msg) => write!(f, "precondition failed: {}", msg),
            VotingErrors::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            VotingErrors::Conflict(msg) => write!(f, "conflict: {}", msg),
            VotingErrors::NotFound(msg) => write!(f, "not found: {}", msg),
            VotingErrors::Persistence(e) => write!(f, "persistence error: {}", e),
        }
    }
}

fn validate_name(what: &str, name: &str) -> Result<String, VotingErrors> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(VotingErrors::Validation(format!("{} cannot be empty", what)))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn parent_name_is_trimmed_and_required() {
        let p = NewParent::new(SessionId(1), "  Anna Weber ").unwrap();
        assert_eq!(p.name, "Anna Weber");
        assert!(!p.is_candidate);
        assert!(matches!(
            NewParent::new(SessionId(1), "   "),
            Err(VotingErrors::Validation(_))
        ));
    }

    #[test]
    fn session_requires_class_name() {
        let res = VotingSession::new(SessionId(1), "", SessionStatus::Setup, at(0));
        assert!(matches!(res, Err(VotingErrors::Validation(_))));
    }

    #[test]
    fn completed_status_needs_completion_time() {
        assert!(matches!(
            SessionStatus::from_code("COMPLETED", None),
            Err(VotingErrors::Validation(_))
        ));
        assert!(matches!(
            SessionStatus::from_code("VOTING", Some(at(5))),
            Err(VotingErrors::Validation(_))
        ));
        let s = SessionStatus::from_code("COMPLETED", Some(at(5))).unwrap();
        assert_eq!(s.code(), "COMPLETED");
        let session = VotingSession::new(SessionId(2), "6c", s, at(0)).unwrap();
        assert!(!session.is_active());
        assert_eq!(session.completed_at(), Some(at(5)));
    }

    #[test]
    fn lifecycle_predicates() {
        let setup = VotingSession::new(SessionId(1), "6c", SessionStatus::Setup, at(0)).unwrap();
        assert!(setup.can_start_voting());
        assert!(setup.is_active());
        assert!(!setup.is_voting());

        let voting = VotingSession {
            status: SessionStatus::Voting,
            ..setup
        };
        assert!(!voting.can_start_voting());
        assert!(voting.is_voting());
        assert!(voting.is_active());
    }

    #[test]
    fn vote_equality_ignores_id_and_time() {
        let v1 = Vote {
            id: VoteId(1),
            voter_id: ParentId(10),
            candidate_id: ParentId(20),
            session_id: SessionId(1),
            cast_at: at(0),
        };
        let v2 = Vote {
            id: VoteId(2),
            cast_at: at(100),
            ..v1.clone()
        };
        let v3 = Vote {
            candidate_id: ParentId(10),
            ..v1.clone()
        };
        assert_eq!(v1, v2);
        assert_ne!(v1, v3);
        assert!(v3.is_self_vote());
        let set: HashSet<Vote> = vec![v1, v2, v3].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn progress_position() {
        let p = VotingProgress {
            total_parents: 4,
            voted: 1,
            remaining: 3,
        };
        assert_eq!(p.current_position(), Some(2));
        let done = VotingProgress {
            total_parents: 4,
            voted: 4,
            remaining: 0,
        };
        assert_eq!(done.current_position(), None);
    }
}
