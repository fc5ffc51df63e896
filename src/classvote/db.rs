// SQLite implementation of the voting store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Params, Row, TransactionBehavior};
use snafu::prelude::*;

use class_voting::*;

use crate::classvote::*;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS voting_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    class_name TEXT NOT NULL CHECK (length(trim(class_name)) > 0),
    status TEXT NOT NULL CHECK (status IN ('SETUP', 'VOTING', 'COMPLETED')),
    created_at TEXT NOT NULL,
    completed_at TEXT,
    CHECK ((status = 'COMPLETED') = (completed_at IS NOT NULL))
);

CREATE TABLE IF NOT EXISTS parents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    is_candidate INTEGER NOT NULL DEFAULT 0,
    has_voted INTEGER NOT NULL DEFAULT 0,
    session_id INTEGER NOT NULL REFERENCES voting_sessions(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS votes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    voter_id INTEGER NOT NULL REFERENCES parents(id) ON DELETE CASCADE,
    candidate_id INTEGER NOT NULL REFERENCES parents(id) ON DELETE CASCADE,
    session_id INTEGER NOT NULL REFERENCES voting_sessions(id) ON DELETE CASCADE,
    cast_at TEXT NOT NULL,
    UNIQUE (voter_id, session_id)
);

CREATE INDEX IF NOT EXISTS idx_parents_session ON parents(session_id);
CREATE INDEX IF NOT EXISTS idx_votes_session ON votes(session_id);
";

const SESSION_COLUMNS: &str = "id, class_name, status, created_at, completed_at";
const PARENT_COLUMNS: &str = "id, name, is_candidate, has_voted, session_id, created_at";

type SessionRow = (i64, String, String, DateTime<Utc>, Option<DateTime<Utc>>);

fn persistence(e: rusqlite::Error) -> VotingErrors {
    VotingErrors::persistence(e)
}

fn read_session_row(row: &Row) -> rusqlite::Result<SessionRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

// The status check happens outside of rusqlite.
fn to_session(r: SessionRow) -> Result<VotingSession, VotingErrors> {
    let (id, class_name, status, created_at, completed_at) = r;
    let status = SessionStatus::from_code(&status, completed_at)?;
    VotingSession::new(SessionId(id), &class_name, status, created_at)
}

fn read_parent_row(row: &Row) -> rusqlite::Result<Parent> {
    Ok(Parent {
        id: ParentId(row.get(0)?),
        name: row.get(1)?,
        is_candidate: row.get(2)?,
        has_voted: row.get(3)?,
        session_id: SessionId(row.get(4)?),
        created_at: row.get(5)?,
    })
}

fn read_vote_row(row: &Row) -> rusqlite::Result<Vote> {
    Ok(Vote {
        id: VoteId(row.get(0)?),
        voter_id: ParentId(row.get(1)?),
        candidate_id: ParentId(row.get(2)?),
        session_id: SessionId(row.get(3)?),
        cast_at: row.get(4)?,
    })
}

fn completed_at_of(status: &SessionStatus) -> Option<DateTime<Utc>> {
    match status {
        SessionStatus::Completed { completed_at } => Some(*completed_at),
        _ => None,
    }
}

/// Sessions, parents and votes in an SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> CliResult<SqliteStore> {
        let conn = Connection::open(path).context(OpeningDatabaseSnafu { path })?;
        SqliteStore::init(conn)
    }

    fn init(conn: Connection) -> CliResult<SqliteStore> {
        conn.execute_batch(SCHEMA).context(SchemaSnafu {})?;
        debug!("SqliteStore::init: schema ready");
        Ok(SqliteStore { conn })
    }

    /// Deletes all the sessions, parents and votes.
    pub fn reset(&mut self) -> Result<(), VotingErrors> {
        let tx = self.conn.transaction().map_err(persistence)?;
        tx.execute_batch(
            "DELETE FROM votes; DELETE FROM parents; DELETE FROM voting_sessions;",
        )
        .map_err(persistence)?;
        tx.commit().map_err(persistence)?;
        info!("Database reset");
        Ok(())
    }

    fn query_sessions<P: Params>(
        &self,
        clause: &str,
        params: P,
    ) -> Result<Vec<VotingSession>, VotingErrors> {
        let sql = format!("SELECT {} FROM voting_sessions {}", SESSION_COLUMNS, clause);
        let mut stmt = self.conn.prepare(&sql).map_err(persistence)?;
        let rows = stmt
            .query_map(params, read_session_row)
            .map_err(persistence)?
            .collect::<rusqlite::Result<Vec<SessionRow>>>()
            .map_err(persistence)?;
        rows.into_iter().map(to_session).collect()
    }

    fn query_parents(&self, clause: &str, id: SessionId) -> Result<Vec<Parent>, VotingErrors> {
        let sql = format!(
            "SELECT {} FROM parents WHERE session_id = ?1 {} ORDER BY name, id",
            PARENT_COLUMNS, clause
        );
        let mut stmt = self.conn.prepare(&sql).map_err(persistence)?;
        let res = stmt
            .query_map(params![id.0], read_parent_row)
            .map_err(persistence)?
            .collect::<rusqlite::Result<Vec<Parent>>>()
            .map_err(persistence);
        res
    }

    fn check_updated(changed: usize, what: String) -> Result<(), VotingErrors> {
        if changed == 0 {
            Err(VotingErrors::NotFound(what))
        } else {
            Ok(())
        }
    }
}

impl VotingStore for SqliteStore {
    fn create_session(&mut self, class_name: &str) -> Result<VotingSession, VotingErrors> {
        let session = VotingSession::new(SessionId(0), class_name, SessionStatus::Setup, Utc::now())?;
        // Immediate: the active session check and the insert cannot interleave
        // with another writer.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(persistence)?;
        let active: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, class_name FROM voting_sessions WHERE status != 'COMPLETED' LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(persistence)?;
        if let Some((id, name)) = active {
            return Err(VotingErrors::Conflict(format!(
                "session {} ({}) is still active",
                id, name
            )));
        }
        tx.execute(
            "INSERT INTO voting_sessions (class_name, status, created_at) VALUES (?1, ?2, ?3)",
            params![session.class_name, session.status.code(), session.created_at],
        )
        .map_err(persistence)?;
        let id = SessionId(tx.last_insert_rowid());
        tx.commit().map_err(persistence)?;
        debug!("create_session: {} {}", id, session.class_name);
        Ok(VotingSession { id, ..session })
    }

    fn update_session_status(
        &mut self,
        id: SessionId,
        status: SessionStatus,
    ) -> Result<(), VotingErrors> {
        let changed = self
            .conn
            .execute(
                "UPDATE voting_sessions SET status = ?1, completed_at = ?2 WHERE id = ?3",
                params![status.code(), completed_at_of(&status), id.0],
            )
            .map_err(persistence)?;
        SqliteStore::check_updated(changed, format!("session {}", id))
    }

    fn current_session(&self) -> Result<Option<VotingSession>, VotingErrors> {
        let mut sessions = self.query_sessions(
            "WHERE status != 'COMPLETED' ORDER BY created_at DESC, id DESC LIMIT 1",
            [],
        )?;
        Ok(sessions.pop())
    }

    fn session(&self, id: SessionId) -> Result<Option<VotingSession>, VotingErrors> {
        let mut sessions = self.query_sessions("WHERE id = ?1", params![id.0])?;
        Ok(sessions.pop())
    }

    fn sessions(&self) -> Result<Vec<VotingSession>, VotingErrors> {
        self.query_sessions("ORDER BY created_at DESC, id DESC", [])
    }

    fn delete_session(&mut self, id: SessionId) -> Result<(), VotingErrors> {
        self.conn
            .execute("DELETE FROM voting_sessions WHERE id = ?1", params![id.0])
            .map_err(persistence)?;
        info!("Deleted session {}", id);
        Ok(())
    }

    fn insert_parent(&mut self, parent: &NewParent) -> Result<Parent, VotingErrors> {
        if self.session(parent.session_id)?.is_none() {
            return Err(VotingErrors::NotFound(format!(
                "session {}",
                parent.session_id
            )));
        }
        let created_at = Utc::now();
        self.conn
            .execute(
                "INSERT INTO parents (name, is_candidate, has_voted, session_id, created_at)
                 VALUES (?1, ?2, 0, ?3, ?4)",
                params![parent.name, parent.is_candidate, parent.session_id.0, created_at],
            )
            .map_err(persistence)?;
        Ok(Parent {
            id: ParentId(self.conn.last_insert_rowid()),
            name: parent.name.clone(),
            is_candidate: parent.is_candidate,
            has_voted: false,
            session_id: parent.session_id,
            created_at,
        })
    }

    fn mark_as_candidate(
        &mut self,
        id: ParentId,
        is_candidate: bool,
    ) -> Result<(), VotingErrors> {
        let changed = self
            .conn
            .execute(
                "UPDATE parents SET is_candidate = ?1 WHERE id = ?2",
                params![is_candidate, id.0],
            )
            .map_err(persistence)?;
        SqliteStore::check_updated(changed, format!("parent {}", id))
    }

    fn mark_as_voted(&mut self, id: ParentId) -> Result<(), VotingErrors> {
        let changed = self
            .conn
            .execute("UPDATE parents SET has_voted = 1 WHERE id = ?1", params![id.0])
            .map_err(persistence)?;
        SqliteStore::check_updated(changed, format!("parent {}", id))
    }

    fn delete_parent(&mut self, id: ParentId) -> Result<(), VotingErrors> {
        self.conn
            .execute("DELETE FROM parents WHERE id = ?1", params![id.0])
            .map_err(persistence)?;
        Ok(())
    }

    fn parent(&self, id: ParentId) -> Result<Option<Parent>, VotingErrors> {
        let sql = format!("SELECT {} FROM parents WHERE id = ?1", PARENT_COLUMNS);
        self.conn
            .query_row(&sql, params![id.0], read_parent_row)
            .optional()
            .map_err(persistence)
    }

    fn parents_by_session(&self, id: SessionId) -> Result<Vec<Parent>, VotingErrors> {
        self.query_parents("", id)
    }

    fn candidates_by_session(&self, id: SessionId) -> Result<Vec<Parent>, VotingErrors> {
        self.query_parents("AND is_candidate = 1", id)
    }

    fn unvoted_parents_by_session(&self, id: SessionId) -> Result<Vec<Parent>, VotingErrors> {
        self.query_parents("AND has_voted = 0", id)
    }

    fn record_vote(&mut self, vote: &NewVote) -> Result<Vote, VotingErrors> {
        let tx = self.conn.transaction().map_err(persistence)?;
        for pid in [vote.voter_id, vote.candidate_id] {
            let session_id: Option<i64> = tx
                .query_row(
                    "SELECT session_id FROM parents WHERE id = ?1",
                    params![pid.0],
                    |row| row.get(0),
                )
                .optional()
                .map_err(persistence)?;
            match session_id {
                Some(sid) if sid == vote.session_id.0 => {}
                Some(_) => {
                    return Err(VotingErrors::Validation(format!(
                        "parent {} does not belong to session {}",
                        pid, vote.session_id
                    )))
                }
                None => return Err(VotingErrors::NotFound(format!("parent {}", pid))),
            }
        }
        let previous: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM votes WHERE voter_id = ?1 AND session_id = ?2",
                params![vote.voter_id.0, vote.session_id.0],
                |row| row.get(0),
            )
            .map_err(persistence)?;
        if previous > 0 {
            return Err(VotingErrors::InvalidState(format!(
                "parent {} already voted in session {}",
                vote.voter_id, vote.session_id
            )));
        }

        let cast_at = Utc::now();
        tx.execute(
            "INSERT INTO votes (voter_id, candidate_id, session_id, cast_at) VALUES (?1, ?2, ?3, ?4)",
            params![vote.voter_id.0, vote.candidate_id.0, vote.session_id.0, cast_at],
        )
        .map_err(persistence)?;
        let id = VoteId(tx.last_insert_rowid());
        tx.execute(
            "UPDATE parents SET has_voted = 1 WHERE id = ?1",
            params![vote.voter_id.0],
        )
        .map_err(persistence)?;
        // Dropping the transaction without commit rolls everything back.
        tx.commit().map_err(persistence)?;

        let stored = Vote {
            id,
            voter_id: vote.voter_id,
            candidate_id: vote.candidate_id,
            session_id: vote.session_id,
            cast_at,
        };
        debug!("SqliteStore::record_vote: {:?}", stored);
        Ok(stored)
    }

    fn votes_by_session(&self, id: SessionId) -> Result<Vec<Vote>, VotingErrors> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, voter_id, candidate_id, session_id, cast_at FROM votes
                 WHERE session_id = ?1 ORDER BY cast_at, id",
            )
            .map_err(persistence)?;
        let res = stmt
            .query_map(params![id.0], read_vote_row)
            .map_err(persistence)?
            .collect::<rusqlite::Result<Vec<Vote>>>()
            .map_err(persistence);
        res
    }

    fn vote_counts_by_session(
        &self,
        id: SessionId,
    ) -> Result<HashMap<ParentId, u64>, VotingErrors> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT candidate_id, COUNT(*) FROM votes WHERE session_id = ?1 GROUP BY candidate_id",
            )
            .map_err(persistence)?;
        let rows = stmt
            .query_map(params![id.0], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(persistence)?
            .collect::<rusqlite::Result<Vec<(i64, i64)>>>()
            .map_err(persistence)?;
        Ok(rows
            .into_iter()
            .map(|(cid, count)| (ParentId(cid), count as u64))
            .collect())
    }

    fn total_votes(&self, id: SessionId) -> Result<u64, VotingErrors> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM votes WHERE session_id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .map_err(persistence)?;
        Ok(count as u64)
    }
}
