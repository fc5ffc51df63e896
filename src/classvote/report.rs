use std::fmt::{self, Write};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use log::info;
use serde_json::json;
use serde_json::Value as JSValue;
use snafu::prelude::*;

use class_voting::*;

use crate::classvote::io_common::simplify_class_name;
use crate::classvote::*;

const HUMAN_DATE: &str = "%B %-d, %Y at %-I:%M %p";

/// `VotingResults_<class>_<timestamp>`, without extension.
pub fn report_file_stem(class_name: &str, at: NaiveDateTime) -> String {
    format!(
        "VotingResults_{}_{}",
        simplify_class_name(class_name),
        at.format("%Y-%m-%d_%H-%M-%S")
    )
}

fn human_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(HUMAN_DATE).to_string()
}

/// The summary of the session, with its identity and timestamps.
pub fn build_report_js(session: &VotingSession, tally: &TallyResult) -> JSValue {
    let mut js = build_summary_js(&session.class_name, tally);
    js["session"] = json!({
        "id": session.id.0,
        "className": session.class_name,
        "status": session.status.code(),
        "createdAt": session.created_at.to_rfc3339(),
        "completedAt": session.completed_at().map(|t| t.to_rfc3339()),
    });
    js
}

fn placement_lines<W: Write>(
    out: &mut W,
    title: &str,
    placement: &Option<Placement>,
) -> fmt::Result {
    if let Some(p) = placement {
        writeln!(out, "{}", title)?;
        writeln!(
            out,
            "  {}{}",
            p.result.name,
            if p.tied { "  (TIE)" } else { "" }
        )?;
        writeln!(out, "  {} votes ({}%)", p.result.votes, p.result.percentage)?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_text_report<W: Write>(
    out: &mut W,
    session: &VotingSession,
    tally: &TallyResult,
    generated_at: DateTime<Local>,
) -> fmt::Result {
    writeln!(out, "Voting Results Report")?;
    writeln!(out, "Class {} - Spokesperson Election", session.class_name)?;
    writeln!(out)?;
    writeln!(out, "Session ID:  {}", session.id)?;
    writeln!(out, "Class:       {}", session.class_name)?;
    writeln!(
        out,
        "Created:     {}",
        human_date(&session.created_at.with_timezone(&Local))
    )?;
    if let Some(done) = session.completed_at() {
        writeln!(out, "Completed:   {}", human_date(&done.with_timezone(&Local)))?;
    }
    writeln!(out)?;

    if tally.ranked.is_empty() {
        writeln!(out, "No candidates")?;
        writeln!(out)?;
    }
    placement_lines(out, "CLASS SPOKESPERSON", &tally.winner)?;
    placement_lines(out, "DEPUTY SPOKESPERSON", &tally.deputy)?;

    writeln!(out, "Complete Results")?;
    writeln!(
        out,
        "  {:>4}  {:<30} {:>6} {:>11}",
        "Rank", "Candidate", "Votes", "Percentage"
    )?;
    for (idx, r) in tally.ranked.iter().enumerate() {
        writeln!(
            out,
            "  {:>4}  {:<30} {:>6} {:>10}%",
            idx + 1,
            r.name,
            r.votes,
            r.percentage
        )?;
    }
    writeln!(out)?;

    writeln!(out, "Voting Statistics")?;
    writeln!(out, "  Total Parents: {}", tally.total_parents)?;
    writeln!(out, "  Votes Cast:    {}", tally.total_votes)?;
    writeln!(out, "  Turnout:       {}%", tally.turnout)?;
    writeln!(out)?;
    writeln!(out, "Generated by classvote on {}", human_date(&generated_at))
}

/// The printable report.
pub fn render_text_report(
    session: &VotingSession,
    tally: &TallyResult,
    generated_at: DateTime<Local>,
) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_text_report(&mut out, session, tally, generated_at);
    out
}

fn write_file(path: &Path, contents: &str) -> CliResult<()> {
    fs::write(path, contents).context(WritingReportSnafu {
        path: path.display().to_string(),
    })
}

/// Writes the JSON summary and the text report in `dir`, which is created if needed.
pub fn write_reports(
    dir: &str,
    session: &VotingSession,
    tally: &TallyResult,
) -> CliResult<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).context(WritingReportSnafu { path: dir })?;
    let now = Local::now();
    let stem = report_file_stem(&session.class_name, now.naive_local());
    let js_path = Path::new(dir).join(format!("{}.json", stem));
    let txt_path = Path::new(dir).join(format!("{}.txt", stem));

    let js = build_report_js(session, tally);
    let pretty_js = serde_json::to_string_pretty(&js).context(ParsingJsonSnafu {})?;
    write_file(&js_path, &pretty_js)?;
    write_file(&txt_path, &render_text_report(session, tally, now))?;
    info!(
        "Exported results of session {} to {}",
        session.id,
        js_path.display()
    );
    Ok((js_path, txt_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn example() -> (VotingSession, TallyResult) {
        let mut store = MemoryStore::new();
        let session = store.create_session("6c").unwrap();
        let a = store
            .insert_parent(&NewParent::new(session.id, "Anna").unwrap().candidate())
            .unwrap();
        let b = store
            .insert_parent(&NewParent::new(session.id, "Bob").unwrap().candidate())
            .unwrap();
        for (voter, candidate) in [(a.id, b.id), (b.id, b.id)] {
            store
                .record_vote(&NewVote {
                    voter_id: voter,
                    candidate_id: candidate,
                    session_id: session.id,
                })
                .unwrap();
        }
        let completed = VotingSession {
            status: SessionStatus::Completed {
                completed_at: Utc::now(),
            },
            ..session
        };
        let tally = tally_session(&store, completed.id).unwrap();
        (completed, tally)
    }

    #[test]
    fn file_name() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap();
        assert_eq!(
            report_file_stem("Klasse 6c", at),
            "VotingResults_Klasse6c_2024-03-05_14-07-09"
        );
    }

    #[test]
    fn text_report_sections() {
        let (session, tally) = example();
        let txt = render_text_report(&session, &tally, Local::now());
        assert!(txt.starts_with("Voting Results Report\nClass 6c - Spokesperson Election\n"));
        assert!(txt.contains("Session ID:  "));
        assert!(txt.contains("Completed:   "));
        assert!(txt.contains("CLASS SPOKESPERSON\n  Bob\n  2 votes (100%)\n"));
        assert!(txt.contains("DEPUTY SPOKESPERSON\n  Anna\n  0 votes (0%)\n"));
        assert!(txt.contains("  Turnout:       100%\n"));
        assert!(!txt.contains("TIE"));
    }

    #[test]
    fn reports_are_written() {
        let (session, tally) = example();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let (js_path, txt_path) = write_reports(out.to_str().unwrap(), &session, &tally).unwrap();
        let name = js_path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("VotingResults_6c_"));
        assert!(name.ends_with(".json"));
        assert!(txt_path.exists());

        let js: JSValue = serde_json::from_str(&fs::read_to_string(&js_path).unwrap()).unwrap();
        assert_eq!(js["session"]["status"], "COMPLETED");
        assert!(js["session"]["completedAt"].is_string());
        assert_eq!(js["winner"]["candidate"], "Bob");
        assert_eq!(js["statistics"]["votesCast"], 2);
    }
}
