use log::{debug, info, warn};

use class_voting::*;
use snafu::{prelude::*, Snafu};

use std::collections::HashMap;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::{Args, Command};
use crate::classvote::config_reader::*;
use crate::classvote::db::SqliteStore;

pub mod config_reader;
pub mod db;
mod io_common;
mod io_csv;
mod io_excel;
pub mod report;

const DEFAULT_DATABASE: &str = "school_voting.db";

const SAMPLE_CLASS: &str = "6c";
const SAMPLE_CANDIDATES: usize = 5;
const SAMPLE_PARENTS: [&str; 15] = [
    "Anna Weber",
    "Marcus Müller",
    "Sophie Schmidt",
    "David Fischer",
    "Julia Becker",
    "Thomas Meyer",
    "Sarah Wagner",
    "Michael Koch",
    "Laura Schulz",
    "Alexander Richter",
    "Emma Hoffmann",
    "Maximilian Klein",
    "Lisa Zimmermann",
    "Sebastian Wolf",
    "Marie Hartmann",
];

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Error opening database {path}: {source}"))]
    OpeningDatabase {
        source: rusqlite::Error,
        path: String,
    },
    #[snafu(display("Error creating the database tables: {source}"))]
    Schema { source: rusqlite::Error },
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing report {path}: {source}"))]
    WritingReport {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The Excel file has no worksheet to read"))]
    EmptyExcel {},
    #[snafu(display("Unexpected cell at line {lineno}: {content}"))]
    ExcelWrongCellType { lineno: u64, content: String },
    #[snafu(display("Error opening CSV file {path}: {source}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading CSV line {lineno}: {source}"))]
    CsvLineParse { source: csv::Error, lineno: usize },

    #[snafu(context(false), display("{source}"))]
    Voting { source: VotingErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, CliError>;

/// The options after merging the command line and the configuration file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Settings {
    pub database_path: String,
    pub output_directory: Option<String>,
    pub sample_parents: Vec<String>,
}

/// Command line flags take precedence over the configuration file.
pub fn resolve_settings(args: &Args, config: Option<AppConfig>) -> Settings {
    let config = config.unwrap_or_default();
    let output_directory = match &args.command {
        Command::Results { out: Some(out), .. } => Some(out.clone()),
        _ => config.output_directory,
    };
    Settings {
        database_path: args
            .db
            .clone()
            .or(config.database_path)
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
        output_directory,
        sample_parents: config
            .sample_parents
            .unwrap_or_else(|| SAMPLE_PARENTS.iter().map(|s| s.to_string()).collect()),
    }
}

pub fn run(args: &Args) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => Some(read_config(path)?),
        None => None,
    };
    let settings = resolve_settings(args, config);
    debug!("run: settings: {:?}", settings);

    // Dry runs never touch the database.
    if let Command::Simulate { script, reference } = &args.command {
        let summary = simulate(script, reference.as_deref())?;
        println!("{}", summary);
        return Ok(());
    }

    info!("Using database {}", settings.database_path);
    let store = SqliteStore::open(&settings.database_path)?;
    let mut manager = SessionManager::new(store)?;

    match &args.command {
        Command::CreateSession { class_name } => {
            let session = manager.create_session(class_name)?;
            println!(
                "Created session {} for class {}",
                session.id, session.class_name
            );
        }
        Command::AddParent { name, candidate } => {
            let mut parent = manager.add_parent(name)?;
            if *candidate {
                parent = manager.set_candidate(parent.id, true)?;
            }
            println!("Added {}", describe_parent(&parent));
        }
        Command::ImportParents {
            path,
            input_type,
            header,
            excel_worksheet_name,
        } => {
            let names = io_common::read_names(
                path,
                input_type.as_deref(),
                *header,
                excel_worksheet_name.as_deref(),
            )?;
            if names.is_empty() {
                warn!("No parent names found in {}", path);
            }
            for name in names.iter() {
                manager.add_parent(name)?;
            }
            println!("Imported {} parents from {}", names.len(), path);
        }
        Command::RemoveParent { parent_id } => {
            let parent = manager.remove_parent(ParentId(*parent_id))?;
            println!("Removed {}", describe_parent(&parent));
        }
        Command::Candidate { parent_id, unset } => {
            let parent = manager.set_candidate(ParentId(*parent_id), !*unset)?;
            println!("Updated {}", describe_parent(&parent));
        }
        Command::Parents => {
            for parent in manager.parents()? {
                println!("{}", describe_parent(&parent));
            }
        }
        Command::Start => {
            manager.start_voting()?;
            println!("Voting started");
            print_turn(&manager)?;
        }
        Command::Status => print_status(&manager)?,
        Command::Vote { candidate_id } => {
            println!("{}", cast_vote(&mut manager, ParentId(*candidate_id))?);
            print_turn(&manager)?;
        }
        Command::Skip => {
            let parent = manager.skip()?;
            println!("Skipped {}", parent.name);
            print_turn(&manager)?;
        }
        Command::End => {
            let session = manager.end_voting()?;
            println!(
                "Voting completed for class {} (session {})",
                session.class_name, session.id
            );
        }
        Command::Results { session, .. } => {
            let session = match session {
                Some(id) => manager
                    .store()
                    .session(SessionId(*id))?
                    .ok_or_else(|| VotingErrors::NotFound(format!("session {}", id)))?,
                None => latest_session(&manager)?,
            };
            if session.is_active() {
                warn!(
                    "Session {} is not completed, the results are provisional",
                    session.id
                );
            }
            let tally = tally_session(manager.store(), session.id)?;
            println!(
                "{}",
                report::render_text_report(&session, &tally, chrono::Local::now())
            );
            if let Some(dir) = &settings.output_directory {
                let (js_path, txt_path) = report::write_reports(dir, &session, &tally)?;
                println!(
                    "Results written to {} and {}",
                    js_path.display(),
                    txt_path.display()
                );
            }
        }
        Command::Sessions => {
            for session in manager.store().sessions()? {
                println!(
                    "{:>4}  {:<12} {:<20} created {}",
                    session.id,
                    session.class_name,
                    session.status.display_name(),
                    session.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::DeleteSession { session_id } => {
            let id = SessionId(*session_id);
            if manager.store().session(id)?.is_none() {
                return Err(VotingErrors::NotFound(format!("session {}", id)).into());
            }
            let mut store = manager.into_store();
            store.delete_session(id)?;
            println!("Deleted session {}", id);
        }
        Command::Seed => {
            let session = seed(&mut manager, &settings.sample_parents)?;
            println!(
                "Created sample session {} for class {}",
                session.id, session.class_name
            );
        }
        Command::Reset { yes } => {
            if !*yes {
                whatever!("Refusing to delete all the sessions without --yes");
            }
            let mut store = manager.into_store();
            store.reset()?;
            println!("All sessions deleted");
        }
        Command::Simulate { .. } => {}
    }
    Ok(())
}

fn describe_parent(p: &Parent) -> String {
    format!(
        "parent {}: {}{}",
        p.id,
        p.name,
        if p.is_candidate { " (candidate)" } else { "" }
    )
}

fn latest_session<S: VotingStore>(manager: &SessionManager<S>) -> CliResult<VotingSession> {
    if let Some(s) = manager.session() {
        return Ok(s.clone());
    }
    match manager.store().sessions()?.into_iter().next() {
        Some(s) => Ok(s),
        None => whatever!("No session found"),
    }
}

// Records the vote and names both parents.
fn cast_vote<S: VotingStore>(
    manager: &mut SessionManager<S>,
    candidate_id: ParentId,
) -> CliResult<String> {
    let voter = manager.current_voter().map(|p| p.name.clone());
    let vote = manager.record_vote(candidate_id)?;
    let candidate = manager
        .store()
        .parent(vote.candidate_id)?
        .map(|p| p.name)
        .unwrap_or_else(|| vote.candidate_id.to_string());
    Ok(format!(
        "Vote of {} recorded for {}",
        voter.unwrap_or_default(),
        candidate
    ))
}

fn print_turn<S: VotingStore>(manager: &SessionManager<S>) -> CliResult<()> {
    let progress = manager.progress()?;
    match (manager.current_voter(), progress.current_position()) {
        (Some(voter), Some(pos)) => println!(
            "Voter {} of {}: {} (parent {})",
            pos, progress.total_parents, voter.name, voter.id
        ),
        _ => println!("All parents have voted, run `classvote end` to close the session"),
    }
    Ok(())
}

fn print_status<S: VotingStore>(manager: &SessionManager<S>) -> CliResult<()> {
    let session = match manager.session() {
        Some(s) => s,
        None => {
            println!("No active session");
            return Ok(());
        }
    };
    println!(
        "Session {} - class {} - {}",
        session.id,
        session.class_name,
        session.status.display_name()
    );
    let progress = manager.progress()?;
    let candidates = manager.candidates()?;
    println!(
        "{} parents, {} candidates, {} voted, {} remaining",
        progress.total_parents,
        candidates.len(),
        progress.voted,
        progress.remaining
    );
    if session.is_voting() {
        print_turn(manager)?;
    }
    for c in candidates.iter() {
        println!("  {}", describe_parent(c));
    }
    Ok(())
}

/// Creates the sample class. The first parents by name become the candidates.
pub fn seed<S: VotingStore>(
    manager: &mut SessionManager<S>,
    names: &[String],
) -> CliResult<VotingSession> {
    if !manager.store().sessions()?.is_empty() {
        whatever!("The database already contains sessions, run `classvote reset --yes` first");
    }
    // All the names are checked before anything is stored.
    for name in names.iter() {
        NewParent::new(SessionId(0), name)?;
    }
    let session = manager.create_session(SAMPLE_CLASS)?.clone();
    for name in names.iter() {
        manager.add_parent(name)?;
    }
    let candidates: Vec<ParentId> = manager
        .parents()?
        .iter()
        .take(SAMPLE_CANDIDATES)
        .map(|p| p.id)
        .collect();
    for id in candidates {
        let p = manager.set_candidate(id, true)?;
        info!("Marked {} as candidate", p.name);
    }
    info!(
        "Sample data created: {} parents, {} candidates",
        names.len(),
        SAMPLE_CANDIDATES.min(names.len())
    );
    Ok(session)
}

fn placement_js(placement: &Option<Placement>) -> JSValue {
    match placement {
        Some(p) => json!({
            "candidate": p.result.name,
            "votes": p.result.votes,
            "percentage": p.result.percentage,
            "tie": p.tied,
        }),
        None => JSValue::Null,
    }
}

/// The summary of a tally, without any time-dependent field.
pub fn build_summary_js(class_name: &str, tally: &TallyResult) -> JSValue {
    let results: Vec<JSValue> = tally
        .ranked
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            json!({
                "rank": idx + 1,
                "candidate": r.name,
                "votes": r.votes,
                "percentage": r.percentage,
            })
        })
        .collect();
    json!({
        "config": { "className": class_name },
        "results": results,
        "winner": placement_js(&tally.winner),
        "deputy": placement_js(&tally.deputy),
        "statistics": {
            "totalParents": tally.total_parents,
            "votesCast": tally.total_votes,
            "turnout": tally.turnout,
        }
    })
}

/// Runs a scripted session in memory and returns its summary.
pub fn run_simulation(script: &SimulationScript) -> CliResult<JSValue> {
    let mut manager = SessionManager::new(MemoryStore::new())?;
    manager.create_session(&script.class_name)?;

    let mut ids: HashMap<String, ParentId> = HashMap::new();
    for name in script.parents.iter() {
        let parent = manager.add_parent(name)?;
        if ids.insert(parent.name.clone(), parent.id).is_some() {
            whatever!("Parent {:?} appears twice in the script", parent.name);
        }
    }
    let lookup = |name: &str| -> CliResult<ParentId> {
        match ids.get(name.trim()) {
            Some(id) => Ok(*id),
            None => whatever!("Unknown parent {:?} in the script", name),
        }
    };
    for name in script.candidates.iter() {
        manager.set_candidate(lookup(name)?, true)?;
    }
    manager.start_voting()?;

    for (idx, ballot) in script.ballots.iter().enumerate() {
        let current = match manager.current_voter() {
            Some(p) => p.name.clone(),
            None => whatever!("Ballot {}: all the parents have already voted", idx + 1),
        };
        if current != ballot.voter.trim() {
            whatever!(
                "Ballot {}: expected a ballot from {}, found {}",
                idx + 1,
                current,
                ballot.voter
            );
        }
        match &ballot.candidate {
            Some(c) => {
                manager.record_vote(lookup(c)?)?;
            }
            None => {
                manager.skip()?;
            }
        }
    }

    let remaining = manager.progress()?.remaining;
    if remaining > 0 && !script.end_early.unwrap_or(false) {
        whatever!(
            "{} parents have no ballot in the script (set endEarly to end the vote before)",
            remaining
        );
    }
    manager.end_voting()?;
    let tally = manager.results()?;
    Ok(build_summary_js(&script.class_name, &tally))
}

pub fn simulate(script_path: &str, check_summary_path: Option<&str>) -> CliResult<String> {
    let script = read_script(script_path)?;
    info!("simulate: script: {:?}", script);
    let summary = run_simulation(&script)?;
    let pretty_js_stats = serde_json::to_string_pretty(&summary).context(ParsingJsonSnafu {})?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }
    Ok(pretty_js_stats)
}
