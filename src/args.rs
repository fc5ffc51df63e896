use clap::{Parser, Subcommand};

/// Election of a class spokesperson and a deputy by the parents of the class.
///
/// The parents vote one after the other, in alphabetical order. The state of the
/// election is kept in an SQLite database between the commands.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON configuration file (keys: databasePath, outputDirectory,
    /// sampleParents). The command line options take precedence over this file.
    #[clap(short, long, value_parser, global = true)]
    pub config: Option<String>,

    /// (file path, default school_voting.db) The SQLite database holding the sessions.
    #[clap(long, value_parser, global = true)]
    pub db: Option<String>,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Creates a new session for a class. Only one session can be in setup or voting.
    CreateSession {
        #[clap(value_parser)]
        class_name: String,
    },
    /// Adds a parent to the session in setup.
    AddParent {
        #[clap(value_parser)]
        name: String,
        /// Also marks the parent as a candidate.
        #[clap(long, takes_value = false)]
        candidate: bool,
    },
    /// Adds the parents listed in the first column of a CSV or Excel (.xlsx) file.
    ImportParents {
        #[clap(value_parser)]
        path: String,
        /// (csv or xlsx) The type of the file. By default, it is guessed from the extension.
        #[clap(long, value_parser)]
        input_type: Option<String>,
        /// The first row is a header and is not a parent.
        #[clap(long, takes_value = false)]
        header: bool,
        /// When using an Excel file, the name of the worksheet to use (the first one by default).
        #[clap(long, value_parser)]
        excel_worksheet_name: Option<String>,
    },
    /// Removes a parent from the session in setup.
    RemoveParent {
        #[clap(value_parser)]
        parent_id: i64,
    },
    /// Marks a parent as a candidate (or not, with --unset).
    Candidate {
        #[clap(value_parser)]
        parent_id: i64,
        #[clap(long, takes_value = false)]
        unset: bool,
    },
    /// Lists the parents of the current session.
    Parents,
    /// Starts the voting. At least two candidates are required.
    Start,
    /// Shows the current session, the progress and whose turn it is.
    Status,
    /// Records the vote of the current voter for the given candidate.
    Vote {
        #[clap(value_parser)]
        candidate_id: i64,
    },
    /// Skips the current voter.
    Skip,
    /// Ends the voting, even if some parents have not voted yet.
    End,
    /// Prints the results and writes the reports to the output directory, if any.
    Results {
        /// (session id) By default, the current or the latest session.
        #[clap(long, value_parser)]
        session: Option<i64>,
        /// (directory) Where to write the JSON summary and the text report. Setting this option
        /// overrides the outputDirectory of the configuration file.
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },
    /// Lists all the sessions, newest first.
    Sessions,
    /// Deletes a session with its parents and votes.
    DeleteSession {
        #[clap(value_parser)]
        session_id: i64,
    },
    /// Creates a sample session for class 6c if the database is empty.
    Seed,
    /// Deletes all the sessions.
    Reset {
        /// Confirms the deletion.
        #[clap(long, takes_value = false)]
        yes: bool,
    },
    /// Runs a scripted session in memory and prints its summary in JSON format.
    Simulate {
        /// (file path) The JSON script of the session. See the manual for the format.
        #[clap(value_parser)]
        script: String,
        /// (file path) A reference summary in JSON format. If provided, classvote will
        /// check that the computed summary matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
    },
}
