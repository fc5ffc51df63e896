/*!

This is the long-form manual for `class_voting` and `classvote`.

`classvote` runs the election of a class spokesperson and a deputy among the
parents of a class. The parents vote one after another, on a single device,
in alphabetical order.

## Quick start

The following sequence runs a complete election for the class `6c`:

```bash
classvote create-session 6c
classvote add-parent "Anna Weber"
classvote add-parent "David Fischer"
classvote add-parent "Julia Becker"
classvote candidate 2      # ids as printed by `add-parent`
classvote candidate 3
classvote start
classvote status           # shows whose turn it is
classvote vote 3           # the current voter votes for parent 3
classvote skip             # the next voter does not vote
classvote vote 2
classvote end
classvote results --out results/
```

`classvote seed` creates a ready-to-use session with fifteen parents and five
candidates, which is convenient to try the program.

## Lifecycle of a session

A session goes through three phases:

* **Setup** parents are added and removed, and flagged as candidates.
* **Voting** each parent, in alphabetical order, either votes for one candidate
  or is skipped. Parents may vote for themselves. Each parent has at most one
  vote.
* **Completed** the voting was ended. This is final: nothing can be changed.

Voting can only start with at least two candidates. The voting can be ended at
any time, even if some parents have not voted yet. Only one session can be in
setup or voting at a given time: a new session can only be created once the
previous one is completed.

The state is kept in an SQLite database (by default `school_voting.db` in the
current directory), so every command can be run separately and an interrupted
vote resumes with the same voter.

## Results

The candidates are ranked by number of votes. The first one is the
spokesperson, the second one is the deputy. If the next candidate has the same
number of votes, the position is marked as a tie: no tiebreak is applied, the
class decides what to do.

Percentages are computed over the votes cast (skipped parents do not count)
and rounded to one decimal, a half going to the even neighbour (1 vote out
of 16 is 6.2%). The turnout is the share of registered parents who
cast a vote.

The `results` command writes two files in the output directory:

* `VotingResults_<class>_<date>.json` a machine-readable summary
* `VotingResults_<class>_<date>.txt` a printable report

where `<class>` is the class name restricted to letters and digits.

## Importing parents

`import-parents` reads the names of the parents from the first column of a
CSV file or of the first sheet of an Excel (.xlsx) file. Empty cells are
ignored. If the first row is a header, pass `--header`.

```text
name
Anna Weber
David Fischer
```

## Configuration

All the options can be passed on the command line. It is also possible to
put some of them in a JSON configuration file passed with `--config`:

```json
{
  "databasePath": "data/school_voting.db",
  "outputDirectory": "reports",
  "sampleParents": ["Anna Weber", "David Fischer", "Julia Becker"]
}
```

The options on the command line take precedence over the configuration file.

## Simulations

`simulate` runs a complete session in memory, without touching the database.
This is useful to check how a vote would be counted. The script describes the
session:

```json
{
  "className": "6c",
  "parents": ["A", "B", "C", "D"],
  "candidates": ["A", "B"],
  "ballots": [
    { "voter": "A", "candidate": "B" },
    { "voter": "B", "candidate": "B" },
    { "voter": "C" },
    { "voter": "D" }
  ]
}
```

A ballot without candidate is a skip. The ballots must follow the voting order
(alphabetical). If `endEarly` is `true`, the session is ended after the last
ballot even if some parents remain.

The summary is printed in JSON. With `--reference <file>`, it is compared to
an expected summary and the differences are printed.

## Logging

Pass `--verbose` to print the details of the processing. The `RUST_LOG`
environment variable is also honoured.

*/
