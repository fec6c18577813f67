use std::fmt;
use std::sync::Arc;

use clinic_core::model::{ActivityId, CurriculumId, PatientId, Score, SessionId, SessionTarget};
use services::{EvaluationSessionService, SessionState, Transition};
use storage::http::{ApiConfig, HttpEvaluationStore};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidScores { raw: String },
    ConflictingTarget,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidScores { raw } => write!(f, "invalid --scores value: {raw}"),
            ArgsError::ConflictingTarget => {
                write!(f, "pass exactly one of --curriculum or --activity")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.parse().map_err(|_| ArgsError::InvalidId { flag, raw })
}

fn parse_scores(raw: String) -> Result<Vec<Score>, ArgsError> {
    let scores = raw
        .split(',')
        .map(|part| part.trim().parse::<u32>().map(Score::new))
        .collect::<Result<Vec<_>, _>>();
    match scores {
        Ok(scores) if !scores.is_empty() => Ok(scores),
        _ => Err(ArgsError::InvalidScores { raw }),
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app start    --patient <id> (--curriculum <id> | --activity <id>)");
    eprintln!("  app status   --session <id>");
    eprintln!("  app commit   --session <id> --scores <s1,s2,...> [--note <text>]");
    eprintln!("  app finalize --session <id>");
    eprintln!();
    eprintln!("Every command accepts --api-url <url>.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CLINIC_API_URL, CLINIC_API_TOKEN, CLINIC_API_TIMEOUT_SECS, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start {
        patient: PatientId,
        target: SessionTarget,
    },
    Status {
        session: SessionId,
    },
    Commit {
        session: SessionId,
        scores: Vec<Score>,
        note: Option<String>,
    },
    Finalize {
        session: SessionId,
    },
}

struct Args {
    api_url: Option<String>,
    command: Command,
}

#[derive(Default)]
struct Flags {
    api_url: Option<String>,
    session: Option<SessionId>,
    patient: Option<PatientId>,
    curriculum: Option<CurriculumId>,
    activity: Option<ActivityId>,
    scores: Option<Vec<Score>>,
    note: Option<String>,
}

impl Flags {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut flags = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api-url" => flags.api_url = Some(require_value(args, "--api-url")?),
                "--session" => flags.session = Some(parse_id(args, "--session")?),
                "--patient" => flags.patient = Some(parse_id(args, "--patient")?),
                "--curriculum" => flags.curriculum = Some(parse_id(args, "--curriculum")?),
                "--activity" => flags.activity = Some(parse_id(args, "--activity")?),
                "--scores" => flags.scores = Some(parse_scores(require_value(args, "--scores")?)?),
                "--note" => flags.note = Some(require_value(args, "--note")?),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(flags)
    }

    fn session(&self) -> Result<SessionId, ArgsError> {
        self.session.ok_or(ArgsError::MissingFlag { flag: "--session" })
    }

    fn target(&self) -> Result<SessionTarget, ArgsError> {
        match (self.curriculum, self.activity) {
            (Some(id), None) => Ok(SessionTarget::Curriculum(id)),
            (None, Some(id)) => Ok(SessionTarget::Activity(id)),
            _ => Err(ArgsError::ConflictingTarget),
        }
    }
}

impl Args {
    fn parse(name: &str, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut flags = Flags::parse(args)?;
        let command = match name {
            "start" => Command::Start {
                patient: flags
                    .patient
                    .ok_or(ArgsError::MissingFlag { flag: "--patient" })?,
                target: flags.target()?,
            },
            "status" => Command::Status {
                session: flags.session()?,
            },
            "commit" => Command::Commit {
                session: flags.session()?,
                scores: flags
                    .scores
                    .take()
                    .ok_or(ArgsError::MissingFlag { flag: "--scores" })?,
                note: flags.note.take(),
            },
            "finalize" => Command::Finalize {
                session: flags.session()?,
            },
            other => return Err(ArgsError::UnknownArg(other.to_string())),
        };
        Ok(Self {
            api_url: flags.api_url,
            command,
        })
    }
}

fn print_state(state: &SessionState) {
    let session = state.session();
    let progress = state.progress();
    println!(
        "session {} ({}) for patient {}: {}",
        session.id, session.target, session.patient_id, session.status
    );
    for activity in state.completion().activity_progress() {
        let mark = if activity.is_complete { "x" } else { " " };
        println!(
            "  [{mark}] {} {}/{}",
            activity.name, activity.evaluated, activity.required
        );
    }
    println!(
        "progress: {}/{} ({:.1}%)",
        progress.evaluated, progress.total, progress.percent
    );
    if !progress.is_complete {
        println!(
            "current: {} - {} ({} attempts)",
            state.current_activity().name(),
            state.current_instruction().text,
            state.current_activity().target_attempts()
        );
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let name = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => first,
    };

    let parsed = Args::parse(&name, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = ApiConfig::from_env();
    if let Some(url) = parsed.api_url {
        config.base_url = url;
    }
    debug!(base_url = %config.base_url, "using evaluation store");
    let store = HttpEvaluationStore::new(config)?;
    let service = EvaluationSessionService::new(Arc::new(store));

    match parsed.command {
        Command::Start { patient, target } => {
            let outcome = service.start_session(patient, target).await?;
            if outcome.resumed {
                println!("resumed session {}", outcome.session.id);
            } else {
                println!("started session {}", outcome.session.id);
            }
            if let Some(message) = outcome.message {
                println!("{message}");
            }
        }
        Command::Status { session } => {
            let state = service.open_session(session).await?;
            print_state(&state);
        }
        Command::Commit {
            session,
            scores,
            note,
        } => {
            let mut state = service.open_session(session).await?;
            for (attempt, score) in (1..).zip(scores) {
                state.set_score(attempt, score)?;
                if let Some(note) = &note {
                    state.set_note(attempt, note.clone())?;
                }
            }
            let outcome = match service.commit_and_advance(&mut state).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    if let Some((failed, stored)) = err.partial_commit() {
                        eprintln!("attempt {failed} failed; attempts {stored:?} were already stored");
                    }
                    return Err(err.into());
                }
            };
            println!(
                "committed {} attempts ({} new), {} evaluations recorded",
                outcome.report.committed, outcome.report.new_keys, outcome.report.index_size
            );
            if outcome.transition == Transition::Stayed {
                println!("last instruction reached");
            }
            print_state(&state);
        }
        Command::Finalize { session } => {
            let mut state = service.open_session(session).await?;
            let session = service.finalize(&mut state).await?;
            println!("session {} is {}", session.id, session.status);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
