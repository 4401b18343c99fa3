//! Match Console
//!
//! Interactive console for driving the match lifecycle by hand. Each stdin
//! line is parsed as one command and its outcome is printed as JSON.
//!
//! Usage:
//!   cargo run --bin match-console -- --state-dir ./state
//!   > join 1001 Ace
//!   > select 1001
//!   > win a
//!   > help

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use scrim_room::collaborators::{NoopAccountLinker, NoopVoiceChannels};
use scrim_room::commands::Command;
use scrim_room::config::AppConfig;
use scrim_room::persistence::{FileSnapshotStore, InMemorySnapshotStore, SnapshotStore};
use scrim_room::rating::LeaderboardSort;
use scrim_room::service::AppState;
use scrim_room::teams::FormationRequest;
use scrim_room::types::TeamLabel;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "match-console")]
#[command(about = "Interactive console for the scrim-room match lifecycle")]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Persist state here; without it state lives only in memory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Log level for console diagnostics
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// One console line
#[derive(Parser)]
#[command(name = "match-console", no_binary_name = true, disable_version_flag = true)]
struct Line {
    #[command(subcommand)]
    command: ConsoleCommand,
}

#[derive(Clone, Copy, ValueEnum)]
enum TeamArg {
    A,
    B,
}

impl From<TeamArg> for TeamLabel {
    fn from(team: TeamArg) -> Self {
        match team {
            TeamArg::A => TeamLabel::A,
            TeamArg::B => TeamLabel::B,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Level,
    Mmr,
}

#[derive(Subcommand)]
enum ConsoleCommand {
    /// Join the queue
    Join { player: String, alias: Option<String> },
    /// Leave the queue
    Leave { player: String },
    /// Show the queue
    Queue,
    /// Announce how many players are needed
    Ping,
    /// Clear the queue
    Reset,
    /// Show the live match
    Status,
    /// Start a non-scoring match with an explicit roster
    Test { roster: Vec<String> },
    /// Form teams as PLAYER: balanced, or an explicit split with --a/--b
    Select {
        player: String,
        #[arg(long = "a", num_args = 1..)]
        team_a: Vec<String>,
        #[arg(long = "b", num_args = 1..)]
        team_b: Vec<String>,
    },
    /// Start a captains draft as PLAYER, optionally naming both captains
    Draft {
        player: String,
        captain_a: Option<String>,
        captain_b: Option<String>,
    },
    /// Draft pick by a captain
    Pick { captain: String, player: String },
    /// Swap two players between teams
    Swap { first: String, second: String },
    /// Vote for the next map
    Vote { player: String, choice: Vec<String> },
    /// Close voting for the current game
    Close,
    /// Report the winner of the current game
    Win {
        #[arg(value_enum)]
        team: TeamArg,
    },
    /// Correct the winner of a recorded game
    Correct {
        game: u32,
        #[arg(value_enum)]
        team: TeamArg,
    },
    /// Finalize a completed series
    Finalize,
    /// Cancel the live match, or only match NUMBER (a test match with --test)
    Cancel {
        number: Option<u64>,
        #[arg(long)]
        test: bool,
    },
    Rank { player: String },
    Leaderboard {
        #[arg(value_enum, default_value = "level")]
        sort: SortArg,
        limit: Option<usize>,
    },
    Stats { player: String },
    SetMmr { player: String, value: i64 },
    RefreshRanks,
    Link { player: String, handle: String },
    Unlink { player: String },
    Alias { player: String, alias: Vec<String> },
    Hide { player: String },
    Show { player: String },
}

impl ConsoleCommand {
    fn into_command(self) -> Command {
        match self {
            ConsoleCommand::Join { player, alias } => Command::JoinQueue {
                alias: alias.unwrap_or_else(|| player.clone()),
                player_id: player,
            },
            ConsoleCommand::Leave { player } => Command::LeaveQueue { player_id: player },
            ConsoleCommand::Queue => Command::QueueStatus,
            ConsoleCommand::Ping => Command::PingQueue,
            ConsoleCommand::Reset => Command::ResetQueue,
            ConsoleCommand::Status => Command::MatchStatus,
            ConsoleCommand::Test { roster } => Command::StartTestMatch { roster },
            ConsoleCommand::Select {
                player,
                team_a,
                team_b,
            } => {
                let request = if team_a.is_empty() && team_b.is_empty() {
                    FormationRequest::Balanced
                } else {
                    FormationRequest::PlayersPick { team_a, team_b }
                };
                Command::SelectTeams {
                    requested_by: player,
                    request,
                }
            }
            ConsoleCommand::Draft {
                player,
                captain_a,
                captain_b,
            } => Command::BeginDraft {
                requested_by: player,
                captains: captain_a.zip(captain_b),
            },
            ConsoleCommand::Pick { captain, player } => Command::DraftPick { captain, player },
            ConsoleCommand::Swap { first, second } => Command::SwapPlayers { first, second },
            ConsoleCommand::Vote { player, choice } => Command::CastVote {
                player_id: player,
                choice: choice.join(" "),
            },
            ConsoleCommand::Close => Command::CloseVoting,
            ConsoleCommand::Win { team } => Command::ReportWinner { team: team.into() },
            ConsoleCommand::Correct { game, team } => Command::CorrectGame {
                game_index: game,
                team: team.into(),
            },
            ConsoleCommand::Finalize => Command::FinalizeMatch,
            ConsoleCommand::Cancel { number, test } => match number {
                Some(match_number) => Command::CancelMatch {
                    match_number,
                    test_mode: test,
                },
                None => Command::CancelCurrent,
            },
            ConsoleCommand::Rank { player } => Command::GetRank { player_id: player },
            ConsoleCommand::Leaderboard { sort, limit } => Command::GetLeaderboard {
                sort: match sort {
                    SortArg::Level => LeaderboardSort::Level,
                    SortArg::Mmr => LeaderboardSort::Mmr,
                },
                limit,
            },
            ConsoleCommand::Stats { player } => Command::GetStats { player_id: player },
            ConsoleCommand::SetMmr { player, value } => Command::SetMmr {
                player_id: player,
                value,
            },
            ConsoleCommand::RefreshRanks => Command::RefreshRanks,
            ConsoleCommand::Link { player, handle } => Command::LinkAccount {
                player_id: player,
                handle,
            },
            ConsoleCommand::Unlink { player } => Command::UnlinkAccount { player_id: player },
            ConsoleCommand::Alias { player, alias } => Command::SetAlias {
                player_id: player,
                alias: alias.join(" "),
            },
            ConsoleCommand::Hide { player } => Command::HidePlayerNames { player_id: player },
            ConsoleCommand::Show { player } => Command::ShowPlayerNames { player_id: player },
        }
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    let store: Arc<dyn SnapshotStore> = match &cli.state_dir {
        Some(dir) => {
            config.persistence.state_dir = dir.clone();
            Arc::new(FileSnapshotStore::new(dir.clone()))
        }
        None => Arc::new(InMemorySnapshotStore::new()),
    };

    let mut app = AppState::with_components(
        config,
        store,
        Arc::new(NoopVoiceChannels),
        Arc::new(NoopAccountLinker),
    )
    .await?;
    let dispatcher = app.dispatcher();

    println!(
        "match-console: {} queued, phase {}. Type 'help' for commands.",
        app.recovery().queued,
        app.recovery().phase
    );
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.first().copied() {
            None => {}
            Some("quit") | Some("exit") => break,
            Some(_) => match Line::try_parse_from(words.iter().copied()) {
                Ok(parsed) => match dispatcher.dispatch(parsed.command.into_command()).await {
                    Ok(response) => {
                        println!("{}", serde_json::to_string_pretty(&response.outcome)?);
                        for failure in &response.collaborator_errors {
                            println!("warning: {}", failure);
                        }
                    }
                    Err(e) => println!("error ({}): {}", e.kind().as_str(), e),
                },
                Err(e) => println!("{}", e),
            },
        }
        prompt();
    }

    app.shutdown().await?;
    Ok(())
}
