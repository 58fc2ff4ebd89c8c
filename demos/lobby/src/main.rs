use std::sync::Arc;

use microchess::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Create,
    Accept(ProposalId),
    Move(Move),
    List,
    Help,
    Quit,
}

const HELP: &str = "commands: create | accept <proposal-id> | move <from> <to> | list | quit";

/// Parses one stdin line. Blank lines yield `Ok(None)`.
fn parse(line: &str) -> Result<Option<Input>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let input = match (command, args.as_slice()) {
        ("create", []) => Input::Create,
        ("accept", [id]) => Input::Accept(ProposalId::from(*id)),
        ("move", [from, to]) => Input::Move(Move::new(*from, *to)),
        ("list", []) => Input::List,
        ("help", []) => Input::Help,
        ("quit" | "exit", []) => Input::Quit,
        ("create" | "accept" | "move" | "list" | "help" | "quit" | "exit", _) => {
            return Err(format!("wrong arguments for {command:?}; {HELP}"));
        }
        _ => return Err(format!("unknown command {command:?}; {HELP}")),
    };
    Ok(Some(input))
}

fn describe(proposal: &GameProposal) -> String {
    match &proposal.creator_id {
        Some(creator) => format!("{} (by {creator})", proposal.game_proposal_id),
        None => proposal.game_proposal_id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

async fn print_proposals(mut proposals: watch::Receiver<Vec<GameProposal>>) {
    let mut shown = 0;
    while proposals.changed().await.is_ok() {
        let fresh: Vec<String> = proposals
            .borrow_and_update()
            .iter()
            .skip(shown)
            .map(describe)
            .collect();
        shown += fresh.len();
        for line in fresh {
            println!("proposal {line}");
        }
    }
}

async fn print_connectivity(mut connected: watch::Receiver<bool>) {
    while connected.changed().await.is_ok() {
        let up = *connected.borrow_and_update();
        println!("{}", if up { "connected" } else { "disconnected" });
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(url = %config.broker_url, "starting lobby");
    let client = ClientBuilder::from_config(config).build();
    println!("you are {}", client.player_id());

    let on_created: Callback<GameCreated> = Arc::new(|created: &GameCreated| {
        println!("game {} started", created.game_id);
    });
    let on_move: Callback<MovePlayed> = Arc::new(|played: &MovePlayed| {
        let who = played
            .player_id
            .as_ref()
            .map_or_else(|| "?".to_owned(), ToString::to_string);
        println!("{who} played {}", played.played);
    });
    client.register_game_accepted_callback(&on_created).await?;
    client.register_move_played_callback(&on_move).await?;

    tokio::spawn(print_proposals(client.proposals()));
    tokio::spawn(print_connectivity(client.connected()));
    client.connect()?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match parse(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{msg}");
                continue;
            }
        };
        match input {
            Input::Create => client.request_create_proposal()?,
            Input::Accept(proposal_id) => client.request_accept_proposal(proposal_id)?,
            Input::Move(mv) => match client.try_send_move(mv).await {
                Ok(()) => {}
                Err(MicrochessError::Session(SessionError::NoActiveGame)) => {
                    eprintln!("no game yet; create or accept a proposal first");
                }
                Err(e) => eprintln!("move not sent: {e}"),
            },
            Input::List => {
                let all: Vec<String> = client.proposals().borrow().iter().map(describe).collect();
                if all.is_empty() {
                    println!("no proposals yet");
                }
                for line in all {
                    println!("proposal {line}");
                }
            }
            Input::Help => println!("{HELP}"),
            Input::Quit => break,
        }
    }

    client.shutdown().await;
    Ok(())
}
