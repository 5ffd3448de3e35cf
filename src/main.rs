use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use helpline::{ApiClient, ClientChat, EventStream, ManagerWorkspace, Session, StreamConfig};

mod console;
mod utils;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Console front end for the support-desk chat",
    long_about = "Talks to the chat backend the same way the web clients do: REST calls for \
                  history and actions, one WebSocket for live events.\n\nThe bearer token comes \
                  from --token or the HELPLINE_TOKEN environment variable. Endpoint URLs default \
                  to a backend on localhost."
)]
struct Args {
    /// Bearer token issued at sign-in (a JWT whose subject is your user id)
    #[arg(long, value_name = "JWT")]
    token: Option<String>,

    /// Base URL of the REST gateway
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// URL of the live event stream
    #[arg(long, value_name = "URL")]
    ws_url: Option<String>,

    /// Subprotocol offered on the event stream
    #[arg(long, value_name = "NAME")]
    ws_protocol: Option<String>,

    /// Where to write the log; the console itself stays clean
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Customer side: one conversation with support
    Client,
    /// Manager side: assigned chats and the free-hands gate
    Manager,
}

fn default_urls(role: &Role) -> (&'static str, &'static str) {
    match role {
        Role::Client => ("http://localhost:8080/v1", "ws://localhost:8080/ws"),
        Role::Manager => ("http://localhost:8081/v1", "ws://localhost:8081/ws"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from("helpline.log"));
    utils::setup_logging(&log_file)?;

    let token = args
        .token
        .or_else(|| env::var("HELPLINE_TOKEN").ok())
        .context("no bearer token: pass --token or set HELPLINE_TOKEN")?;
    let session = Session::from_token(token)?;

    let (default_api, default_ws) = default_urls(&args.role);
    let api_url = args.api_url.unwrap_or_else(|| default_api.to_string());
    let ws_url = args.ws_url.unwrap_or_else(|| default_ws.to_string());
    info!("starting {:?} console against {api_url}", args.role);

    let api = ApiClient::new(api_url, &session);
    let mut stream_config = StreamConfig::new(ws_url, session.token());
    if let Some(protocol) = args.ws_protocol {
        stream_config = stream_config.with_subprotocol(protocol);
    }
    let stream = EventStream::spawn(stream_config);

    match args.role {
        Role::Client => {
            let (chat, deltas) = ClientChat::new(api);
            console::run_client(&session, chat, deltas, stream).await
        }
        Role::Manager => {
            let (workspace, deltas) = ManagerWorkspace::new(api);
            console::run_manager(&session, workspace, deltas, stream).await
        }
    }
}
