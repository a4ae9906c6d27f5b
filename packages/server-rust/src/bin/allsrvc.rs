//! allsrvc - command-line client for an allsrv server.
//!
//! Prints each resulting foo as a JSON document on stdout.

use allsrv_core::resource::foo_document;
use allsrv_core::{Foo, FooUpdate, RequestContext};
use allsrv_server::{FooService, HttpClient};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// allsrvc - talk to an allsrv server
#[derive(Parser, Debug)]
#[command(name = "allsrvc", version, about, long_about = None)]
struct Cli {
    /// Server base URL.
    #[arg(long, env = "ALLSRV_ADDR", default_value = "http://localhost:8091")]
    addr: String,

    /// Basic auth user.
    #[arg(long, env = "ALLSRV_USER")]
    user: Option<String>,

    /// Basic auth password.
    #[arg(long, env = "ALLSRV_PASS", hide_env_values = true)]
    pass: Option<String>,

    /// Trace id sent as `X-Mess-Trace-Id`; generated when absent.
    #[arg(long)]
    trace_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a foo
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Read a foo by id
    Read { id: String },
    /// Update the given fields of a foo
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete a foo by id
    Rm { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut client = HttpClient::new(&cli.addr)?;
    if let Some(user) = cli.user {
        client = client.with_basic_auth(user, cli.pass.unwrap_or_default());
    }
    let trace_id = cli
        .trace_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let ctx = RequestContext::new(trace_id);

    let foo = match cli.command {
        Command::Add { name, note } => {
            let foo = Foo {
                name,
                note,
                ..Foo::default()
            };
            Some(client.create_foo(&ctx, foo).await.context("add failed")?)
        }
        Command::Read { id } => Some(client.read_foo(&ctx, &id).await.context("read failed")?),
        Command::Update { id, name, note } => {
            let upd = FooUpdate { id, name, note };
            Some(client.update_foo(&ctx, upd).await.context("update failed")?)
        }
        Command::Rm { id } => {
            client.delete_foo(&ctx, &id).await.context("rm failed")?;
            None
        }
    };

    if let Some(foo) = foo {
        println!("{}", serde_json::to_string_pretty(&foo_document(&foo))?);
    }
    Ok(())
}
