use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use backoffice_chat::{Backoffice, BackofficeConfig, Role, TerminalBell};

const WAIT: Duration = Duration::from_secs(5);

/// Walks through the chat widget's unread tracking against a local database
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Directory for application data. Without it and --logs-dir, BACKOFFICE_DATA_DIR is used
    #[clap(long, value_name = "PATH", requires = "logs_dir")]
    data_dir: Option<PathBuf>,

    /// Directory for application logs
    #[clap(long, value_name = "PATH", requires = "data_dir")]
    logs_dir: Option<PathBuf>,

    /// Wipe existing chat data before running
    #[clap(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match (&args.data_dir, &args.logs_dir) {
        (Some(data_dir), Some(logs_dir)) => BackofficeConfig::new(data_dir, logs_dir),
        _ => BackofficeConfig::from_env()?,
    };
    let backoffice = match Backoffice::initialize(config).await {
        Ok(backoffice) => backoffice,
        Err(err) => {
            eprintln!("Failed to initialize back office: {}", err);
            std::process::exit(1);
        }
    };

    if args.reset {
        backoffice.delete_all_data().await?;
    }

    backoffice.register_user("ana", "Ana", Role::Admin).await?;
    backoffice.register_user("bruno", "Bruno", Role::Staff).await?;

    let bell = Arc::new(TerminalBell);
    let mut ana = backoffice.mount_chat_widget("ana", bell.clone()).await?;
    let mut bruno = backoffice.mount_chat_widget("bruno", bell).await?;
    ana.wait_until(WAIT, |w| w.is_loaded()).await;
    bruno.wait_until(WAIT, |w| w.is_loaded()).await;
    let before = bruno.total_unread();

    ana.open();
    ana.select_counterpart("bruno").await?;
    ana.set_draft("Olá");
    ana.submit()?;

    let arrived = bruno
        .wait_until(WAIT, |w| w.total_unread() > before)
        .await;
    anyhow::ensure!(arrived, "message never reached bruno");
    println!(
        "bruno before opening: from ana = {}, total = {}",
        bruno.unread_from("ana"),
        bruno.total_unread()
    );

    bruno.open();
    bruno
        .select_counterpart("ana")
        .await
        .context("bruno could not open the conversation")?;
    let read = bruno.wait_until(WAIT, |w| w.total_unread() == 0).await;
    anyhow::ensure!(read, "opening the conversation did not clear bruno's unread count");
    println!(
        "bruno after opening: from ana = {}, total = {}",
        bruno.unread_from("ana"),
        bruno.total_unread()
    );

    for message in bruno.visible_thread() {
        println!(
            "[{}] {} -> {}: {} (read: {})",
            message.timestamp.format("%H:%M:%S"),
            message.sender_id,
            message.receiver_id,
            message.text,
            message.read
        );
    }

    Ok(())
}
