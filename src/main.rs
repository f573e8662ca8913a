use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use safeher::admin::{UserFilter, UserStatusFilter};
use safeher::config::{Cli, Command, Config};
use safeher::identity::IdentityId;
use safeher::reports::ReportId;
use safeher::state::{AppState, Client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    let state = AppState::open(&config)?;

    if let Command::Migrate = cli.command {
        tracing::info!("Database ready at {}", config.db_path().display());
        return Ok(());
    }

    let email = cli.email.as_deref().context("--email is required")?;
    let password = cli.password.as_deref().context("--password is required")?;

    let client = state.client();
    client.access.login(email, password).await?;
    client.session.require_admin()?;

    let result = run(&client, cli.command).await;
    client.access.logout().await?;
    result
}

async fn run(client: &Client, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Migrate => Ok(()),
        Command::Users { status, query } => {
            let status: UserStatusFilter = status.parse().map_err(anyhow::Error::msg)?;
            let users = client
                .admin
                .search_users(&UserFilter { status, query })
                .await?;
            print_json(&users)
        }
        Command::Reports { email } => print_json(&client.admin.list_reports_for_user(&email).await?),
        Command::AllReports => print_json(&client.admin.list_all_reports().await?),
        Command::Block { user_id } => {
            client.admin.block_user(&IdentityId::new(&user_id)).await?;
            print_json(&json!({ "user_id": user_id, "blocked": true }))
        }
        Command::Unblock { user_id } => {
            client.admin.unblock_user(&IdentityId::new(&user_id)).await?;
            print_json(&json!({ "user_id": user_id, "blocked": false }))
        }
        Command::DeleteUser { email } => {
            client.admin.delete_user(&email).await?;
            print_json(&json!({ "deleted_user": email }))
        }
        Command::DeleteReport { id } => {
            client.admin.delete_report(&ReportId::new(&id)).await?;
            print_json(&json!({ "deleted_report": id }))
        }
        Command::SetStatus { id, status } => {
            client
                .admin
                .set_report_status(&ReportId::new(&id), status)
                .await?;
            print_json(&json!({ "report": id, "status": status }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
