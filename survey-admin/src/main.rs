use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use survey_core::{Group, SqliteGateway, UserId};

mod tabular;

/// Offline maintenance for survey user records
#[derive(Parser, Debug)]
#[command(name = "survey-admin")]
#[command(about = "Bulk maintenance for survey user records", long_about = None)]
struct Cli {
    /// Path to the record store database
    #[arg(long, default_value = "survey.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision records from a uid,group table
    CreateUsers(CreateUsersArgs),
    /// Delete listed records that have not completed the survey
    DeleteUsers(DeleteUsersArgs),
    /// Export reaction counts to a table
    ExportReactions(ExportReactionsArgs),
}

#[derive(Parser, Debug)]
struct CreateUsersArgs {
    /// Input table with a uid,group header row
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct DeleteUsersArgs {
    /// Input table with a uid,group header row
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportReactionsArgs {
    /// Output file
    #[arg(long, default_value = "dist.csv")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let gateway = SqliteGateway::new(&cli.db)
        .with_context(|| format!("Failed to open record store at {}", cli.db.display()))?;

    match cli.command {
        Commands::CreateUsers(args) => create_users(&gateway, &args.file).await,
        Commands::DeleteUsers(args) => delete_users(&gateway, &args.file).await,
        Commands::ExportReactions(args) => export_reactions(&gateway, &args.output).await,
    }
}

async fn create_users(gateway: &SqliteGateway, file: &Path) -> Result<()> {
    let input = read_table(file)?;
    let rows = tabular::parse_user_rows(&input);

    let mut entries = Vec::new();
    let mut skipped = 0;
    for row in rows {
        match Group::parse(&row.group) {
            Some(group) => entries.push((UserId::from(row.uid.as_str()), group)),
            None => {
                eprintln!(
                    "Skipping '{}': unrecognized group '{}'",
                    row.uid, row.group
                );
                skipped += 1;
            }
        }
    }

    let requested = entries.len();
    let created = gateway
        .create_if_absent(entries)
        .await
        .context("Bulk create failed")?;

    println!(
        "Created {} records ({} already existed, {} rows skipped)",
        created,
        requested - created,
        skipped
    );
    Ok(())
}

async fn delete_users(gateway: &SqliteGateway, file: &Path) -> Result<()> {
    let input = read_table(file)?;
    let ids: Vec<UserId> = tabular::parse_user_rows(&input)
        .into_iter()
        .map(|row| UserId::from(row.uid.as_str()))
        .collect();

    let listed = ids.len();
    let deleted = gateway
        .delete_unlocked(ids)
        .await
        .context("Bulk delete failed")?;

    println!(
        "Deleted {} of {} listed records (completed surveys are kept)",
        deleted, listed
    );
    Ok(())
}

async fn export_reactions(gateway: &SqliteGateway, output: &Path) -> Result<()> {
    let records = gateway.export_records().await.context("Export failed")?;
    let table = tabular::render_export(&records);
    let rows = table.lines().count() - 1;

    fs::write(output, table)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Wrote {} rows to {}", rows, output.display());
    Ok(())
}

fn read_table(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}
