use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;
mod common;

use common::resolve_store_dir;

#[derive(Parser)]
#[command(name = "swan")]
#[command(author, version, about = "Incremental derived cohort tables over COMPASS extracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Store directory; defaults to the SWANLAKE environment variable
    #[arg(long, global = true)]
    store: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store directory
    Init,
    /// Manage raw extract registrations
    Extract(ExtractArgs),
    /// Manage cohorts
    Cohort(CohortArgs),
    /// Run derivations over all currently-pending keys
    Materialize {
        /// names | alignment | encounters | delirium | outcomes | all
        #[arg(long, default_value = "all")]
        target: String,
        /// Maximum rows per streamed batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Show table row counts
    Status,
}

#[derive(Args)]
struct ExtractArgs {
    #[command(subcommand)]
    command: ExtractCommands,
}

#[derive(Subcommand)]
enum ExtractCommands {
    /// Register one extract file
    Register {
        /// encounter | procedure | flowsheet | lab | diagnosis
        kind: String,
        /// Path to the extract file (.csv or .parquet)
        path: String,
        /// Extract version stamp, e.g. 20210210
        #[arg(long, default_value_t = 0)]
        version: i64,
    },
    /// Register every extract listed in a YAML catalog file
    Import {
        /// Catalog config path
        #[arg(long)]
        config: PathBuf,
    },
    /// List registered extracts
    List,
}

#[derive(Args)]
struct CohortArgs {
    #[command(subcommand)]
    command: CohortCommands,
}

#[derive(Subcommand)]
enum CohortCommands {
    /// Register a cohort over a set of index procedures
    Register {
        /// Cohort name; the id becomes owner/name
        #[arg(long)]
        name: String,
        /// Owning user; defaults to $USER
        #[arg(long)]
        owner: Option<String>,
        /// Index procedure of interest (repeatable)
        #[arg(long = "procedure", required = true)]
        procedures: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        /// Allowlisted subject id (repeatable)
        #[arg(long = "subject")]
        subjects: Vec<i64>,
        /// JSON file with an array of allowlisted subject ids
        #[arg(long)]
        subjects_file: Option<PathBuf>,
    },
    /// List registered cohorts
    List,
    /// Show one cohort's derived state
    Show {
        /// Cohort id (owner/name)
        cohort_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();
    let store_dir = resolve_store_dir(&cli.store)?;

    match cli.command {
        Commands::Init => commands::init::run(&store_dir).await,
        Commands::Extract(args) => match args.command {
            ExtractCommands::Register {
                kind,
                path,
                version,
            } => commands::extract::register(&store_dir, &kind, &path, version).await,
            ExtractCommands::Import { config } => {
                commands::extract::import(&store_dir, &config).await
            }
            ExtractCommands::List => commands::extract::list(&store_dir).await,
        },
        Commands::Cohort(args) => match args.command {
            CohortCommands::Register {
                name,
                owner,
                procedures,
                description,
                subjects,
                subjects_file,
            } => {
                commands::cohort::register(
                    &store_dir,
                    owner,
                    &name,
                    procedures,
                    description,
                    subjects,
                    subjects_file,
                )
                .await
            }
            CohortCommands::List => commands::cohort::list(&store_dir).await,
            CohortCommands::Show { cohort_id } => {
                commands::cohort::show(&store_dir, &cohort_id).await
            }
        },
        Commands::Materialize { target, batch_size } => {
            commands::materialize::run(&store_dir, &target, batch_size).await
        }
        Commands::Status => commands::status::run(&store_dir).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_then_status_round_trip() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let store_dir = tmp.path().join("store");

        commands::init::run(&store_dir).await?;
        commands::status::run(&store_dir).await?;

        // Re-running init against an initialized store fails.
        assert!(commands::init::run(&store_dir).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn register_and_materialize_via_commands() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let store_dir = tmp.path().join("store");
        commands::init::run(&store_dir).await?;

        let extract = tmp.path().join("procedures.csv");
        std::fs::write(
            &extract,
            "person_id,encounter_id,order_name,days_from_dob_procstart\n1,10,CABG,9000\n",
        )?;
        commands::extract::register(
            &store_dir,
            "procedure",
            extract.to_string_lossy().as_ref(),
            20210210,
        )
        .await?;
        commands::extract::list(&store_dir).await?;

        commands::cohort::register(
            &store_dir,
            Some("wickers".into()),
            "TEG",
            vec!["CABG".into()],
            None,
            vec![],
            None,
        )
        .await?;

        commands::materialize::run(&store_dir, "names", None).await?;
        commands::materialize::run(&store_dir, "alignment", None).await?;
        commands::cohort::show(&store_dir, "wickers/TEG").await?;
        Ok(())
    }
}
