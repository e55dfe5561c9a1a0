use std::process::ExitCode;

use clap::Parser;
use portcullis::{NewUser, RepositoryProvider, SqliteRepositoryProvider};
use portcullis_core::{
    crypto::hash_password_async,
    repositories::UserRepositoryProvider,
    validation::{validate_password, validate_username},
};
use tracing_subscriber::EnvFilter;

/// Command line interface for Portcullis
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(
        long,
        global = true,
        env = "PORTCULLIS_DATABASE_URL",
        default_value = "sqlite://portcullis.db?mode=rwc"
    )]
    db_url: String,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Print the Argon2 hash of a password
    HashPassword {
        #[arg(long, env = "PORTCULLIS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create a user with a password
    SeedUser {
        #[arg(long)]
        username: String,
        #[arg(long, env = "PORTCULLIS_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "")]
        fullname: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => {
            tracing::info!("Running migrations...");
            let storage = SqliteRepositoryProvider::connect(&cli.db_url).await?;
            storage.migrate().await?;
            tracing::info!("Migrations complete");
        }
        Commands::HashPassword { password } => {
            println!("{}", hash_password_async(&password).await?);
        }
        Commands::SeedUser {
            username,
            password,
            fullname,
            email,
        } => {
            let username = validate_username(&username)?;
            validate_password(&password)?;

            let storage = SqliteRepositoryProvider::connect(&cli.db_url).await?;
            let password_hash = hash_password_async(&password).await?;
            let user = storage
                .user()
                .create_user(
                    NewUser::new(username, password_hash)
                        .with_fullname(fullname)
                        .with_email(email),
                )
                .await?;

            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Commands::Version => {
            println!("Portcullis v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
