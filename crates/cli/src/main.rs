//! Omahring CLI - database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront and session store migrations
//! omahring migrate
//!
//! # Promote an existing customer to staff
//! omahring user role -e budi@example.com -r manager
//!
//! # Create a staff account
//! omahring user create -e admin@omahring.id -n "Admin Toko" -p 'kata-sandi-panjang' -r admin
//!
//! # Load the demo catalog
//! omahring seed
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "omahring")]
#[command(author, version, about = "Omahring CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Seed the database with a demo catalog and promo
    Seed,
}

#[derive(Subcommand)]
enum UserAction {
    /// Change the role of an existing user
    Role {
        /// User email address
        #[arg(short, long)]
        email: String,

        /// New role (`user`, `member`, `admin`, `manager`)
        #[arg(short, long)]
        role: String,
    },
    /// Create a user with a password and role
    Create {
        /// User email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Login password
        #[arg(short, long)]
        password: String,

        /// Role (`user`, `member`, `admin`, `manager`)
        #[arg(short, long, default_value = "admin")]
        role: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Role { email, role } => commands::user::set_role(&email, &role).await?,
            UserAction::Create {
                email,
                name,
                password,
                role,
            } => commands::user::create(&email, &name, &password, &role).await?,
        },
        Commands::Seed => commands::seed::demo().await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_user_role() {
        let cli = Cli::try_parse_from(["omahring", "user", "role", "-e", "a@b.id", "-r", "manager"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::User { action: UserAction::Role { role, .. } }) if role == "manager"
        ));
    }
}
