use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use dotenvy::dotenv;
use members::modules::permissions::registry::{PermissionRegistry, PgPermissionRegistry};
use members::modules::users::store::{PgUserStore, UserStore};
use members_core::{AppError, PermissionKey, hash_password};
use members_db::{init_db_pool, run_migrations};
use members_models::{Email, NewUser, User, UserChanges, Username};

#[derive(Parser)]
#[command(name = "members-cli")]
#[command(about = "Members CLI - Administrative tools for the Members API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a superuser account
    CreateSuperuser {
        #[arg(short = 'u', long)]
        username: Option<String>,

        #[arg(short = 'e', long)]
        email: Option<String>,

        /// Password (will be prompted securely if not provided)
        #[arg(short = 'p', long)]
        password: Option<String>,
    },
    /// Set a user's password
    ChangePassword {
        #[arg(short = 'u', long)]
        username: String,
    },
    /// Give a user the permission to delete users
    GrantDelete {
        #[arg(short = 'u', long)]
        username: String,
    },
    /// Take the permission to delete users away from a user
    RevokeDelete {
        #[arg(short = 'u', long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let pool = init_db_pool().await?;
    run_migrations(&pool).await?;
    let store = PgUserStore::new(pool.clone());

    match cli.command {
        Commands::CreateSuperuser {
            username,
            email,
            password,
        } => create_superuser(&store, username, email, password).await,
        Commands::ChangePassword { username } => change_password(&store, &username).await,
        Commands::GrantDelete { username } => {
            set_delete_grant(&store, &PgPermissionRegistry::new(pool), &username, true).await
        }
        Commands::RevokeDelete { username } => {
            set_delete_grant(&store, &PgPermissionRegistry::new(pool), &username, false).await
        }
    }
}

/// `AppError` carries its message in `error`; unwrap it for the terminal.
fn cli_error(e: AppError) -> anyhow::Error {
    match e.fields.iter().next() {
        Some((field, messages)) => anyhow!("{}: {}", field, messages.join(" ")),
        None => e.error,
    }
}

fn prompt_password() -> anyhow::Result<String> {
    Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords don't match")
        .interact()
        .context("Failed to read password")
}

async fn find_user(store: &PgUserStore, username: &str) -> anyhow::Result<User> {
    let username = Username::new(username)?;
    store
        .find_by_username(&username)
        .await
        .map_err(cli_error)?
        .ok_or_else(|| anyhow!("User '{}' not found", username))
}

async fn create_superuser(
    store: &PgUserStore,
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
) -> anyhow::Result<()> {
    let username = match username {
        Some(username) => username,
        None => Input::<String>::new()
            .with_prompt("Username")
            .interact_text()
            .context("Failed to read username")?,
    };
    let email = match email {
        Some(email) => email,
        None => Input::<String>::new()
            .with_prompt("Email address (optional)")
            .allow_empty(true)
            .interact_text()
            .context("Failed to read email")?,
    };
    let password = match password {
        Some(password) => password,
        None => prompt_password()?,
    };

    let mut new_user = NewUser::with_username(Username::new(username)?);
    if !email.trim().is_empty() {
        new_user.email = Some(Email::new(email)?);
    }

    let user = store
        .insert_superuser(new_user, hash_password(&password).map_err(cli_error)?)
        .await
        .map_err(cli_error)?;

    println!("\n✅ Superuser created successfully!");
    println!("   Username: {}", user.username);
    println!("   ID: {}", user.id);
    Ok(())
}

async fn change_password(store: &PgUserStore, username: &str) -> anyhow::Result<()> {
    let user = find_user(store, username).await?;
    let password = prompt_password()?;

    store
        .set_password(user.id, Some(hash_password(&password).map_err(cli_error)?))
        .await
        .map_err(cli_error)?;

    println!("✅ Password changed for '{}'", user.username);
    Ok(())
}

async fn set_delete_grant(
    store: &PgUserStore,
    registry: &PgPermissionRegistry,
    username: &str,
    granted: bool,
) -> anyhow::Result<()> {
    let user = find_user(store, username).await?;
    let permission = registry
        .resolve(&PermissionKey::DELETE_USER)
        .await
        .map_err(cli_error)?;

    store
        .update(user.id, UserChanges::default(), permission.id, Some(granted))
        .await
        .map_err(cli_error)?;

    let verb = if granted { "granted to" } else { "revoked from" };
    println!(
        "✅ {} {} '{}'",
        permission.qualified_name(),
        verb,
        user.username
    );
    Ok(())
}
