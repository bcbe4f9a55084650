use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use users_kit::{
    builder, roles_accepted, AuthUser, PgRepository, RoleCreate, User, UserService, UsersConfig, UsersRouter,
};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "users", version, about = "Manage users and roles, or serve the users API")]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Config file, `USERS_*` environment variables take precedence
    #[arg(long, env = "USERS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user
    CreateUser {
        email: String,
        password: String,
        /// Create the user deactivated
        #[arg(long)]
        inactive: bool,
        /// Create the user without verifying their email
        #[arg(long)]
        unverified: bool,
        /// Use this id instead of a random one
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// Create a role
    CreateRole {
        name: String,
        description: Option<String>,
    },
    /// Assign an existing role to an existing user
    AssignRole {
        email: String,
        role: String,
    },
    /// Create the users schema if it doesn't exist
    Migrate,
    /// Serve the users API
    Serve {
        #[arg(long, env = "USERS_BIND", default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
        /// Role required on the user and role management routes
        #[arg(long, default_value = "administrator")]
        admin_role: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = UsersConfig::load(cli.config.as_deref()).context("couldn't load users config")?;
    let repository = Arc::new(
        PgRepository::create(cli.database_url)
            .await
            .context("couldn't connect to the database")?,
    );

    let service: UserService<User> = builder::<User>()
        .configure(&config)
        .use_repository(repository.clone())
        .use_role_repository(repository.clone())
        .build()?;

    match cli.command {
        Command::CreateUser { email, password, inactive, unverified, id } => {
            let user = match id {
                Some(id) => {
                    User::validate_password(&password)?;
                    let pwd_hash = service.password_manager().hash(&password)?;
                    let user = User::existing(id, email, pwd_hash, !inactive, !unverified, Vec::new());
                    service.add_user(user, !unverified, !inactive).await?
                },
                None => service.create_user(email, &password, !unverified, !inactive).await?,
            };

            println!("created user {} ({})", user.email(), user.id());
        },
        Command::CreateRole { name, description } => {
            let role = service.add_role(RoleCreate { name, description }).await?;

            println!("created role {} ({})", role.name, role.id);
        },
        Command::AssignRole { email, role } => {
            let Some(user) = service.get_user_by_email(&email).await? else {
                bail!("user {email} not found");
            };
            let role = service.get_role_by_name(&role).await?;

            service.assign_role(user.id(), role.id).await?;

            println!("assigned role {} to {}", role.name, user.email());
        },
        Command::Migrate => {
            repository.migrate().await?;

            println!("schema is up to date");
        },
        Command::Serve { bind, admin_role } => {
            let app = UsersRouter::new(Arc::new(service), config)
                .user_management_guards(vec![roles_accepted(&[admin_role.as_str()])])
                .role_management_guards(vec![roles_accepted(&[admin_role.as_str()])])
                .build()?
                .layer(TraceLayer::new_for_http());

            let listener = tokio::net::TcpListener::bind(bind).await?;
            tracing::info!(%bind, "serving users API");

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                })
                .await?;
        },
    }

    Ok(())
}
