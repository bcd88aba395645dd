//! Portfolio CLI
//!
//! Terminal front end for the portfolio site's auth flow:
//! 1. Restores the session persisted by the last run
//! 2. Signs in with a password or the hosted login page
//! 3. Runs the route guard and the public/admin REST calls with the
//!    session's bearer token

mod cli;
mod config;
mod navigator;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use portfolio_auth::{CallbackParams, FileTokenStore, KeycloakProvider, SessionClient};
use portfolio_session::{ApiClient, AuthStore, Navigation, Route, RouteGuard};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Command, ExperienceQuery, ProjectQuery, SkillQuery};
use crate::config::Config;
use crate::navigator::TerminalNavigator;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = match cli::parse(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\n{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    let (config_path, explicit) = Config::resolve_path(args.config.as_deref());
    let config = if explicit {
        Config::load(&config_path)
    } else {
        Config::load_or_default(&config_path)
    }
    .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        keycloak = %config.keycloak.url,
        realm = %config.keycloak.realm,
        api = %config.api.base_url,
        storage = %config.storage.path.display(),
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .context("failed to build HTTP client")?;
    let store = Arc::new(
        FileTokenStore::load(config.storage.path.clone())
            .await
            .context("failed to open token store")?,
    );
    let session = SessionClient::new(
        Arc::new(KeycloakProvider::new(config.keycloak.clone(), http)),
        store.clone(),
        Arc::new(TerminalNavigator::new(std::io::stdout())),
    );
    let auth = Arc::new(AuthStore::new(session, store));

    run(args.command, &config, auth).await
}

async fn run(command: Command, config: &Config, auth: Arc<AuthStore>) -> Result<()> {
    match &command {
        Command::Login { username } => {
            let password = crate::config::read_password(std::io::stdin().lock())?;
            auth.login_with_credentials(username, &password)
                .await
                .context("login failed")?;
            let state = auth.snapshot();
            let name = state
                .user
                .as_ref()
                .map(|u| u.full_name.as_str())
                .unwrap_or(username.as_str());
            let role = if state.is_admin { "admin" } else { "user" };
            println!("Signed in as {name} ({role})");
            return Ok(());
        }
        Command::BrowserLogin => {
            auth.login().await.context("failed to start login")?;
            println!("Then run: portfolio-cli callback '<redirect URL>'");
            return Ok(());
        }
        Command::Callback { url } => {
            let params = CallbackParams::from_url(url)?;
            auth.complete_login(params)
                .await
                .context("failed to complete login")?;
            return print_json(&auth.snapshot());
        }
        _ => {}
    }

    auth.initialize().await;

    match command {
        Command::Status => print_json(&auth.snapshot()),
        Command::Logout => {
            auth.logout().await.context("logout failed")?;
            println!("Signed out");
            Ok(())
        }
        Command::Navigate { path } => {
            let Some(route) = Route::from_path(&path) else {
                bail!("no route matches {path}");
            };
            match RouteGuard::new(auth).before_each(route).await {
                Navigation::Allow => println!("{route}"),
                Navigation::Redirect(to) => println!("{route} -> {to}"),
            }
            Ok(())
        }
        Command::Projects(query) => {
            let api = ApiClient::new(&config.api.base_url, config.timeout(), auth)?;
            let projects = api.projects();
            match query {
                ProjectQuery::All => print_json(&projects.all().await?),
                ProjectQuery::Featured => print_json(&projects.featured().await?),
                ProjectQuery::Category(c) => print_json(&projects.by_category(&c).await?),
                ProjectQuery::Technology(t) => print_json(&projects.by_technology(&t).await?),
                ProjectQuery::Id(id) => print_json(&projects.by_id(id).await?),
            }
        }
        Command::Skills(query) => {
            let api = ApiClient::new(&config.api.base_url, config.timeout(), auth)?;
            let skills = api.skills();
            match query {
                SkillQuery::All => print_json(&skills.all().await?),
                SkillQuery::Category(c) => print_json(&skills.by_category(&c).await?),
                SkillQuery::Level(level) => print_json(&skills.by_level(level).await?),
                SkillQuery::Id(id) => print_json(&skills.by_id(id).await?),
            }
        }
        Command::Experiences(query) => {
            let api = ApiClient::new(&config.api.base_url, config.timeout(), auth)?;
            let experiences = api.experiences();
            match query {
                ExperienceQuery::All => print_json(&experiences.all().await?),
                ExperienceQuery::Current => print_json(&experiences.current().await?),
                ExperienceQuery::Id(id) => print_json(&experiences.by_id(id).await?),
            }
        }
        Command::Login { .. } | Command::BrowserLogin | Command::Callback { .. } => Ok(()),
    }
}
