//! imagedephi - command line client for image item annotations.
//!
//! Logs in against the annotation server, keeps the session token in a
//! cookie file between runs, and fetches or updates an item's tile metadata
//! and redaction annotations.

mod cli;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use imagedephi_core::api::{ItemApi, SessionClient};
use imagedephi_core::auth::{AuthError, AuthSessionManager, CookieJar, FileCookieJar, TokenStore};
use imagedephi_core::config::Config;
use imagedephi_core::models::GirderKeyspace;

use cli::{Opts, OptsCmd};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let opts = Opts::parse();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    if let Some(ref url) = opts.global.url {
        config.base_url = url.clone();
    }
    let data_dir = match opts.global.data_dir {
        Some(ref dir) => dir.clone(),
        None => config.data_dir()?,
    };
    debug!(base_url = %config.base_url, ?data_dir, "Config loaded");

    let jar: Arc<dyn CookieJar> = Arc::new(FileCookieJar::new(data_dir));
    let store = Arc::new(TokenStore::restore(&*jar));
    let client = SessionClient::from_config(&config, store)?;
    let manager = AuthSessionManager::new(client, jar);

    if opts.cmd.needs_session() {
        match manager.spawn_revalidate().await? {
            Ok(session) if session.is_authenticated() => debug!("Stored session is valid"),
            Ok(_) => debug!("No stored session"),
            Err(e) => warn!(error = %e, "Stored session is no longer valid"),
        }
    }

    match opts.cmd {
        OptsCmd::Login { username } => login(&manager, &mut config, username).await,
        OptsCmd::Logout => {
            manager.logout().await;
            println!("Logged out.");
            Ok(())
        }
        OptsCmd::Whoami => {
            match manager.session().user() {
                Some(user) => {
                    let role = if user.admin { " (admin)" } else { "" };
                    println!("{} [{}]{}", user.login, user.id, role);
                }
                None => println!("Not logged in."),
            }
            Ok(())
        }
        OptsCmd::Tiles { item_id } => {
            let meta = ItemApi::new(&manager).tile_metadata(&item_id).fetch().await?;
            let (across, down) = meta.tile_grid();
            println!("{}", serde_json::to_string_pretty(&meta)?);
            println!("{} x {} tiles at full resolution", across, down);
            Ok(())
        }
        OptsCmd::Geojson { item_id } => {
            let item = ItemApi::new(&manager).geojson(&item_id).fetch().await?;
            println!("{}", serde_json::to_string_pretty(&item.meta.imagedephi.geojson)?);
            Ok(())
        }
        OptsCmd::Images { item_id } => {
            for name in ItemApi::new(&manager).related_image_urls(&item_id).fetch().await? {
                println!("{}", name);
            }
            Ok(())
        }
        OptsCmd::PutGeojson { item_id, file } => {
            if !manager.session().is_authenticated() {
                anyhow::bail!("Not logged in. Run `imagedephi login` first.");
            }
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let keyspace: GirderKeyspace =
                serde_json::from_str(&contents).context("Failed to parse GeoJSON keyspace")?;
            ItemApi::new(&manager).put_geojson(&item_id).put(&keyspace).await?;
            println!("Annotations updated.");
            Ok(())
        }
    }
}

async fn login(manager: &AuthSessionManager, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(u) => u,
        None => prompt_username()?,
    };
    let password = match std::env::var("IMAGEDEPHI_PASSWORD") {
        Ok(p) if !p.is_empty() => p,
        _ => rpassword::prompt_password(format!("Password for {}: ", username))?,
    };

    match manager.login(&username, &password).await {
        Ok(_) => {
            config.last_username = Some(username.clone());
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            info!("Login successful");
            println!("Logged in as {}.", username);
            Ok(())
        }
        Err(AuthError::InvalidCredentials) => anyhow::bail!("Invalid username or password"),
        Err(AuthError::Network(e)) => {
            Err(e).context("Unable to connect to server. Check the server URL and your connection.")
        }
        Err(e) => Err(e).context("Login failed"),
    }
}

fn prompt_username() -> Result<String> {
    use std::io::Write;

    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}
