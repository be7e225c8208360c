use anyhow::{Context, Result};
use colored::Colorize;
use octofhir_conformance::smart::{
    LaunchSequence, RedirectParams, authorization_url, discover_endpoints,
};
use octofhir_conformance::{ConformanceConfig, SessionStore, TestSession};

use crate::cli::{AuthorizeArgs, CallbackArgs, OutputFormat};
use crate::config::{make_client, session_store};
use crate::output::{print_success, print_suite};

pub async fn authorize(
    cfg: &ConformanceConfig,
    args: &AuthorizeArgs,
    session_name: &str,
) -> Result<()> {
    let client = make_client(cfg)?;
    let endpoints = discover_endpoints(&client, &cfg.smart)
        .await
        .context("Could not determine the OAuth endpoints")?;

    let mut session = TestSession::with_id(session_name, &cfg.server.base_url);
    let url = authorization_url(&endpoints, &cfg.smart, &mut session, args.launch.as_deref())?;
    session_store()?.save(&session).await?;

    print_success(&format!("Started launch for session {}", session_name.cyan()));
    println!("Open this URL in a browser and authorize the app:\n\n  {url}\n");
    println!(
        "Then run: octofhir-conformance launch callback --session {session_name} '<redirect url>'"
    );
    Ok(())
}

/// Returns whether any check failed.
pub async fn callback(
    cfg: &ConformanceConfig,
    args: &CallbackArgs,
    session_name: &str,
    format: OutputFormat,
) -> Result<bool> {
    let store = session_store()?;
    let mut session = store.load(session_name).await.with_context(|| {
        format!("No launch in progress for session {session_name}; run `launch authorize` first")
    })?;
    let redirect = RedirectParams::from_url(&args.redirect_url)?;

    let client = make_client(cfg)?;
    let endpoints = discover_endpoints(&client, &cfg.smart)
        .await
        .context("Could not determine the OAuth endpoints")?;

    let mut launch = LaunchSequence::new(&client, &endpoints, &cfg.smart);
    let suite = launch.run(&redirect, &mut session).await;
    tracing::info!(session = %session.id, state = ?launch.state(), "launch finished");
    store.update(&session).await?;

    print_suite(&suite, format)?;
    Ok(suite.has_failures())
}
