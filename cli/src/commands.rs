use crate::cli::{Cli, Commands, LoginSpnArgs, TokenArgs, TokenTarget};
use crate::config::AppConfig;
use anyhow::Context;
use engine::{CacheSummary, Credential, DeploymentRing, Engine, EngineError, SignInSummary};
use std::fmt::Write as _;
use std::io::Write;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Builds the engine from configuration and runs one command against it.
pub async fn run(cli: Cli, config: &AppConfig) -> anyhow::Result<u8> {
    let engine = Engine::with_defaults(config.engine().clone())
        .context("Failed to initialize the credential engine")?;
    let mut stdout = std::io::stdout().lock();
    execute(&engine, cli.command, config, &mut stdout).await
}

/// Runs `command`, printing results to `out`, and returns the exit code.
pub async fn execute<W: Write>(
    engine: &Engine,
    command: Commands,
    config: &AppConfig,
    out: &mut W,
) -> anyhow::Result<u8> {
    match command {
        Commands::Login { ring } => {
            let ring = login_ring(ring, config);
            log::info!("Signing in against {ring}");
            let summary = engine
                .acquire_and_populate(ring)
                .await
                .context("Sign-in failed")?;
            out.write_all(format_sign_in(&summary).as_bytes())?;
        }
        Commands::LoginSpn(LoginSpnArgs {
            tenant,
            app_id,
            app_key,
            ring,
        }) => {
            let ring = login_ring(ring, config);
            let credential = engine
                .acquire_by_service_principal(&tenant, &app_id, &app_key, ring)
                .await
                .context("Service principal sign-in failed")?;
            writeln!(
                out,
                "Signed in as {} (Tenant: {})",
                credential.user_id, credential.tenant_id
            )?;
        }
        Commands::Clear => {
            let removed = engine.clear_cache().await?;
            for path in &removed {
                log::debug!("Removed {}", path.display());
            }
            writeln!(out, "Removed {} cache file(s)", removed.len())?;
        }
        Commands::Dump => {
            let summaries = engine.dump_cache().await?;
            out.write_all(format_dump(&summaries).as_bytes())?;
        }
        Commands::Token(args) => {
            let credential = resolve_token(engine, &args).await?;
            writeln!(out, "{}", credential.authorization_header())?;
        }
        Commands::Status => {
            if engine.is_cache_valid().await? {
                writeln!(out, "Token cache is valid")?;
            } else {
                writeln!(out, "No signed-in credentials in the token cache")?;
                return Ok(EXIT_FAILURE);
            }
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Ring for a sign-in: the flag, then configuration, then production.
pub fn login_ring(flag: Option<DeploymentRing>, config: &AppConfig) -> DeploymentRing {
    flag.or(config.engine().ring).unwrap_or_default()
}

async fn resolve_token(
    engine: &Engine,
    args: &TokenArgs,
) -> anyhow::Result<Credential> {
    let result = match args.target() {
        TokenTarget::Tenant(id) => engine.get_by_tenant(&id).await,
        TokenTarget::Subscription(id) => engine.get_by_subscription(&id).await,
        TokenTarget::Recent => engine.get_recent_token().await,
    };
    result.map_err(with_sign_in_hint)
}

fn with_sign_in_hint(error: EngineError) -> anyhow::Error {
    if error.requires_sign_in() {
        anyhow::Error::new(error).context("No cached credential; run `csmauth login` first")
    } else {
        error.into()
    }
}

pub fn format_sign_in(summary: &SignInSummary) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "Welcome {} (Tenant: {})",
        summary.user_id, summary.home_tenant_id
    );
    let _ = writeln!(
        text,
        "User belongs to {} tenants",
        summary.tenants.len() + summary.skipped.len()
    );
    for tenant in &summary.tenants {
        let _ = writeln!(
            text,
            "\t{} {} ({}), {} subscription(s)",
            tenant.tenant_id,
            tenant.display_name,
            tenant.domain,
            tenant.subscriptions.len()
        );
    }
    if !summary.skipped.is_empty() {
        let _ = writeln!(
            text,
            "Could not acquire a token for: {}",
            summary.skipped.join(", ")
        );
    }
    text
}

pub fn format_dump(summaries: &[CacheSummary]) -> String {
    let mut text = String::new();
    for summary in summaries {
        let _ = writeln!(
            text,
            "User: {}, Tenant: {} {} ({})",
            summary.user_id, summary.tenant_id, summary.display_name, summary.domain
        );
        if summary.subscriptions.is_empty() {
            let _ = writeln!(text, "\tThere is no subscription");
            continue;
        }
        let _ = writeln!(
            text,
            "\tThere are {} subscriptions",
            summary.subscriptions.len()
        );
        for subscription in &summary.subscriptions {
            let _ = writeln!(
                text,
                "\tSubscription {} ({})",
                subscription.subscription_id, subscription.display_name
            );
        }
    }
    text
}
