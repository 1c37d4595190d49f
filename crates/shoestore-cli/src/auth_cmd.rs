//! Auth commands: login, logout, status.
//!
//! User-facing output uses writeln! (this is a CLI binary, not debug output).

use std::io::{self, Write};

use shoestore_auth::{AuthStatus, SessionController, SessionSnapshot};

use crate::context::AppContext;

/// Sign in and print the resulting profile.
pub async fn login(
    ctx: &AppContext,
    email: &str,
    password: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let controller = ctx.controller().await?;
    let result = controller.sign_in(email, password).await;
    controller.shutdown().await;

    let snapshot = result.map_err(|e| anyhow::anyhow!("Login failed: {e}"))?;
    write_snapshot(out, &snapshot)?;
    Ok(())
}

pub async fn logout(ctx: &AppContext, out: &mut impl Write) -> anyhow::Result<()> {
    let controller = ctx.controller().await?;
    let snapshot = settled(ctx, &controller).await;
    controller.sign_out().await;
    controller.shutdown().await;

    if snapshot.session.is_some() {
        writeln!(out, "Signed out")?;
    } else {
        writeln!(out, "Not signed in")?;
    }
    Ok(())
}

/// Print the restored session, once the controller has settled.
pub async fn status(ctx: &AppContext, out: &mut impl Write) -> anyhow::Result<()> {
    let controller = ctx.controller().await?;
    let snapshot = settled(ctx, &controller).await;
    controller.shutdown().await;
    write_snapshot(out, &snapshot)?;
    Ok(())
}

async fn settled(ctx: &AppContext, controller: &SessionController) -> SessionSnapshot {
    let ceiling = ctx.controller_config().loading_ceiling;
    controller
        .wait_until(|s| s.status != AuthStatus::Loading && !s.loading, ceiling)
        .await
        .unwrap_or_else(|_| controller.snapshot())
}

pub fn write_snapshot(out: &mut impl Write, snapshot: &SessionSnapshot) -> io::Result<()> {
    match (snapshot.status, &snapshot.session, &snapshot.profile) {
        (AuthStatus::AuthenticatedWithProfile, Some(session), Some(profile)) => {
            writeln!(out, "Signed in as {} <{}>", profile.full_name, profile.email)?;
            writeln!(out, "Role: {}", profile.role)?;
            writeln!(out, "User ID: {}", session.user.id)?;
            writeln!(out, "Session expires at: {}", session.expires_at)
        }
        (AuthStatus::AuthenticatedNoProfile, Some(session), _) => {
            writeln!(out, "Signed in as {} (profile unavailable)", session.user.email)?;
            writeln!(out, "User ID: {}", session.user.id)
        }
        (AuthStatus::Loading, _, _) => writeln!(out, "Session still loading"),
        _ => writeln!(out, "Not signed in"),
    }
}
