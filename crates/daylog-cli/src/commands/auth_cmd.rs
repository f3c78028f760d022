use std::io::{self, BufRead};

use daylog_core::LogDate;

use crate::cli::CredentialArgs;
use crate::commands::common::{AppContext, DayView};
use crate::error::CliError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthAction {
    SignUp,
    SignIn,
}

pub async fn run_auth(
    ctx: &AppContext,
    action: AuthAction,
    credentials: CredentialArgs,
) -> Result<(), CliError> {
    let password = match credentials.password {
        Some(password) => password,
        None => read_password_line()?,
    };
    if password.is_empty() {
        return Err(CliError::EmptyPassword);
    }

    match action {
        AuthAction::SignUp => ctx.remote.sign_up(&credentials.username, &password).await?,
        AuthAction::SignIn => ctx.remote.sign_in(&credentials.username, &password).await?,
    }
    println!("Signed in as {}", credentials.username.trim());

    // A fresh orchestrator has no active date, so this reconciles today.
    let sync = ctx.orchestrator();
    sync.login().await;
    sync.flush().await;
    let view = DayView::from_snapshot(LogDate::today(), sync.snapshot());
    println!("{} [{}]", view.date, view.status);
    Ok(())
}

pub fn run_logout(ctx: &AppContext) -> Result<(), CliError> {
    ctx.remote.sign_out()?;
    println!("Signed out");
    Ok(())
}

fn read_password_line() -> Result<String, CliError> {
    eprint!("Password: ");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
