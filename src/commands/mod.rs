pub mod account;
pub mod events;
pub mod lists;
pub mod toggle;
pub mod watch;

use agenda_core::{Agenda, SyncReport, UserId};
use anyhow::Result;
use owo_colors::OwoColorize;

use crate::utils::tui::create_spinner;

/// Restore the session and load everything, behind a spinner.
pub async fn start(agenda: &Agenda) -> Result<Option<UserId>> {
    let spinner = create_spinner("Loading events");
    let result = agenda.start().await;
    spinner.finish_and_clear();

    let report = result?;
    print_failures(&report);
    Ok(report.user)
}

/// Like [`start`], but fails unless someone is signed in.
pub async fn start_signed_in(agenda: &Agenda) -> Result<UserId> {
    match start(agenda).await? {
        Some(user) => Ok(user),
        None => anyhow::bail!(
            "Not logged in.\n\n\
            Sign in with:\n  \
            agenda login <email>"
        ),
    }
}

/// Relation sets that failed to load are shown as warnings; the rest of the
/// command still runs on what did load.
pub fn print_failures(report: &SyncReport) {
    for (kind, error) in &report.failures {
        eprintln!(
            "{} could not load {} set: {}",
            "warning:".yellow(),
            kind,
            error
        );
    }
}
