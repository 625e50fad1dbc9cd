use agenda_core::Agenda;
use anyhow::Result;
use owo_colors::OwoColorize;

use crate::utils::tui::create_spinner;

pub async fn login(agenda: &Agenda, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;

    // Catalog first, so relation sets get pruned against it.
    super::start(agenda).await?;

    let spinner = create_spinner(format!("Signing in as {email}"));
    let result = agenda.login(email, &password).await;
    spinner.finish_and_clear();
    let report = result?;
    super::print_failures(&report);

    if let Some(user) = report.user {
        println!("Logged in as user {}", user.bold());
    }
    println!(
        "  {} liked, {} confirmed",
        agenda.favorites().len(),
        agenda.attendance().len()
    );
    Ok(())
}

pub fn logout(agenda: &Agenda) -> Result<()> {
    if agenda.session().restore()?.is_none() {
        println!("{}", "Not logged in".dimmed());
        return Ok(());
    }

    agenda.logout()?;
    println!("Logged out");
    Ok(())
}

pub async fn whoami(agenda: &Agenda) -> Result<()> {
    if agenda.session().restore()?.is_none() {
        println!("{}", "Not logged in".dimmed());
        return Ok(());
    }

    let profile = agenda.profile().await?;
    let name = profile.name.as_deref().unwrap_or("(no name)");
    println!("{} {}", name.bold(), format!("#{}", profile.id).dimmed());
    if let Some(email) = &profile.email {
        println!("  {email}");
    }
    Ok(())
}
