use agenda_core::{Agenda, DateWindow};
use anyhow::Result;
use owo_colors::OwoColorize;

use crate::render::{Render, format_date_label};

pub async fn run(agenda: &Agenda, search: Option<&str>, range: DateWindow) -> Result<()> {
    super::start(agenda).await?;

    let ids: Vec<_> = agenda
        .cards(search, range)
        .iter()
        .filter_map(|card| card.event.id)
        .collect();
    agenda.refresh_headcounts(ids).await;

    // Rebuilt after the headcount refresh so the counts are filled in.
    let cards = agenda.cards(search, range);
    if cards.is_empty() {
        println!("{}", "No events found".dimmed());
        return Ok(());
    }

    let today = chrono::Local::now().date_naive();
    let mut current_label: Option<String> = None;

    for card in &cards {
        let label = format_date_label(card.event.date, today);
        if current_label.as_ref() != Some(&label) {
            if current_label.is_some() {
                println!();
            }
            println!("{}", label.bold());
            current_label = Some(label);
        }
        println!("{}", card.render());
    }

    if agenda.current_user().is_none() {
        println!(
            "\n{}",
            "Log in with `agenda login <email>` to like events and confirm attendance".dimmed()
        );
    }
    Ok(())
}
