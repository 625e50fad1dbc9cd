use std::sync::Arc;

use agenda_core::{Agenda, Event};
use anyhow::Result;
use owo_colors::OwoColorize;

use crate::render::{Render, format_date_label};

pub async fn agenda(agenda: &Agenda) -> Result<()> {
    super::start_signed_in(agenda).await?;
    print_by_day(&agenda.my_agenda(), "You have not confirmed any events");
    Ok(())
}

pub async fn liked(agenda: &Agenda) -> Result<()> {
    super::start_signed_in(agenda).await?;
    print_by_day(&agenda.liked_events(), "You have not liked any events");
    Ok(())
}

fn print_by_day(events: &[Arc<Event>], empty: &str) {
    if events.is_empty() {
        println!("{}", empty.dimmed());
        return;
    }

    let today = chrono::Local::now().date_naive();
    for event in events {
        println!(
            "{} {}",
            format_date_label(event.date, today).bold(),
            event.render()
        );
    }
}
