use agenda_core::{Agenda, EventId, RelationKind, ToggleOutcome};
use anyhow::Result;
use owo_colors::OwoColorize;

pub async fn run(agenda: &Agenda, kind: RelationKind, event_id: EventId) -> Result<()> {
    super::start_signed_in(agenda).await?;

    let pending = match kind {
        RelationKind::Like => agenda.toggle_like(event_id)?,
        RelationKind::Confirm => agenda.toggle_attendance(event_id)?,
    };
    let member = pending.optimistic_member();
    let title = agenda
        .card(event_id)
        .map(|card| card.event.title.clone())
        .unwrap_or_else(|| format!("#{}", event_id));

    match pending.settled().await {
        ToggleOutcome::Committed => {
            let message = match (kind, member) {
                (RelationKind::Like, true) => "Liked",
                (RelationKind::Like, false) => "Unliked",
                (RelationKind::Confirm, true) => "Attending",
                (RelationKind::Confirm, false) => "No longer attending",
            };
            println!("{} {} {}", "✓".green(), message, title.bold());
            Ok(())
        }
        ToggleOutcome::RolledBack(e) => {
            anyhow::bail!("Could not update {}: {}", title, e)
        }
        ToggleOutcome::Superseded | ToggleOutcome::Discarded => {
            println!("{}", "Change was replaced before it completed".dimmed());
            Ok(())
        }
    }
}
