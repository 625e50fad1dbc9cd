use std::time::Duration;

use agenda_core::Agenda;
use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::warn;

use crate::render::Render;

pub async fn run(agenda: &Agenda, interval: u64) -> Result<()> {
    let mut updates = agenda.subscribe();
    super::start(agenda).await?;

    println!(
        "{}",
        format!("Watching for changes every {interval}s, Ctrl-C to stop").dimmed()
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    // The first tick fires immediately and start() just loaded everything.
    ticker.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                if let Err(e) = agenda.refresh_catalog().await {
                    warn!(error = %e, "Catalog refresh failed");
                }
                if agenda.current_user().is_some() {
                    // Per-set failures arrive on the stream as RelationLoadFailed.
                    if let Err(e) = agenda.refresh_relations().await {
                        warn!(error = %e, "Relation refresh failed");
                    }
                }
            }
            update = updates.recv() => match update {
                Some(update) => println!("{}", update.render()),
                None => break,
            },
        }
    }
    Ok(())
}
