//! Purchase history commands.

use clap::{Args, Subcommand};

use shoplist_core::{HistoryEntry, HistoryProduct, NewItem, Selection, SyncError};

use super::{short_id, CommandError, OutputFormat};
use crate::remote::Session;

#[derive(Args)]
pub struct HistoryCommand {
    #[command(subcommand)]
    pub command: HistorySubcommand,
}

#[derive(Subcommand)]
pub enum HistorySubcommand {
    /// List past trips, newest first
    List {
        /// Show each product once, with its most recent unit and photo
        #[arg(long)]
        dedup: bool,

        /// Output format
        #[arg(long, short, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Put past purchases back on the list
    Add {
        /// Trip id or id prefix; without NAMEs the whole trip is added
        #[arg(long, short)]
        trip: Option<String>,

        /// Product names
        names: Vec<String>,
    },

    /// Forget a product: its snapshots, unused photos and emptied trips
    Remove {
        /// Product name
        name: String,
    },

    /// Finish interrupted archives and drop empty trips
    Sweep,
}

impl HistoryCommand {
    pub async fn run(&self, session: &Session) -> Result<(), Box<dyn std::error::Error>> {
        let history = &session.history;

        match &self.command {
            HistorySubcommand::List { dedup, format } => {
                if *dedup {
                    let products = history.products().await?;
                    match format {
                        OutputFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&products)?)
                        }
                        OutputFormat::Table => print_products(&products),
                    }
                } else {
                    let entries = history.entries().await?;
                    match format {
                        OutputFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&entries)?)
                        }
                        OutputFormat::Table => print_entries(&entries),
                    }
                }
            }

            HistorySubcommand::Add { trip, names } => {
                history.manager().load().await?;
                let added = match trip {
                    Some(trip) => {
                        let entries = history.entries().await?;
                        let selection = select_from_trip(&entries, trip, names)?;
                        history.add_to_list(selection.resolve(&entries)).await?
                    }
                    None => {
                        let products = history.products().await?;
                        let items = pick_products(&products, names)?;
                        history.manager().add_items(items).await?
                    }
                };
                for item in &added {
                    println!("Added {} ({} {})", item.name, item.quantity, item.unit);
                }
            }

            HistorySubcommand::Remove { name } => {
                let report = match history.remove_product(name).await {
                    Ok(report) => report,
                    Err(SyncError::CascadeIncomplete { stage, source, plan, .. }) => {
                        tracing::warn!("removal stopped during {}: {}; retrying", stage, source);
                        history.resume_removal(*plan).await?
                    }
                    Err(e) => return Err(e.into()),
                };
                println!(
                    "Removed {} snapshot(s), {} photo(s), {} empty trip(s)",
                    report.snapshots,
                    report.images.len(),
                    report.trips.len()
                );
            }

            HistorySubcommand::Sweep => {
                let manager = history.manager();
                manager.load().await?;
                let sweep = manager.resume_archives().await?;
                let emptied = history.sweep_empty_trips().await?;
                println!(
                    "Completed {} archive(s), discarded {} stale archive(s), removed {} empty trip(s)",
                    sweep.completed.len(),
                    sweep.discarded.len(),
                    emptied.len()
                );
            }
        }

        Ok(())
    }
}

/// Selects the snapshots of one trip: all of them, or those named.
fn select_from_trip(
    entries: &[HistoryEntry],
    trip: &str,
    names: &[String],
) -> Result<Selection, CommandError> {
    let matching: Vec<&HistoryEntry> = entries
        .iter()
        .filter(|e| e.id.starts_with(trip))
        .collect();
    let entry = match matching.as_slice() {
        [entry] => *entry,
        [] => return Err(CommandError::NoMatch(trip.to_string())),
        many => {
            return Err(CommandError::Ambiguous(
                trip.to_string(),
                many.iter().map(|e| short_id(&e.id).to_string()).collect(),
            ))
        }
    };

    let mut selection = Selection::new();
    if names.is_empty() {
        selection.toggle_all_in(entry);
        return Ok(selection);
    }

    for name in names {
        let wanted = name.trim().to_lowercase();
        let index = entry
            .items
            .iter()
            .position(|i| i.name.to_lowercase() == wanted)
            .ok_or_else(|| CommandError::NoMatch(name.clone()))?;
        selection.toggle(&entry.id, index);
    }
    Ok(selection)
}

fn pick_products(products: &[HistoryProduct], names: &[String]) -> Result<Vec<NewItem>, CommandError> {
    if names.is_empty() {
        return Err(CommandError::InvalidInput(
            "Name at least one product, or pass --trip".to_string(),
        ));
    }
    names
        .iter()
        .map(|name| {
            products
                .iter()
                .find(|p| p.name.to_lowercase() == name.trim().to_lowercase())
                .map(HistoryProduct::to_new_item)
                .ok_or_else(|| CommandError::NoMatch(name.clone()))
        })
        .collect()
}

fn print_entries(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("No shopping history yet.");
        return;
    }

    for entry in entries {
        let local = entry.completed_at.with_timezone(&chrono::Local);
        println!(
            "{} [{}] {}",
            local.format("%Y-%m-%d %H:%M"),
            short_id(&entry.id),
            entry.status.as_str()
        );
        for item in &entry.items {
            println!("    {:<25} {:>3} {}", item.name, item.quantity, item.unit);
        }
    }
}

fn print_products(products: &[HistoryProduct]) {
    if products.is_empty() {
        println!("No shopping history yet.");
        return;
    }

    println!("{:<25} {:>3} {:<4} Last bought", "Product", "Qty", "Unit");
    println!("{}", "-".repeat(52));
    for product in products {
        println!(
            "{:<25} {:>3} {:<4} {}",
            product.name,
            product.quantity,
            product.unit,
            product.last_used.with_timezone(&chrono::Local).format("%Y-%m-%d")
        );
    }
}
