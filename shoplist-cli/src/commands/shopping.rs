//! Shopping list CLI commands.
//!
//! Every command loads the list from the server first, so item references
//! resolve against the current state.

use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shoplist_core::{upload_image, NewItem, ShoppingItem};

use super::{resolve_item, short_id, CommandError, OutputFormat};
use crate::remote::Session;

/// How often `watch` redraws when the list changed.
const WATCH_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Subcommand)]
pub enum ShoppingCommand {
    /// Show the shopping list
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Add an item to the list
    Add {
        /// Item name
        name: String,

        /// Unit (defaults to the configured default unit)
        #[arg(long, short)]
        unit: Option<String>,

        /// Quantity
        #[arg(long, short, default_value_t = 1)]
        qty: i64,

        /// Photo to attach
        #[arg(long, short)]
        image: Option<PathBuf>,
    },

    /// Remove an item from the list
    Remove {
        /// Item id, id prefix or name
        item: String,
    },

    /// Toggle an item's checked state
    Check {
        /// Item id, id prefix or name
        item: String,
    },

    /// Change an item's quantity; reaching zero removes it
    Qty {
        /// Item id, id prefix or name
        item: String,

        /// Amount to add (negative to subtract)
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },

    /// Rename an item
    Rename {
        /// Item id, id prefix or name
        item: String,

        /// New name
        name: String,
    },

    /// Remove all checked items
    ClearChecked,

    /// Finish the trip: archive every item to history and clear the list
    Complete,

    /// Keep showing the list as it changes
    Watch,
}

impl ShoppingCommand {
    pub async fn run(&self, session: &Session) -> Result<(), Box<dyn std::error::Error>> {
        let manager = session.manager();
        manager.load().await?;

        match self {
            ShoppingCommand::List { format } => {
                let items = display_order(manager.items());
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&items)?);
                    }
                    OutputFormat::Table => print_table(&items),
                }
            }

            ShoppingCommand::Add {
                name,
                unit,
                qty,
                image,
            } => {
                let image_url = match image {
                    Some(path) => attach_image(session, path).await?,
                    None => None,
                };
                let mut new_item = NewItem::new(name.clone())
                    .with_quantity(*qty)
                    .with_image_url(image_url);
                if let Some(unit) = unit {
                    new_item = new_item.with_unit(unit.clone());
                }

                let item = manager.add_item(new_item).await?;
                println!(
                    "Added {} ({} {}) [{}]",
                    item.name,
                    item.quantity,
                    item.unit,
                    short_id(&item.id)
                );
            }

            ShoppingCommand::Remove { item } => {
                let target = find(&manager.items(), item)?;
                manager.remove_item(&target.id).await?;
                println!("Removed {}", target.name);
            }

            ShoppingCommand::Check { item } => {
                let target = find(&manager.items(), item)?;
                let checked = manager.toggle_check(&target.id).await?;
                let state = if checked { "Checked" } else { "Unchecked" };
                println!("{} {}", state, target.name);
            }

            ShoppingCommand::Qty { item, delta } => {
                let target = find(&manager.items(), item)?;
                match manager.update_quantity(&target.id, *delta).await? {
                    Some(quantity) => {
                        println!("{}: {} {}", target.name, quantity, target.unit)
                    }
                    None => println!("Removed {}", target.name),
                }
            }

            ShoppingCommand::Rename { item, name } => {
                let target = find(&manager.items(), item)?;
                manager.update_name(&target.id, name).await?;
                println!("Renamed {} to {}", target.name, name.trim());
            }

            ShoppingCommand::ClearChecked => {
                let removed = manager.clear_checked().await?;
                println!("Removed {} checked item(s)", removed);
            }

            ShoppingCommand::Complete => match manager.clear_all().await? {
                Some(history_id) => {
                    println!("Trip archived to history [{}]", short_id(&history_id))
                }
                None => println!("Nothing to archive, the list is empty."),
            },

            ShoppingCommand::Watch => watch(session).await?,
        }

        for failure in manager.take_failures() {
            tracing::warn!("{} failed: {}", failure.description, failure.error);
        }

        Ok(())
    }
}

fn find(items: &[ShoppingItem], reference: &str) -> Result<ShoppingItem, CommandError> {
    resolve_item(items, reference).cloned()
}

/// Unchecked items first; creation order within each group.
fn display_order(mut items: Vec<ShoppingItem>) -> Vec<ShoppingItem> {
    items.sort_by_key(|item| item.checked);
    items
}

fn print_table(items: &[ShoppingItem]) {
    println!("Shopping List");
    println!("{}", "=".repeat(44));

    if items.is_empty() {
        println!("No items on the list.");
        return;
    }

    for item in items {
        let check = if item.checked { "[x]" } else { "[ ]" };
        let photo = if item.image_url.is_some() { " *" } else { "" };
        println!(
            "{} {:<25} {:>3} {:<4} {}{}",
            check,
            item.name,
            item.quantity,
            item.unit,
            short_id(&item.id),
            photo
        );
    }

    let checked = items.iter().filter(|i| i.checked).count();
    println!("{}", "-".repeat(44));
    println!("{} item(s), {} checked", items.len(), checked);
}

async fn attach_image(
    session: &Session,
    path: &Path,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CommandError::InvalidInput(format!("Not a file: {}", path.display())))?;
    let content_type = mime_guess::from_path(path).first().map(|m| m.to_string());

    let url = upload_image(
        session.store.as_ref(),
        file_name,
        bytes,
        content_type.as_deref(),
    )
    .await;
    if url.is_none() {
        eprintln!("Warning: photo upload failed, adding the item without it");
    }
    Ok(url)
}

async fn watch(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let manager = session.manager();
    let handle = manager.start().await?;

    let mut shown = display_order(manager.items());
    print_table(&shown);

    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if !handle.is_running() {
                    eprintln!("Change feed closed");
                    break;
                }
                let current = display_order(manager.items());
                if current != shown {
                    println!();
                    print_table(&current);
                    shown = current;
                }
            }
        }
    }

    handle.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: &str, checked: bool, minute: u32) -> ShoppingItem {
        ShoppingItem {
            id: id.into(),
            name: id.to_uppercase(),
            unit: "個".into(),
            quantity: 1,
            image_url: None,
            checked,
            created_at: Utc.with_ymd_and_hms(2026, 10, 1, 9, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_display_order_puts_unchecked_first() {
        let items = vec![
            item("a", true, 0),
            item("b", false, 1),
            item("c", true, 2),
            item("d", false, 3),
        ];
        let ids: Vec<String> = display_order(items).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }
}
