mod config_cmd;
mod history;
mod shopping;

pub use config_cmd::ConfigCommand;
pub use history::HistoryCommand;
pub use shopping::ShoppingCommand;

use clap::ValueEnum;
use shoplist_core::ShoppingItem;

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, PartialEq)]
pub enum CommandError {
    /// No item matched the reference
    NoMatch(String),
    /// Several items matched the reference
    Ambiguous(String, Vec<String>),
    /// Something the user passed could not be used
    InvalidInput(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NoMatch(reference) => write!(f, "No item matches '{}'", reference),
            CommandError::Ambiguous(reference, names) => write!(
                f,
                "'{}' matches several items: {}. Use the item id instead.",
                reference,
                names.join(", ")
            ),
            CommandError::InvalidInput(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CommandError {}

/// Finds the item a user meant: an exact id, a unique id prefix, or a
/// case-insensitive name.
pub fn resolve_item<'a>(
    items: &'a [ShoppingItem],
    reference: &str,
) -> Result<&'a ShoppingItem, CommandError> {
    if let Some(item) = items.iter().find(|i| i.id == reference) {
        return Ok(item);
    }

    let by_prefix: Vec<&ShoppingItem> = items
        .iter()
        .filter(|i| i.id.starts_with(reference))
        .collect();
    if by_prefix.len() == 1 {
        return Ok(by_prefix[0]);
    }

    let wanted = reference.trim().to_lowercase();
    let by_name: Vec<&ShoppingItem> = items
        .iter()
        .filter(|i| i.name.to_lowercase() == wanted)
        .collect();
    match by_name.len() {
        1 => Ok(by_name[0]),
        0 if by_prefix.len() > 1 => Err(CommandError::Ambiguous(
            reference.to_string(),
            by_prefix.iter().map(|i| i.id.clone()).collect(),
        )),
        0 => Err(CommandError::NoMatch(reference.to_string())),
        _ => Err(CommandError::Ambiguous(
            reference.to_string(),
            by_name.iter().map(|i| short_id(&i.id).to_string()).collect(),
        )),
    }
}

/// First eight characters of an id, enough to tell items apart in a table.
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(end, _)| &id[..end])
}
