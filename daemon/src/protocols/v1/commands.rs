use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;
use thiserror::Error;

static PLAYER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,16}$").expect("valid PLAYER_NAME regex"));
static ITEM_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9_.\-]+:)?[a-z0-9_./\-]+$").expect("valid ITEM_ID regex")
});

/// Upper bound for a single `give`, a full inventory of 64-stacks.
pub const MAX_GIVE_AMOUNT: u32 = 64 * 36;
const BROADCAST_PREFIX: &str = "[📢] ";

/// Subscriber input that must not reach the server console.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid player name: {0:?}")]
    PlayerName(String),
    #[error("invalid item id: {0:?}")]
    ItemId(String),
    #[error("amount must be between 1 and {max}, got {0}", max = MAX_GIVE_AMOUNT)]
    Amount(u32),
    #[error("a player cannot be teleported to themselves")]
    SamePlayer,
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} must fit on a single line")]
    MultiLine(&'static str),
}

fn single_line<'a>(what: &'static str, text: &'a str) -> Result<&'a str, ValidationError> {
    if text.contains(['\n', '\r']) {
        return Err(ValidationError::MultiLine(what));
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::Empty(what));
    }
    Ok(text)
}

pub fn player_name(name: &str) -> Result<&str, ValidationError> {
    if PLAYER_NAME.is_match(name) {
        Ok(name)
    } else {
        Err(ValidationError::PlayerName(name.to_string()))
    }
}

/// A console command typed by an operator, trimmed.
pub fn console_command(command: &str) -> Result<&str, ValidationError> {
    single_line("command", command)
}

pub fn announcement_text(text: &str) -> Result<&str, ValidationError> {
    single_line("announcement", text)
}

pub fn give_command(player: &str, item: &str, amount: u32) -> Result<String, ValidationError> {
    let player = player_name(player)?;
    if !ITEM_ID.is_match(item) {
        return Err(ValidationError::ItemId(item.to_string()));
    }
    if amount == 0 || amount > MAX_GIVE_AMOUNT {
        return Err(ValidationError::Amount(amount));
    }
    Ok(format!("give {} {} {}", player, item, amount))
}

pub fn teleport_command(from: &str, to: &str) -> Result<String, ValidationError> {
    let from = player_name(from)?;
    let to = player_name(to)?;
    if from == to {
        return Err(ValidationError::SamePlayer);
    }
    Ok(format!("tp {} {}", from, to))
}

/// Chat line plus title and subtitle. The JSON text components are built
/// with serde_json so quotes and backslashes in the message stay inert.
pub fn broadcast_commands(message: &str) -> Result<Vec<String>, ValidationError> {
    let message = single_line("message", message)?;
    let chat = json!({ "text": format!("{}{}", BROADCAST_PREFIX, message), "color": "gold" });
    let title = json!({ "text": "📢", "color": "gold" });
    let subtitle = json!({ "text": message, "color": "yellow" });
    Ok(vec![
        format!("tellraw @a {}", chat),
        format!("title @a title {}", title),
        format!("title @a subtitle {}", subtitle),
    ])
}

/// The poll answered by a `Position` log line.
pub fn position_query(player: &str) -> String {
    format!("data get entity {} Pos", player)
}
