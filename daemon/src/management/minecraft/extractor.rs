use log::debug;
use regex::{Captures, Regex};
use std::sync::{Arc, LazyLock};

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ANSI_ESCAPE regex"));

/// Event categories in evaluation order. Every category is evaluated for
/// every line; inside a category the first matching pattern wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    PlayerJoin,
    PlayerLeave,
    PlayerCount,
    PlayerList,
    Position,
    Teleport,
    Dimension,
    Death,
    Kill,
    Achievement,
    Command,
    ServerOverload,
    ServerReady,
    ServerStopping,
}

impl EventCategory {
    pub const ALL: [EventCategory; 14] = [
        EventCategory::PlayerJoin,
        EventCategory::PlayerLeave,
        EventCategory::PlayerCount,
        EventCategory::PlayerList,
        EventCategory::Position,
        EventCategory::Teleport,
        EventCategory::Dimension,
        EventCategory::Death,
        EventCategory::Kill,
        EventCategory::Achievement,
        EventCategory::Command,
        EventCategory::ServerOverload,
        EventCategory::ServerReady,
        EventCategory::ServerStopping,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum TeleportTarget {
    Player(String),
    Coords { x: f64, y: f64, z: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    PlayerJoin { player: String },
    PlayerLeave { player: String },
    PlayerCount { online: u32, max: u32 },
    PlayerList { players: Vec<String> },
    Position { player: String, x: f64, y: f64, z: f64 },
    Teleport { player: String, target: TeleportTarget },
    Dimension { player: String, world: String },
    Death { player: String, message: String },
    Kill { killer: String, victim: String },
    Achievement { player: String, achievement: String },
    Command { player: String },
    ServerOverload,
    ServerReady,
    ServerStopping,
    /// Emitted once for every line, matched or not.
    Line { text: String },
}

impl LogEvent {
    /// `None` for the catch-all [`LogEvent::Line`].
    pub fn category(&self) -> Option<EventCategory> {
        Some(match self {
            LogEvent::PlayerJoin { .. } => EventCategory::PlayerJoin,
            LogEvent::PlayerLeave { .. } => EventCategory::PlayerLeave,
            LogEvent::PlayerCount { .. } => EventCategory::PlayerCount,
            LogEvent::PlayerList { .. } => EventCategory::PlayerList,
            LogEvent::Position { .. } => EventCategory::Position,
            LogEvent::Teleport { .. } => EventCategory::Teleport,
            LogEvent::Dimension { .. } => EventCategory::Dimension,
            LogEvent::Death { .. } => EventCategory::Death,
            LogEvent::Kill { .. } => EventCategory::Kill,
            LogEvent::Achievement { .. } => EventCategory::Achievement,
            LogEvent::Command { .. } => EventCategory::Command,
            LogEvent::ServerOverload => EventCategory::ServerOverload,
            LogEvent::ServerReady => EventCategory::ServerReady,
            LogEvent::ServerStopping => EventCategory::ServerStopping,
            LogEvent::Line { .. } => return None,
        })
    }
}

/// Turns the captures of a matching pattern into an event. Returning `None`
/// counts as "no match" and the next pattern of the category is tried.
pub type Extractor = Arc<dyn Fn(&Captures<'_>, &str) -> Option<LogEvent> + Send + Sync>;

pub struct PatternEntry {
    pub category: EventCategory,
    pub name: String,
    regex: Regex,
    extract: Extractor,
}

impl PatternEntry {
    pub fn new(
        category: EventCategory,
        name: impl Into<String>,
        pattern: &str,
        extract: Extractor,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            category,
            name: name.into(),
            regex: Regex::new(pattern)?,
            extract,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

fn text(caps: &Captures<'_>, i: usize) -> Option<String> {
    caps.get(i).map(|m| m.as_str().to_string())
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

fn coords(caps: &Captures<'_>, first: usize) -> Option<(f64, f64, f64)> {
    Some((
        number(caps, first)?,
        number(caps, first + 1)?,
        number(caps, first + 2)?,
    ))
}

fn player_join(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    Some(LogEvent::PlayerJoin {
        player: text(caps, 1)?,
    })
}

fn player_leave(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    Some(LogEvent::PlayerLeave {
        player: text(caps, 1)?,
    })
}

fn player_count(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    Some(LogEvent::PlayerCount {
        online: number(caps, 1)?,
        max: number(caps, 2)?,
    })
}

fn player_list(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    let players = caps
        .get(1)?
        .as_str()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    Some(LogEvent::PlayerList { players })
}

fn position(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    let (x, y, z) = coords(caps, 2)?;
    Some(LogEvent::Position {
        player: text(caps, 1)?,
        x,
        y,
        z,
    })
}

fn teleport_coords(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    let (x, y, z) = coords(caps, 2)?;
    Some(LogEvent::Teleport {
        player: text(caps, 1)?,
        target: TeleportTarget::Coords { x, y, z },
    })
}

fn teleport_player(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    Some(LogEvent::Teleport {
        player: text(caps, 1)?,
        target: TeleportTarget::Player(text(caps, 2)?),
    })
}

fn dimension(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    Some(LogEvent::Dimension {
        player: text(caps, 1)?,
        world: text(caps, 2)?,
    })
}

fn death(caps: &Captures<'_>, line: &str) -> Option<LogEvent> {
    let start = caps.get(0)?.start();
    Some(LogEvent::Death {
        player: text(caps, 1)?,
        message: line[start..].trim_end().to_string(),
    })
}

fn kill(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    Some(LogEvent::Kill {
        victim: text(caps, 1)?,
        killer: text(caps, 2)?,
    })
}

fn achievement(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    Some(LogEvent::Achievement {
        player: text(caps, 1)?,
        achievement: text(caps, 3)?,
    })
}

fn command(caps: &Captures<'_>, _: &str) -> Option<LogEvent> {
    Some(LogEvent::Command {
        player: text(caps, 1)?,
    })
}

const DEATH_SHAPES: [&str; 20] = [
    "was slain",
    "was killed",
    "drowned",
    "fell",
    "burned",
    "tried to swim in lava",
    "suffocated",
    "starved",
    "was blown up",
    "was shot",
    "withered",
    "was pricked",
    "walked into a cactus",
    "was roasted",
    "was impaled",
    "was squished",
    "experienced kinetic energy",
    "was poked",
    "was stung",
    "was squashed",
];

type ExtractFn = fn(&Captures<'_>, &str) -> Option<LogEvent>;

struct Builtin {
    category: EventCategory,
    name: String,
    pattern: String,
    extract: ExtractFn,
}

fn builtin(category: EventCategory, name: &str, pattern: &str, extract: ExtractFn) -> Builtin {
    Builtin {
        category,
        name: name.to_string(),
        pattern: pattern.to_string(),
        extract,
    }
}

fn builtin_patterns() -> Vec<Builtin> {
    use EventCategory::*;

    let mut table = vec![
        builtin(PlayerJoin, "join_login", r"(\w+)\[.*\] logged in", player_join),
        builtin(PlayerJoin, "join_game", r"(\w+) joined the game", player_join),
        builtin(PlayerLeave, "leave_game", r"(\w+) left the game", player_leave),
        builtin(PlayerLeave, "leave_lost", r"(\w+) lost connection", player_leave),
        builtin(
            PlayerCount,
            "player_count",
            r"There are (\d+) of a max of (\d+) players online",
            player_count,
        ),
        builtin(PlayerList, "player_list", r"players online:(.*)$", player_list),
        builtin(
            Position,
            "position",
            r"(\w+) has the following entity data:.*?(-?[\d.]+)d?,\s*(-?[\d.]+)d?,\s*(-?[\d.]+)d?",
            position,
        ),
        builtin(
            Teleport,
            "teleport_coords",
            r"Teleported (\w+) to (-?[\d.]+),?\s*(-?[\d.]+),?\s*(-?[\d.]+)",
            teleport_coords,
        ),
        builtin(
            Teleport,
            "teleport_player",
            r"Teleported (\w+) to (\w+)",
            teleport_player,
        ),
        builtin(
            Dimension,
            "dimension_value",
            r#"(\w+) has the following entity data: "?minecraft:(\w+)"?\s*$"#,
            dimension,
        ),
        builtin(
            Dimension,
            "dimension_nbt",
            r#"(\w+) has the following entity data: \{.*Dimension:\s*"?minecraft:(\w+)"?"#,
            dimension,
        ),
    ];

    for shape in DEATH_SHAPES {
        table.push(Builtin {
            category: Death,
            name: format!("death_{}", shape.replace(' ', "_")),
            pattern: format!(r"(\w+) {}", regex::escape(shape)),
            extract: death,
        });
    }

    table.extend([
        builtin(Kill, "kill_slain", r"(\w+) was slain by (\w+)", kill),
        builtin(Kill, "kill_shot", r"(\w+) was shot by (\w+)", kill),
        builtin(Kill, "kill_killed", r"(\w+) was killed by (\w+)", kill),
        builtin(
            Achievement,
            "achievement",
            r"(\w+) has (made the advancement|completed the challenge|reached the goal) \[(.+)\]",
            achievement,
        ),
        builtin(Command, "command", r"(\w+) issued server command:", command),
        builtin(ServerOverload, "overload", r"Can't keep up!", |_, _| {
            Some(LogEvent::ServerOverload)
        }),
        builtin(ServerReady, "ready", r"Done \(\d+\.\d+s\)!", |_, _| {
            Some(LogEvent::ServerReady)
        }),
        builtin(ServerStopping, "stopping", r"Stopping (the )?server", |_, _| {
            Some(LogEvent::ServerStopping)
        }),
    ]);
    table
}

/// Stateless line classifier backed by an ordered pattern table.
pub struct LogEventExtractor {
    entries: Vec<PatternEntry>,
}

impl Default for LogEventExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LogEventExtractor {
    pub fn new() -> Self {
        let entries = builtin_patterns()
            .into_iter()
            .map(|b| {
                PatternEntry::new(b.category, b.name, &b.pattern, Arc::new(b.extract))
                    .expect("builtin log patterns are valid")
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self { entries: vec![] }
    }

    /// Appends a pattern after every existing pattern of its category.
    pub fn add_pattern(&mut self, entry: PatternEntry) {
        debug!(
            "added {:?} pattern {}: {}",
            entry.category,
            entry.name,
            entry.pattern()
        );
        self.entries.push(entry);
    }

    /// Removes every pattern with this name.
    pub fn remove_pattern(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.name != name);
        before != self.entries.len()
    }

    /// Names of the patterns of one category, in evaluation order.
    pub fn pattern_names(&self, category: EventCategory) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.category == category)
            .map(|entry| entry.name.as_str())
            .collect()
    }

    pub fn parse_line(&self, line: &str) -> Vec<LogEvent> {
        let clean = ANSI_ESCAPE.replace_all(line, "");
        let clean = clean.trim_end();
        let mut events = vec![];

        for category in EventCategory::ALL {
            let matched = self
                .entries
                .iter()
                .filter(|entry| entry.category == category)
                .find_map(|entry| {
                    let caps = entry.regex.captures(clean)?;
                    (entry.extract)(&caps, clean)
                });
            if let Some(event) = matched {
                events.push(event);
            }
        }

        events.push(LogEvent::Line {
            text: clean.to_string(),
        });
        events
    }
}
