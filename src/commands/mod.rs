//! Command table and dispatch
//!
//! An utterance is matched against an ordered table of entries. The first
//! entry with a keyword contained in the utterance wins and no later entry
//! is consulted, so overlapping keywords must be ordered on purpose when the
//! table is built. Unmatched utterances fall through to the open-resource
//! handler (website table, then application table) when they contain an
//! open word, and finally to a generic "didn't understand" reply.

pub mod builtin;

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use crate::launcher::ResourceLauncher;
use crate::speech::SpeechHandle;
use crate::weather::WeatherService;

pub use builtin::default_table;

/// Spoken when a handler fails for any reason
pub const APOLOGY: &str = "I'm sorry, I encountered an error processing that command.";

/// Words that send unmatched utterances to the open-resource handler
pub const OPEN_WORDS: &[&str] = &["open", "launch", "start"];

/// Lower-case and collapse whitespace
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A name the user can say and what it opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTarget {
    pub name: String,
    pub target: String,
}

impl NamedTarget {
    pub fn new(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
        }
    }
}

/// Website and application tables, in lookup order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub websites: Vec<NamedTarget>,
    pub applications: Vec<NamedTarget>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            websites: vec![
                NamedTarget::new("youtube", "https://www.youtube.com"),
                NamedTarget::new("facebook", "https://www.facebook.com"),
                NamedTarget::new("gmail", "https://mail.google.com"),
                NamedTarget::new("google", "https://www.google.com"),
                NamedTarget::new("github", "https://github.com"),
                NamedTarget::new("wikipedia", "https://www.wikipedia.org"),
            ],
            applications: default_applications(),
        }
    }
}

fn default_applications() -> Vec<NamedTarget> {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "windows")] {
            vec![
                NamedTarget::new("notepad", "notepad.exe"),
                NamedTarget::new("calculator", "calc.exe"),
                NamedTarget::new("paint", "mspaint.exe"),
            ]
        } else if #[cfg(target_os = "macos")] {
            vec![
                NamedTarget::new("notepad", "open -a TextEdit"),
                NamedTarget::new("text editor", "open -a TextEdit"),
                NamedTarget::new("calculator", "open -a Calculator"),
            ]
        } else {
            vec![
                NamedTarget::new("notepad", "gedit"),
                NamedTarget::new("text editor", "gedit"),
                NamedTarget::new("calculator", "gnome-calculator"),
                NamedTarget::new("terminal", "x-terminal-emulator"),
            ]
        }
    }
}

/// Resource tables resolved once at startup
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub websites: Vec<NamedTarget>,
    pub applications: Vec<NamedTarget>,
    /// Named user folders ("downloads" -> ~/Downloads)
    pub folders: Vec<(String, PathBuf)>,
    pub default_city: Option<String>,
}

impl Resources {
    pub fn resolve(config: &ResourceConfig, default_city: Option<String>) -> Self {
        Self {
            websites: normalize_targets(&config.websites),
            applications: normalize_targets(&config.applications),
            folders: user_folders(),
            default_city,
        }
    }
}

fn normalize_targets(targets: &[NamedTarget]) -> Vec<NamedTarget> {
    targets
        .iter()
        .filter(|t| !t.name.trim().is_empty())
        .map(|t| NamedTarget {
            name: normalize(&t.name),
            target: t.target.clone(),
        })
        .collect()
}

fn user_folders() -> Vec<(String, PathBuf)> {
    let Some(dirs) = directories::UserDirs::new() else {
        log::warn!("Could not determine user folders");
        return Vec::new();
    };

    let named = [
        ("downloads", dirs.download_dir()),
        ("documents", dirs.document_dir()),
        ("desktop", dirs.desktop_dir()),
        ("music", dirs.audio_dir()),
        ("pictures", dirs.picture_dir()),
        ("videos", dirs.video_dir()),
    ];

    let mut folders: Vec<(String, PathBuf)> = named
        .into_iter()
        .filter_map(|(name, dir)| dir.map(|d| (name.to_string(), d.to_path_buf())))
        .collect();
    folders.push(("home".to_string(), dirs.home_dir().to_path_buf()));
    folders
}

/// What a handler may use
pub struct CommandContext<'a> {
    pub speech: &'a SpeechHandle,
    pub launcher: &'a dyn ResourceLauncher,
    pub weather: &'a dyn WeatherService,
    pub resources: &'a Resources,
}

impl CommandContext<'_> {
    pub fn say(&self, text: impl AsRef<str>) {
        self.speech.enqueue(text);
    }
}

/// Handler body: receives the full normalized utterance
pub type Handler = Box<dyn Fn(&CommandContext<'_>, &str) -> anyhow::Result<()> + Send + Sync>;

/// One row of the command table
pub struct CommandEntry {
    name: String,
    keywords: Vec<String>,
    handler: Handler,
}

impl CommandEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// True if any keyword occurs in the (normalized) utterance
    pub fn matches(&self, utterance: &str) -> bool {
        self.keywords.iter().any(|k| utterance.contains(k.as_str()))
    }
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("keywords", &self.keywords)
            .finish()
    }
}

/// Result of dispatching one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Empty utterance; nothing ran
    NoOp,
    /// A table entry handled it
    Handled { command: String },
    /// The open-resource fallback matched a website or application
    Opened { target: String },
    /// Nothing matched; the generic reply was spoken
    NotUnderstood,
    /// The handler failed and the apology was spoken
    Failed { command: String },
}

/// Builds a [`CommandTable`]; entries keep insertion order
#[derive(Default)]
pub struct CommandTableBuilder {
    entries: Vec<CommandEntry>,
}

impl CommandTableBuilder {
    /// Append an entry. Keywords are normalized; blank ones are dropped.
    pub fn command<F>(mut self, name: &str, keywords: &[&str], handler: F) -> Self
    where
        F: Fn(&CommandContext<'_>, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| normalize(k))
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            log::warn!("Command '{}' has no usable keywords, skipping", name);
            return self;
        }

        self.entries.push(CommandEntry {
            name: name.to_string(),
            keywords,
            handler: Box::new(handler),
        });
        self
    }

    pub fn build(self) -> CommandTable {
        log::debug!("Command table built with {} entries", self.entries.len());
        CommandTable {
            entries: self.entries,
        }
    }
}

/// Immutable, ordered command table
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder::default()
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// First entry matching the normalized utterance
    pub fn find(&self, utterance: &str) -> Option<&CommandEntry> {
        self.entries.iter().find(|e| e.matches(utterance))
    }

    /// Match and run the winning handler. Never panics or returns an error:
    /// handler failures become one spoken apology.
    pub fn dispatch(&self, ctx: &CommandContext<'_>, utterance: &str) -> DispatchOutcome {
        let utterance = normalize(utterance);
        if utterance.is_empty() {
            return DispatchOutcome::NoOp;
        }

        if let Some(entry) = self.find(&utterance) {
            log::debug!("Dispatching '{}' to '{}'", utterance, entry.name);
            return match run_guarded(ctx, &entry.name, || (entry.handler)(ctx, &utterance)) {
                true => DispatchOutcome::Handled {
                    command: entry.name.clone(),
                },
                false => DispatchOutcome::Failed {
                    command: entry.name.clone(),
                },
            };
        }

        if contains_open_word(&utterance) {
            if let Some(target) = find_resource(ctx.resources, &utterance) {
                let name = target.name.clone();
                let ok = run_guarded(ctx, "open", || open_resource(ctx, &target));
                return if ok {
                    DispatchOutcome::Opened { target: name }
                } else {
                    DispatchOutcome::Failed {
                        command: "open".to_string(),
                    }
                };
            }
        }

        log::debug!("No command matched '{}'", utterance);
        ctx.say(format!(
            "I heard you say: {}. How can I help with that?",
            utterance
        ));
        DispatchOutcome::NotUnderstood
    }
}

fn contains_open_word(utterance: &str) -> bool {
    utterance
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| OPEN_WORDS.contains(&word))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Website,
    Application,
}

struct ResourceMatch {
    kind: ResourceKind,
    name: String,
    target: String,
}

/// Website table first, then applications; first name found wins
fn find_resource(resources: &Resources, utterance: &str) -> Option<ResourceMatch> {
    let website = resources
        .websites
        .iter()
        .find(|t| utterance.contains(t.name.as_str()))
        .map(|t| (ResourceKind::Website, t));
    let found = website.or_else(|| {
        resources
            .applications
            .iter()
            .find(|t| utterance.contains(t.name.as_str()))
            .map(|t| (ResourceKind::Application, t))
    });

    found.map(|(kind, t)| ResourceMatch {
        kind,
        name: t.name.clone(),
        target: t.target.clone(),
    })
}

fn open_resource(ctx: &CommandContext<'_>, found: &ResourceMatch) -> anyhow::Result<()> {
    let result = match found.kind {
        ResourceKind::Website => ctx.launcher.open_url(&found.target),
        ResourceKind::Application => ctx.launcher.launch_executable(&found.target),
    };

    match result {
        Ok(()) => ctx.say(format!("Opening {}", found.name)),
        Err(e) => {
            log::warn!("Could not open {}: {}", found.name, e);
            ctx.say(format!("Sorry, I couldn't open {}", found.name));
        }
    }
    Ok(())
}

/// Run a handler; on error or panic log it and speak the apology once
fn run_guarded<F>(ctx: &CommandContext<'_>, name: &str, body: F) -> bool
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::error!("Command '{}' failed: {:#}", name, e);
            ctx.say(APOLOGY);
            false
        }
        Err(_) => {
            log::error!("Command '{}' panicked", name);
            ctx.say(APOLOGY);
            false
        }
    }
}
