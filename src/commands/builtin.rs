//! Built-in commands
//!
//! Table order is part of the contract: an utterance such as
//! "hello, can you help" reaches the capability summary because `help`
//! is listed before the greeting keywords.

use chrono::{Datelike, Local, NaiveDate, NaiveTime, Timelike};

use super::{CommandContext, CommandTable};
use crate::validation::validate_city;
use crate::weather::WeatherError;

pub const CAPABILITIES: &str = "I can open websites, applications and folders for you. \
I can also tell you the time, the date, the weather and some information about this computer. \
Say goodbye when you want me to shut down.";

pub const GREETING: &str = "Hello! I'm ZILNOVA. How can I help you today?";

pub const IDENTITY: &str = "I am ZILNOVA, your personal AI assistant.";

/// The default ordered command table
pub fn default_table() -> CommandTable {
    CommandTable::builder()
        .command("open_folder", &["open folder"], open_folder)
        .command("weather", &["weather"], weather)
        .command(
            "system_info",
            &["system info", "system information", "system status"],
            |ctx, _| {
                ctx.say(system_summary());
                Ok(())
            },
        )
        .command("time", &["what time", "the time"], |ctx, _| {
            ctx.say(spoken_time(Local::now().time()));
            Ok(())
        })
        .command(
            "date",
            &["what day", "the date", "today's date"],
            |ctx, _| {
                ctx.say(spoken_date(Local::now().date_naive()));
                Ok(())
            },
        )
        .command("capabilities", &["what can you do", "help"], |ctx, _| {
            ctx.say(CAPABILITIES);
            Ok(())
        })
        .command(
            "greeting",
            &["hello", "hi there", "hey zilnova", "good morning", "good evening"],
            |ctx, _| {
                ctx.say(GREETING);
                Ok(())
            },
        )
        .command("identity", &["who are you", "your name"], |ctx, _| {
            ctx.say(IDENTITY);
            Ok(())
        })
        .build()
}

fn open_folder(ctx: &CommandContext<'_>, utterance: &str) -> anyhow::Result<()> {
    let Some((name, path)) = ctx
        .resources
        .folders
        .iter()
        .find(|(name, _)| utterance.contains(name.as_str()))
    else {
        ctx.say("Please specify which folder to open.");
        return Ok(());
    };

    match ctx.launcher.open_folder(path) {
        Ok(()) => ctx.say(format!("Opening your {} folder", name)),
        Err(e) => {
            log::warn!("Could not open folder {}: {}", path.display(), e);
            ctx.say("Sorry, I couldn't find that folder");
        }
    }
    Ok(())
}

fn weather(ctx: &CommandContext<'_>, utterance: &str) -> anyhow::Result<()> {
    let city = match requested_city(utterance) {
        Some(raw) => match validate_city(raw) {
            Ok(city) => city,
            Err(e) => {
                log::debug!("Rejected city '{}': {}", raw, e);
                ctx.say("Sorry, I didn't catch which city you meant.");
                return Ok(());
            }
        },
        None => match ctx.resources.default_city.as_deref() {
            Some(city) => city.to_string(),
            None => {
                ctx.say("Which city would you like the weather for? Try saying weather in London.");
                return Ok(());
            }
        },
    };

    match ctx.weather.fetch(&city) {
        Ok(report) => ctx.say(report.spoken()),
        Err(WeatherError::MissingApiKey) => {
            ctx.say("I need a weather API key before I can check the weather.")
        }
        Err(WeatherError::CityNotFound(city)) => {
            ctx.say(format!("Sorry, I couldn't find the weather for {}.", city))
        }
        Err(WeatherError::Unavailable(reason)) => {
            log::warn!("Weather lookup failed: {}", reason);
            ctx.say("Sorry, the weather service is not available right now.");
        }
    }
    Ok(())
}

/// City named after the last " in " or " for ", without trailing filler
fn requested_city(utterance: &str) -> Option<&str> {
    let tail = [" in ", " for "]
        .iter()
        .filter_map(|sep| utterance.rfind(sep).map(|i| &utterance[i + sep.len()..]))
        .min_by_key(|tail| tail.len())?;

    let mut city = tail.trim().trim_end_matches(['?', '.', '!']);
    for filler in [" today", " right now", " now", " please"] {
        city = city.strip_suffix(filler).unwrap_or(city);
    }
    let city = city.trim();
    (!city.is_empty()).then_some(city)
}

fn system_summary() -> String {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let host = hostname::get()
        .map_or_else(|_| "unknown".to_string(), |h| h.to_string_lossy().to_string());

    format!(
        "You are running {} on {} with {} processor cores. This computer is called {}.",
        std::env::consts::OS,
        std::env::consts::ARCH,
        cores,
        host
    )
}

fn spoken_time(time: NaiveTime) -> String {
    let (pm, hour) = time.hour12();
    format!(
        "It is {}:{:02} {}",
        hour,
        time.minute(),
        if pm { "PM" } else { "AM" }
    )
}

fn spoken_date(date: NaiveDate) -> String {
    format!(
        "Today is {}, {} {}, {}",
        date.format("%A"),
        date.format("%B"),
        date.day(),
        date.year()
    )
}
