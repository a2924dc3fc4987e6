//! On-disk cache of fetched current states.
//!
//! One JSON file per container. A cache is only offered while it is younger
//! than [`MAX_CACHE_AGE_HOURS`], and it is deleted before any mutation so a
//! stale snapshot is never reused.

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::model::{DocumentFormat, State};

/// Caches older than this are ignored.
pub const MAX_CACHE_AGE_HOURS: i64 = 8;

/// Directory holding cached states.
#[derive(Debug, Clone)]
pub struct StateCache {
    dir: PathBuf,
}

impl StateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache file for a container.
    pub fn path(&self, container_id: u64) -> PathBuf {
        self.dir.join(format!("cache_{container_id:09}.json"))
    }

    /// Load a cached state. A missing or unreadable cache is `None`.
    pub fn load(&self, container_id: u64) -> Option<State> {
        let path = self.path(container_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No cache at {}: {e}", path.display());
                return None;
            }
        };
        match State::parse(&content, DocumentFormat::Json, &path) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!("Ignoring unreadable cache: {e}");
                None
            }
        }
    }

    /// Load a cached state together with its age, if it is fresh enough.
    pub fn load_fresh(&self, container_id: u64, now: DateTime<Utc>) -> Option<(State, TimeDelta)> {
        let state = self.load(container_id)?;
        let age = state.info.as_ref()?.age(now);
        if age < TimeDelta::hours(MAX_CACHE_AGE_HOURS) {
            Some((state, age))
        } else {
            debug!("Cache for container {container_id} is too old");
            None
        }
    }

    pub fn store(&self, state: &State) -> Result<()> {
        let path = self.path(state.container.id);
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let json = serde_json::to_string(state)?;
        fs::write(&path, json).map_err(|e| Error::io(&path, e))?;
        debug!("Wrote cache {}", path.display());
        Ok(())
    }

    /// Delete the cache of a container. A missing cache is not an error.
    pub fn clear(&self, container_id: u64) -> Result<()> {
        let path = self.path(container_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed cache {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

/// Render an age like "a few seconds", "ten minutes" or "two hours".
pub fn humanize_age(age: TimeDelta) -> String {
    let seconds = age.num_seconds();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    let (n, unit) = if days > 0 {
        (days, "day")
    } else if hours > 0 {
        (hours, "hour")
    } else if minutes > 0 {
        (minutes, "minute")
    } else if seconds >= 10 {
        (seconds, "second")
    } else {
        return "a few seconds".to_string();
    };
    let plural = if n == 1 { "" } else { "s" };
    format!("{} {unit}{plural}", number_word(n))
}

fn number_word(n: i64) -> String {
    const WORDS: [&str; 11] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    ];
    usize::try_from(n)
        .ok()
        .and_then(|i| WORDS.get(i))
        .map_or_else(|| n.to_string(), |w| (*w).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Container, Info};
    use tempfile::TempDir;

    fn state(container_id: u64, time: DateTime<Utc>) -> State {
        State {
            info: Some(Info {
                version: "0.1.0".into(),
                time,
            }),
            container: Container {
                id: container_id,
                name: "Acme".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_cache_path() {
        let cache = StateCache::new("/tmp/x");
        assert_eq!(cache.path(42), PathBuf::from("/tmp/x/cache_000000042.json"));
    }

    #[test]
    fn test_store_load_clear() {
        let dir = TempDir::new().unwrap();
        let cache = StateCache::new(dir.path().join("nested"));
        let now = Utc::now();

        assert!(cache.load(42).is_none());
        cache.store(&state(42, now)).unwrap();
        let loaded = cache.load(42).unwrap();
        assert_eq!(loaded.container.name, "Acme");

        cache.clear(42).unwrap();
        assert!(cache.load(42).is_none());
        cache.clear(42).unwrap();
    }

    #[test]
    fn test_freshness_threshold() {
        let dir = TempDir::new().unwrap();
        let cache = StateCache::new(dir.path());
        let now = Utc::now();

        cache.store(&state(1, now - TimeDelta::hours(2))).unwrap();
        let (_, age) = cache.load_fresh(1, now).unwrap();
        assert_eq!(age, TimeDelta::hours(2));

        cache.store(&state(1, now - TimeDelta::hours(9))).unwrap();
        assert!(cache.load_fresh(1, now).is_none());
    }

    #[test]
    fn test_corrupt_cache_is_ignored() {
        let dir = TempDir::new().unwrap();
        let cache = StateCache::new(dir.path());
        fs::write(cache.path(5), "not json").unwrap();
        assert!(cache.load(5).is_none());
    }

    #[test]
    fn test_humanize_age() {
        assert_eq!(humanize_age(TimeDelta::seconds(3)), "a few seconds");
        assert_eq!(humanize_age(TimeDelta::seconds(42)), "42 seconds");
        assert_eq!(humanize_age(TimeDelta::minutes(10)), "ten minutes");
        assert_eq!(humanize_age(TimeDelta::minutes(61)), "one hour");
        assert_eq!(humanize_age(TimeDelta::hours(2)), "two hours");
        assert_eq!(humanize_age(TimeDelta::days(3)), "three days");
    }
}
