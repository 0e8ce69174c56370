//! A small keyed configuration store: directory for spill files, undo
//! retention limit, and whether undo history survives a successful save.

use crate::error::{Error, Result};

/// An undo-retention limit: either a fixed non-negative cap or unbounded
/// retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoLimit {
    /// Retain at most this many primitive actions.
    Bounded(u64),
    /// Never drop undo history.
    Infinite,
}

/// Whether the undo/redo stacks survive a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoAfterSave {
    /// Undo history is kept after a successful save.
    Always,
    /// A successful save clears undo history.
    Never,
}

/// The set of recognized option keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    /// Directory used for spill files during save.
    TmpDir,
    /// The undo retention limit.
    UndoLimit,
    /// Whether undo history survives a successful save.
    UndoAfterSave,
}

impl OptionKey {
    /// The string name used by `get_option`/`set_option`.
    pub fn name(self) -> &'static str {
        match self {
            OptionKey::TmpDir => "TMP_DIR",
            OptionKey::UndoLimit => "UNDO_LIMIT",
            OptionKey::UndoAfterSave => "UNDO_AFTER_SAVE",
        }
    }

    /// Parses a key by its string name, `Error::Invalid` if unrecognized.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "TMP_DIR" => Ok(OptionKey::TmpDir),
            "UNDO_LIMIT" => Ok(OptionKey::UndoLimit),
            "UNDO_AFTER_SAVE" => Ok(OptionKey::UndoAfterSave),
            _ => Err(Error::Invalid("unknown option key")),
        }
    }

    /// All recognized keys, in a stable order. Used in place of a sentinel
    /// guard value for iteration.
    pub fn iter_all() -> impl Iterator<Item = OptionKey> {
        [
            OptionKey::TmpDir,
            OptionKey::UndoLimit,
            OptionKey::UndoAfterSave,
        ]
        .into_iter()
    }
}

/// The validated option store backing a buffer's `get_option`/`set_option`.
#[derive(Debug, Clone)]
pub struct OptionStore {
    tmp_dir: String,
    undo_limit: UndoLimit,
    undo_after_save: UndoAfterSave,
}

impl Default for OptionStore {
    fn default() -> Self {
        OptionStore {
            tmp_dir: "/tmp".to_string(),
            undo_limit: UndoLimit::Infinite,
            undo_after_save: UndoAfterSave::Always,
        }
    }
}

impl OptionStore {
    /// Creates a store with every key at its documented default.
    pub fn new() -> Self {
        OptionStore::default()
    }

    /// Returns the current string value of `key`.
    pub fn get(&self, key: OptionKey) -> String {
        match key {
            OptionKey::TmpDir => self.tmp_dir.clone(),
            OptionKey::UndoLimit => match self.undo_limit {
                UndoLimit::Infinite => "infinite".to_string(),
                UndoLimit::Bounded(n) => n.to_string(),
            },
            OptionKey::UndoAfterSave => match self.undo_after_save {
                UndoAfterSave::Always => "always".to_string(),
                UndoAfterSave::Never => "never".to_string(),
            },
        }
    }

    /// Looks up and returns the string value for `name`, `Error::Invalid` if
    /// `name` is not a recognized key.
    pub fn get_option(&self, name: &str) -> Result<String> {
        Ok(self.get(OptionKey::parse(name)?))
    }

    /// Validates and sets `value` for the key named `name`.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        let key = OptionKey::parse(name)?;
        match key {
            OptionKey::TmpDir => {
                if value.is_empty() {
                    return Err(Error::Invalid("TMP_DIR must not be empty"));
                }
                self.tmp_dir = value.to_string();
            }
            OptionKey::UndoLimit => {
                self.undo_limit = if value == "infinite" {
                    UndoLimit::Infinite
                } else {
                    let n: u64 = value
                        .parse()
                        .map_err(|_| Error::Invalid("UNDO_LIMIT must be a non-negative integer or 'infinite'"))?;
                    UndoLimit::Bounded(n)
                };
            }
            OptionKey::UndoAfterSave => {
                self.undo_after_save = match value {
                    "always" => UndoAfterSave::Always,
                    "never" => UndoAfterSave::Never,
                    _ => return Err(Error::Invalid("UNDO_AFTER_SAVE must be 'always' or 'never'")),
                };
            }
        }
        Ok(())
    }

    /// The parsed undo retention limit, for consumption by the action log.
    pub fn undo_limit(&self) -> UndoLimit {
        self.undo_limit
    }

    /// The parsed post-save undo policy, for consumption by the buffer
    /// façade.
    pub fn undo_after_save(&self) -> UndoAfterSave {
        self.undo_after_save
    }

    /// The configured spill directory, for consumption by the save planner.
    pub fn tmp_dir(&self) -> &str {
        &self.tmp_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = OptionStore::new();
        assert_eq!(opts.get_option("TMP_DIR").unwrap(), "/tmp");
        assert_eq!(opts.get_option("UNDO_LIMIT").unwrap(), "infinite");
        assert_eq!(opts.get_option("UNDO_AFTER_SAVE").unwrap(), "always");
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut opts = OptionStore::new();
        opts.set_option("TMP_DIR", "/var/tmp").unwrap();
        opts.set_option("UNDO_LIMIT", "10").unwrap();
        opts.set_option("UNDO_AFTER_SAVE", "never").unwrap();

        assert_eq!(opts.get_option("TMP_DIR").unwrap(), "/var/tmp");
        assert_eq!(opts.get_option("UNDO_LIMIT").unwrap(), "10");
        assert_eq!(opts.get_option("UNDO_AFTER_SAVE").unwrap(), "never");
        assert_eq!(opts.undo_limit(), UndoLimit::Bounded(10));
        assert_eq!(opts.undo_after_save(), UndoAfterSave::Never);
    }

    #[test]
    fn unknown_key_is_invalid() {
        let mut opts = OptionStore::new();
        assert!(matches!(opts.get_option("NOPE"), Err(Error::Invalid(_))));
        assert!(matches!(
            opts.set_option("NOPE", "val"),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn malformed_values_are_invalid() {
        let mut opts = OptionStore::new();
        assert!(opts.set_option("UNDO_LIMIT", "-1").is_err());
        assert!(opts.set_option("UNDO_LIMIT", "many").is_err());
        assert!(opts.set_option("UNDO_AFTER_SAVE", "sometimes").is_err());
        assert!(opts.set_option("TMP_DIR", "").is_err());
    }

    #[test]
    fn iter_all_covers_every_key() {
        let keys: Vec<_> = OptionKey::iter_all().map(OptionKey::name).collect();
        assert_eq!(keys, vec!["TMP_DIR", "UNDO_LIMIT", "UNDO_AFTER_SAVE"]);
    }
}
