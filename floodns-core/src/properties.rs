//! `key=value` configuration files.
//!
//! The format is the one of Java properties files, restricted to what the
//! run directories use:
//!
//! * blank lines and lines starting with `#` or `!` are ignored;
//! * the key ends at the first `=`, `:` or white space, the value is the
//!   rest of the line with the surrounding white space removed;
//! * a line ending with `\` continues on the next line.
//!
//! Unlike Java, a key defined twice is an error.

use std::{collections::BTreeMap, fs, io, path::{Path, PathBuf}, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PropertiesError {
    #[error("cannot read properties file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("duplicate key {key:?} on line {line}")]
    DuplicateKey { key: String, line: usize },
    #[error("missing required property {key:?}")]
    MissingKey { key: String },
    #[error("property {key:?} is not permitted")]
    UnknownKey { key: String },
    #[error("invalid value {value:?} for property {key:?}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// A parsed properties file, iterated in key order.
///
/// ```
/// # use floodns_core::properties::Properties;
/// let properties: Properties = "
///     # run parameters
///     simulation_end_time_ns=1000000
///     filename_topology: \"topology.properties\"
/// "
/// .parse()
/// .unwrap();
///
/// properties
///     .validate(&["simulation_end_time_ns", "filename_topology"], &[])
///     .unwrap();
/// assert_eq!(properties.u64("simulation_end_time_ns").unwrap(), 1_000_000);
/// assert_eq!(properties.string("filename_topology").unwrap(), "topology.properties");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PropertiesError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| PropertiesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// the raw value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Check that every `required` key is present and that no key other
    /// than the `required` and `optional` ones is.
    pub fn validate(&self, required: &[&str], optional: &[&str]) -> Result<(), PropertiesError> {
        if let Some(missing) = required.iter().find(|key| !self.contains(key)) {
            return Err(PropertiesError::MissingKey {
                key: missing.to_string(),
            });
        }
        if let Some(unknown) = self
            .keys()
            .find(|key| !required.contains(key) && !optional.contains(key))
        {
            return Err(PropertiesError::UnknownKey {
                key: unknown.to_owned(),
            });
        }
        Ok(())
    }

    fn required(&self, key: &str) -> Result<&str, PropertiesError> {
        self.get(key).ok_or_else(|| PropertiesError::MissingKey {
            key: key.to_owned(),
        })
    }

    /// The value, without its surrounding double quotes if it has some.
    pub fn string(&self, key: &str) -> Result<String, PropertiesError> {
        Ok(unquote(self.required(key)?).to_owned())
    }

    /// Parse the value with its [`FromStr`] implementation.
    pub fn parse<T>(&self, key: &str) -> Result<T, PropertiesError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.required(key)?;
        value.parse().map_err(|error: T::Err| PropertiesError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
            reason: error.to_string(),
        })
    }

    /// Like [`Properties::parse`], `None` if the key is absent.
    pub fn parse_optional<T>(&self, key: &str) -> Result<Option<T>, PropertiesError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if self.contains(key) {
            self.parse(key).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn u64(&self, key: &str) -> Result<u64, PropertiesError> {
        self.parse(key)
    }

    /// A finite and non-negative real.
    pub fn non_negative_f64(&self, key: &str) -> Result<f64, PropertiesError> {
        let value: f64 = self.parse(key)?;
        if !value.is_finite() || value < 0.0 {
            return Err(PropertiesError::InvalidValue {
                key: key.to_owned(),
                value: value.to_string(),
                reason: "must be finite and non-negative".to_owned(),
            });
        }
        Ok(value)
    }
}

impl FromStr for Properties {
    type Err = PropertiesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = BTreeMap::new();
        let mut lines = s.lines().enumerate();

        while let Some((index, line)) = lines.next() {
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let mut logical = line.to_owned();
            while logical.ends_with('\\') {
                logical.pop();
                match lines.next() {
                    Some((_, next)) => logical.push_str(next.trim_start()),
                    None => break,
                }
            }

            let (key, value) = split_entry(&logical);
            if entries.contains_key(key) {
                return Err(PropertiesError::DuplicateKey {
                    key: key.to_owned(),
                    line: index + 1,
                });
            }
            entries.insert(key.to_owned(), value.to_owned());
        }

        Ok(Self { entries })
    }
}

fn split_entry(line: &str) -> (&str, &str) {
    let line = line.trim_end();
    match line.find(|c: char| c == '=' || c == ':' || c.is_whitespace()) {
        None => (line, ""),
        Some(end) => {
            let key = &line[..end];
            let mut rest = line[end..].trim_start();
            // white space then an explicit separator
            if let Some(stripped) = rest.strip_prefix(['=', ':']) {
                rest = stripped.trim_start();
            }
            (key, rest)
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .unwrap_or(value)
}
