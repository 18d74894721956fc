/*
 * Canonical log names
 *
 * "app" and "app.log" refer to the same physical file, so the registry keys
 * both as "app". Any other extension names a different file and stays part
 * of the key: "app.txt" is its own log. The extension defaults to ".log".
 */

use std::fmt;

use crate::error::{LogError, Result};

const DEFAULT_EXTENSION: &str = ".log";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogName {
    key: String,
    base: String,
    extension: String,
}

impl LogName {
    pub fn new(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        // A leading dot is part of the name, not an extension
        let (base, extension) = match raw.rfind('.') {
            Some(dot) if dot > 0 => (&raw[..dot], &raw[dot..]),
            _ => (raw, DEFAULT_EXTENSION),
        };

        if base.is_empty() {
            return Err(LogError::Configuration(format!("log name '{}' has no base name", raw)));
        }
        if base.contains(['/', '\\']) {
            return Err(LogError::Configuration(format!(
                "log name '{}' must not contain a path separator",
                raw
            )));
        }

        let key = if extension == DEFAULT_EXTENSION {
            base.to_string()
        } else {
            format!("{}{}", base, extension)
        };

        Ok(LogName {
            key,
            base: base.to_string(),
            extension: extension.to_string(),
        })
    }

    /// The registry key: the base name, plus the extension unless it is `.log`
    pub fn canonical(&self) -> &str {
        &self.key
    }

    /// Extension including the leading dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// File name for the given day marker, e.g. `app-2024-03-09.log`
    pub fn file_name(&self, day: &str) -> String {
        format!("{}-{}{}", self.base, day, self.extension)
    }
}

impl fmt::Display for LogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_extension_for_the_key() {
        let plain = LogName::new("app").unwrap();
        let dotted = LogName::new("app.log").unwrap();
        assert_eq!(plain.canonical(), "app");
        assert_eq!(dotted.canonical(), "app");
        assert_eq!(plain.extension(), ".log");
    }

    #[test]
    fn keeps_custom_extension() {
        let name = LogName::new("audit.txt").unwrap();
        assert_eq!(name.canonical(), "audit.txt");
        assert_eq!(name.file_name("2024-03-09"), "audit-2024-03-09.txt");
    }

    #[test]
    fn different_extensions_are_different_logs() {
        let txt = LogName::new("app.txt").unwrap();
        let log = LogName::new("app.log").unwrap();
        assert_ne!(txt.canonical(), log.canonical());
        assert_eq!(txt.file_name("2024-03-09"), "app-2024-03-09.txt");
        assert_eq!(log.file_name("2024-03-09"), "app-2024-03-09.log");
    }

    #[test]
    fn only_the_last_extension_is_removed() {
        let name = LogName::new("SimpleLog_Test.v2.log").unwrap();
        assert_eq!(name.canonical(), "SimpleLog_Test.v2");
    }

    #[test]
    fn rejects_empty_and_path_names() {
        assert!(LogName::new("").is_err());
        assert!(LogName::new(".log").is_ok());
        assert!(LogName::new("logs/app").is_err());
    }
}
