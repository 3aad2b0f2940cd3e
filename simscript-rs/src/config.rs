//! Telemetry catalog configuration.
//!
//! The catalog is the ordered list of simulator property paths that the
//! comma-separated values of each inbound telemetry record map onto, by
//! position.  It has to match the simulator's generic-protocol output
//! definition exactly, so it is configuration rather than code.
//!
//! Catalog file format:
//!
//! | Line | Meaning |
//! |------|---------|
//! | `/some/property/path` | next catalog position |
//! | blank, `#…`, `;…` | ignored |
//!
//! Lookup order: `-C <file>` → `$SIMSCRIPT_CATALOG` → `catalog.txt` in the
//! platform config directory → [`Catalog::default`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Environment variable naming a catalog file.
pub const CATALOG_ENV: &str = "SIMSCRIPT_CATALOG";

/// File name looked up in the platform config directory.
pub const CATALOG_FILE: &str = "catalog.txt";

/// Paths reported by the stock generic-aircraft protocol file, in order.
pub const DEFAULT_CATALOG: &[&str] = &[
    "/instrumentation/airspeed-indicator/indicated-speed-kt",
    "/sim/time/warp",
    "/controls/switches/magnetos",
    "/instrumentation/heading-indicator/offset-deg",
    "/instrumentation/altimeter/indicated-altitude-ft",
    "/instrumentation/altimeter/pressure-alt-ft",
    "/instrumentation/attitude-indicator/indicated-pitch-deg",
    "/instrumentation/attitude-indicator/indicated-roll-deg",
    "/instrumentation/attitude-indicator/internal-pitch-deg",
    "/instrumentation/attitude-indicator/internal-roll-deg",
    "/instrumentation/encoder/indicated-altitude-ft",
    "/instrumentation/encoder/pressure-alt-ft",
    "/instrumentation/gps/indicated-altitude-ft",
    "/instrumentation/gps/indicated-ground-speed-kt",
    "/instrumentation/gps/indicated-vertical-speed",
    "/instrumentation/heading-indicator/indicated-heading-deg",
    "/instrumentation/magnetic-compass/indicated-heading-deg",
    "/instrumentation/slip-skid-ball/indicated-slip-skid",
    "/instrumentation/turn-indicator/indicated-turn-rate",
    "/instrumentation/vertical-speed-indicator/indicated-speed-fpm",
    "/controls/flight/aileron",
    "/controls/flight/elevator",
    "/controls/flight/rudder",
    "/controls/flight/flaps",
    "/controls/engines/engine/throttle",
    "/controls/engines/current-engine/throttle",
    "/controls/switches/master-avionics",
    "/controls/switches/starter",
    "/engines/active-engine/auto-start",
    "/controls/flight/speedbrake",
    "/sim/model/c172p/brake-parking",
    "/controls/engines/engine/primer",
    "/controls/engines/current-engine/mixture",
    "/controls/switches/master-bat",
    "/controls/switches/master-alt",
    "/engines/engine/rpm",
];

// ── ConfigError ───────────────────────────────────────────────────────────────

/// A non-fatal problem found while loading a catalog file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

// ── Catalog ───────────────────────────────────────────────────────────────────

/// Ordered telemetry paths; position `i` receives field `i` of each record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    paths: Vec<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG.iter().map(|&p| p.to_owned()).collect())
    }
}

impl Catalog {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.paths.get(index).map(String::as_str)
    }

    /// Parse catalog text.
    ///
    /// Problems are reported but never stop the load: a duplicated path is
    /// kept at both positions, and an empty catalog is returned as such.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut paths = Vec::new();
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (i, raw) in s.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.contains(char::is_whitespace) || line.contains(',') {
                errors.push(ConfigError {
                    line: i + 1,
                    message: format!("path `{line}` contains whitespace or a comma"),
                });
            }
            if !seen.insert(line.to_owned()) {
                errors.push(ConfigError {
                    line: i + 1,
                    message: format!("duplicate path `{line}`"),
                });
            }
            paths.push(line.to_owned());
        }

        if paths.is_empty() {
            errors.push(ConfigError { line: 0, message: "catalog is empty".to_owned() });
        }
        (Self::new(paths), errors)
    }

    /// Read and parse a catalog file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }
}

// ── Lookup ────────────────────────────────────────────────────────────────────

/// `catalog.txt` in the platform config directory, if it exists.
pub fn user_catalog_file() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "simscript")?;
    let path = dirs.config_dir().join(CATALOG_FILE);
    path.exists().then_some(path)
}

/// Pick the catalog file to load, if any.
///
/// Priority: CLI override → [`CATALOG_ENV`] → [`user_catalog_file`].
pub fn find_catalog_file(cli_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = cli_override {
        return Some(p.to_owned());
    }
    if let Ok(p) = std::env::var(CATALOG_ENV) {
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    user_catalog_file()
}

/// Load the effective catalog.
///
/// A file that was asked for but cannot be read is an error; with no file
/// configured the built-in catalog is used.
pub fn resolve_catalog(cli_override: Option<&Path>) -> Result<(Catalog, Vec<ConfigError>), String> {
    match find_catalog_file(cli_override) {
        Some(path) => Catalog::load_file(&path)
            .map_err(|e| format!("cannot read catalog {}: {e}", path.display())),
        None => Ok((Catalog::default(), Vec::new())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_catalog_order() {
        let c = Catalog::default();
        assert_eq!(c.len(), 36);
        assert_eq!(c.get(0), Some("/instrumentation/airspeed-indicator/indicated-speed-kt"));
        assert_eq!(c.get(22), Some("/controls/flight/rudder"));
        assert_eq!(c.get(35), Some("/engines/engine/rpm"));
        assert_eq!(c.get(36), None);
    }

    #[test]
    fn load_skips_comments_and_blanks() {
        let (c, errs) = Catalog::load_str("# header\n/a\n\n  /b  \n; note\n/c\n");
        assert!(errs.is_empty());
        assert_eq!(c.paths(), ["/a", "/b", "/c"]);
    }

    #[test]
    fn duplicate_is_reported_but_kept() {
        let (c, errs) = Catalog::load_str("/a\n/b\n/a\n");
        assert_eq!(c.len(), 3);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].line, 3);
        assert!(errs[0].message.contains("duplicate"));
    }

    #[test]
    fn comma_in_path_is_reported() {
        let (_, errs) = Catalog::load_str("/a,/b\n");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].to_string(), "line 1: path `/a,/b` contains whitespace or a comma");
    }

    #[test]
    fn empty_catalog_is_reported() {
        let (c, errs) = Catalog::load_str("# nothing\n");
        assert!(c.is_empty());
        assert_eq!(errs, vec![ConfigError { line: 0, message: "catalog is empty".into() }]);
    }

    #[test]
    fn load_file_reads_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "/x\n/y").unwrap();
        let (c, errs) = Catalog::load_file(f.path()).unwrap();
        assert!(errs.is_empty());
        assert_eq!(c.paths(), ["/x", "/y"]);
    }

    #[test]
    fn cli_override_wins() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "/only").unwrap();
        let (c, _) = resolve_catalog(Some(f.path())).unwrap();
        assert_eq!(c.paths(), ["/only"]);
    }

    #[test]
    fn missing_override_is_error() {
        let err = resolve_catalog(Some(Path::new("/definitely/not/here.txt"))).unwrap_err();
        assert!(err.contains("/definitely/not/here.txt"));
    }
}
