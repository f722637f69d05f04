//! Classification rule sets.
//!
//! The defaults cover Windows, Linux and macOS system locations, developer
//! caches, secrets and binary noise. A TOML rules file replaces any set it
//! names; sets it does not name keep their defaults.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_DENIED_DIRS: &[&str] = &[
    // Windows
    "Windows",
    "Program Files",
    "Program Files (x86)",
    "ProgramData",
    "AppData",
    "Local Settings",
    "Application Data",
    "$Recycle.Bin",
    "System Volume Information",
    "Recovery",
    "Config.Msi",
    "PerfLogs",
    "Microsoft",
    "!WGUA.Bin",
    // Unix
    "usr",
    "bin",
    "etc",
    "var",
    "proc",
    "sys",
    "dev",
    "run",
    "snap",
    ".config",
    ".local",
    ".cache",
    ".gnupg",
    ".ssh",
    // Development
    ".venv",
    "venv",
    "env",
    "__pycache__",
    "node_modules",
    ".git",
    ".vscode",
    ".idea",
    "build",
    "dist",
    "target",
    "bower_components",
    "jspm_packages",
    // Sync clients and caches
    ".dropbox.cache",
    ".stversions",
    "Temp",
    "tmp",
    "cache",
    "Cache",
    "thumbnails",
    "Code Cache",
    "GPUCache",
];

const DEFAULT_DENIED_EXTENSIONS: &[&str] = &[
    // Keys and secrets
    "key", "pem", "token", "env", "secret", "pfx", "crt", "cer", "p12",
    // System, binaries, executables
    "dll", "sys", "exe", "msi", "bat", "sh", "com", "vbs", "cmd", "lnk", "ini", "dat", "bin",
    "iso", "vmdk", "vdi", "img", "reg", "rec", "pf", "swp", "class", "backup", "user", "vsidx",
    "v2", "sln", "pdb", "cache", "settings", "up2date", "dpb", "cat", "inf", "gpd", "cfg",
    // Databases, including our own
    "db", "sqlite", "sqlite3", "mdb", "accdb", "db-journal", "db-wal", "db-shm", "ldb",
    // Temporary files and logs
    "tmp", "log", "temp", "bak", "old",
    // Compiled Python
    "pyc", "pyo", "pyd",
    // CAD lock files and autosaves
    "dwl", "dwl2", "sv$",
    // Video
    "3g2", "3gp", "mp4", "mpeg", "mpg", "flv", "avi", "wma", "wmv",
    // Misc
    "err", "rdp", "gp3", "gp", "lock",
];

const DEFAULT_DENIED_FILE_NAMES: &[&str] = &[
    "id_rsa",
    "id_ed25519",
    "known_hosts",
    ".htpasswd",
    ".netrc",
    "thumbs.db",
    "desktop.ini",
    ".ds_store",
];

const DEFAULT_LOCK_PREFIXES: &[&str] = &["~$", ".~lock."];

const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    // Knowledge and text
    "md", "txt", "rst", "adoc", "text",
    // Code
    "py", "json", "toml", "css", "html", "js", "ts", "sql", "xml", "yaml", "yml", "c", "cpp",
    "cs", "java", "config", "ico", "resx", "csproj", "props", "targets",
    // CAD and 3D
    "fcstd", "blend", "dwg", "dxf", "rvt", "rfa", "ifc", "stl", "obj", "pc3", "ctb", "pzh",
    "3dm", "sat", "skp",
    // Images and design
    "svg", "png", "jpg", "jpeg", "jpe", "bmp", "webp", "tiff", "gif", "aep", "ai", "aif", "ait",
    "eps", "exif",
    // Office and mail
    "ods", "odt", "odp", "eml", "mbox", "xlsx", "docx", "pptx", "pdf", "csv", "docb", "docm",
    "dotm", "dotx", "potm", "potx", "ppam", "ppsm", "ppsx", "pptm", "rtf", "wps", "xls",
    "xlsb", "xlsm", "xltm", "xltx",
    // Archives
    "7z", "rar",
];

/// Deny/allow sets consumed by the classifier.
///
/// Extensions are stored lower-cased without a leading dot. Directory names
/// are matched exactly against path segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Directory names that are never entered.
    pub denied_dirs: BTreeSet<String>,
    /// Extensions that are never recorded.
    pub denied_extensions: BTreeSet<String>,
    /// Whole file names that are never recorded (case-insensitive).
    pub denied_file_names: BTreeSet<String>,
    /// File name prefixes marking editor lock or temp files.
    pub lock_prefixes: Vec<String>,
    /// Extensions recorded without asking.
    pub allowed_extensions: BTreeSet<String>,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            denied_dirs: to_set(DEFAULT_DENIED_DIRS),
            denied_extensions: to_set(DEFAULT_DENIED_EXTENSIONS),
            denied_file_names: to_set(DEFAULT_DENIED_FILE_NAMES),
            lock_prefixes: DEFAULT_LOCK_PREFIXES.iter().map(|s| (*s).to_string()).collect(),
            allowed_extensions: to_set(DEFAULT_ALLOWED_EXTENSIONS),
        }
    }
}

impl FilterRules {
    /// Rules with every set empty. Mostly useful for building small rule sets.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            denied_dirs: BTreeSet::new(),
            denied_extensions: BTreeSet::new(),
            denied_file_names: BTreeSet::new(),
            lock_prefixes: Vec::new(),
            allowed_extensions: BTreeSet::new(),
        }
    }

    /// Parse rules from TOML text, normalize and validate them.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or the sets overlap.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let rules: Self = toml::from_str(text)
            .map_err(|e| Error::config(format!("invalid rules file: {e}")))?;
        let rules = rules.normalized();
        rules.validate()?;
        Ok(rules)
    }

    /// Load rules from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read rules file '{}': {e}", path.display()))
        })?;
        let rules = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            denied_dirs = rules.denied_dirs.len(),
            denied_extensions = rules.denied_extensions.len(),
            allowed_extensions = rules.allowed_extensions.len(),
            "Loaded classification rules"
        );
        Ok(rules)
    }

    /// Lower-case extensions and file names, strip leading dots from extensions.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            denied_dirs: self.denied_dirs,
            denied_extensions: self
                .denied_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            denied_file_names: self
                .denied_file_names
                .iter()
                .map(|n| n.to_lowercase())
                .collect(),
            lock_prefixes: self.lock_prefixes,
            allowed_extensions: self
                .allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
        }
    }

    /// Check that no extension is both allowed and denied.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the overlapping extensions.
    pub fn validate(&self) -> Result<()> {
        let overlap: Vec<&str> = self
            .allowed_extensions
            .intersection(&self.denied_extensions)
            .map(String::as_str)
            .collect();

        if !overlap.is_empty() {
            return Err(Error::config(format!(
                "extensions both allowed and denied: {}",
                overlap.join(", ")
            )));
        }

        if self.lock_prefixes.iter().any(String::is_empty) {
            return Err(Error::config("lock prefixes cannot be empty"));
        }

        Ok(())
    }
}

/// Lower-case an extension and drop any leading dots.
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

fn to_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
