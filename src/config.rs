use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory layout of a billing project, all relative to one root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub root: PathBuf,
    /// Newly arrived progress certificates.
    pub input_dir: PathBuf,
    pub situacija_dir: PathBuf,
    pub izvedeno_dir: PathBuf,
    /// Cumulative summaries, nested under the izvedeno reports.
    pub summary_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_root(".")
    }
}

impl AppConfig {
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let output = root.join("Output");
        let izvedeno_dir = output.join("Izvedeno");
        Self {
            input_dir: root.join("Input"),
            situacija_dir: output.join("Situacija"),
            summary_dir: izvedeno_dir.join("kumulativni izveštaj"),
            izvedeno_dir,
            templates_dir: root.join("templates"),
            root,
            verbose: false,
        }
    }

    /// Loads the configuration from the environment. `MATIC_ROOT` selects the
    /// project root, `MATIC_VERBOSE` enables debug logging.
    pub fn from_env() -> Self {
        let root = std::env::var("MATIC_ROOT").unwrap_or_else(|_| ".".to_string());
        let mut config = Self::with_root(root);
        config.verbose = std::env::var("MATIC_VERBOSE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config
    }

    pub fn journal_path(&self) -> PathBuf {
        self.templates_dir.join("journal.csv")
    }

    pub fn situacija_template(&self) -> PathBuf {
        self.templates_dir.join("situacija_template.xlsx")
    }

    pub fn izvedeno_template(&self) -> PathBuf {
        self.templates_dir.join("izvedeno_template.xlsx")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_derive_layout_from_root() {
        let config = AppConfig::with_root("/srv/matic");

        assert_eq!(config.input_dir, PathBuf::from("/srv/matic/Input"));
        assert_eq!(config.situacija_dir, PathBuf::from("/srv/matic/Output/Situacija"));
        assert_eq!(config.izvedeno_dir, PathBuf::from("/srv/matic/Output/Izvedeno"));
        assert_eq!(
            config.summary_dir,
            PathBuf::from("/srv/matic/Output/Izvedeno/kumulativni izveštaj")
        );
        assert_eq!(config.journal_path(), PathBuf::from("/srv/matic/templates/journal.csv"));
        assert_eq!(
            config.izvedeno_template(),
            PathBuf::from("/srv/matic/templates/izvedeno_template.xlsx")
        );
    }
}
