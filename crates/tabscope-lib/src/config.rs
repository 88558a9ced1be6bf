use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::comm::{ColumnHistogramMethod, FormatOptions};
use crate::profile::ProfileDefaults;
use crate::schema::SchemaCacheLimits;

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Default configuration as TOML with every field commented out, so the
    /// file changes nothing until a line is uncommented.
    pub fn generate_default_config(&self) -> Result<String> {
        let toml_str = toml::to_string_pretty(&AppConfig::default())
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
        Ok(Self::comment_all_fields(&toml_str, &Self::collect_all_comments()))
    }

    fn collect_all_comments() -> HashMap<String, String> {
        let mut comments = HashMap::new();
        for (field, comment) in APP_COMMENTS {
            comments.insert(field.to_string(), comment.to_string());
        }
        let sections: [(&str, &[(&str, &str)]); 4] = [
            ("schema", SCHEMA_COMMENTS),
            ("profiles", PROFILES_COMMENTS),
            ("format", FORMAT_COMMENTS),
            ("logging", LOGGING_COMMENTS),
        ];
        for (section, fields) in sections {
            for (field, comment) in fields {
                comments.insert(format!("{}.{}", section, field), comment.to_string());
            }
        }
        comments
    }

    fn comment_all_fields(toml: &str, comments: &HashMap<String, String>) -> String {
        let mut result = String::new();
        result.push_str("# tabscope configuration file\n");
        result
            .push_str("# This file uses TOML format. See https://toml.io/ for syntax reference.\n");
        result.push('\n');

        let mut current_section = String::new();
        let mut seen_fields = HashSet::new();

        for line in toml.lines() {
            if let Some(section) = Self::extract_section_name(line) {
                if let Some((_, header)) = SECTION_HEADERS.iter().find(|(s, _)| *s == section) {
                    result.push_str(header);
                    result.push('\n');
                }
                current_section = section;
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
                continue;
            }

            if let Some(field_path) = Self::extract_field_path(line, &current_section) {
                if let Some(comment) = comments.get(&field_path) {
                    for comment_line in comment.lines() {
                        result.push_str("# ");
                        result.push_str(comment_line);
                        result.push('\n');
                    }
                }
                seen_fields.insert(field_path);
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
            } else {
                result.push_str(line);
                result.push('\n');
            }
        }

        Self::add_missing_option_fields(result, comments, &seen_fields)
    }

    /// Option fields are skipped by the serializer when unset; list them
    /// anyway with an example value.
    fn add_missing_option_fields(
        mut result: String,
        comments: &HashMap<String, String>,
        seen_fields: &HashSet<String>,
    ) -> String {
        const OPTION_FIELDS: &[(&str, &str)] = &[("format.thousands_sep", "\",\"")];

        for (field_path, example) in OPTION_FIELDS {
            if seen_fields.contains(*field_path) {
                continue;
            }
            let Some((section, field_name)) = field_path.split_once('.') else {
                continue;
            };
            let section_header = format!("[{}]", section);
            let Some(section_pos) = result.find(&section_header) else {
                continue;
            };
            let after_header_start = section_pos + section_header.len();
            let newline_pos = result[after_header_start..].find('\n').unwrap_or(0);
            let insert_pos = after_header_start + newline_pos + 1;

            let mut new_content = String::new();
            if let Some(comment) = comments.get(*field_path) {
                for comment_line in comment.lines() {
                    new_content.push_str("# ");
                    new_content.push_str(comment_line);
                    new_content.push('\n');
                }
            }
            new_content.push_str(&format!("# {} = {}\n", field_name, example));
            result.insert_str(insert_pos, &new_content);
        }
        result
    }

    fn extract_section_name(line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            Some(trimmed[1..trimmed.len() - 1].to_string())
        } else {
            None
        }
    }

    fn extract_field_path(line: &str, current_section: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }
        let (field_name, _) = trimmed.split_once('=')?;
        let field_name = field_name.trim();
        if current_section.is_empty() {
            Some(field_name.to_string())
        } else {
            Some(format!("{}.{}", current_section, field_name))
        }
    }

    /// Write the commented default configuration to `config.toml`.
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, self.generate_default_config()?)?;
        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub schema: SchemaConfig,
    pub profiles: ProfilesConfig,
    pub format: FormatConfig,
    pub logging: LoggingConfig,
}

const APP_COMMENTS: &[(&str, &str)] = &[(
    "version",
    "Configuration format version (for future compatibility)",
)];

const SECTION_HEADERS: &[(&str, &str)] = &[
    (
        "schema",
        "# ============================================================================\n# Schema Caching\n# ============================================================================\n# Tables under both limits have their full schema inspected up front.",
    ),
    (
        "profiles",
        "# ============================================================================\n# Column Profile Defaults\n# ============================================================================\n# Used when a profile request carries no parameters.",
    ),
    (
        "format",
        "# ============================================================================\n# Value Formatting Defaults\n# ============================================================================",
    ),
    (
        "logging",
        "# ============================================================================\n# Logging\n# ============================================================================",
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub max_cached_columns: usize,
    pub max_cached_cells: usize,
}

const SCHEMA_COMMENTS: &[(&str, &str)] = &[
    (
        "max_cached_columns",
        "Largest column count whose schema is cached eagerly (> 0)",
    ),
    (
        "max_cached_cells",
        "Largest rows x columns product whose schema is cached eagerly (> 0)",
    ),
];

impl Default for SchemaConfig {
    fn default() -> Self {
        let limits = SchemaCacheLimits::default();
        Self {
            max_cached_columns: limits.max_cached_columns,
            max_cached_cells: limits.max_cached_cells,
        }
    }
}

impl SchemaConfig {
    pub fn merge(&mut self, other: Self) {
        let default = SchemaConfig::default();
        if other.max_cached_columns != default.max_cached_columns {
            self.max_cached_columns = other.max_cached_columns;
        }
        if other.max_cached_cells != default.max_cached_cells {
            self.max_cached_cells = other.max_cached_cells;
        }
    }
}

impl From<&SchemaConfig> for SchemaCacheLimits {
    fn from(config: &SchemaConfig) -> Self {
        SchemaCacheLimits {
            max_cached_columns: config.max_cached_columns,
            max_cached_cells: config.max_cached_cells,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    pub histogram_method: ColumnHistogramMethod,
    pub small_histogram_bins: usize,
    pub large_histogram_bins: usize,
    pub small_frequency_limit: usize,
    pub large_frequency_limit: usize,
}

const PROFILES_COMMENTS: &[(&str, &str)] = &[
    (
        "histogram_method",
        "Bin count rule: \"fixed\", \"sturges\", \"freedman_diaconis\" or \"scott\"",
    ),
    (
        "small_histogram_bins",
        "Maximum bins for small histograms (> 0)",
    ),
    (
        "large_histogram_bins",
        "Maximum bins for large histograms (> 0)",
    ),
    (
        "small_frequency_limit",
        "Values listed in small frequency tables (> 0)",
    ),
    (
        "large_frequency_limit",
        "Values listed in large frequency tables (> 0)",
    ),
];

impl Default for ProfilesConfig {
    fn default() -> Self {
        ProfilesConfig::from(&ProfileDefaults::default())
    }
}

impl From<&ProfileDefaults> for ProfilesConfig {
    fn from(defaults: &ProfileDefaults) -> Self {
        Self {
            histogram_method: defaults.histogram_method,
            small_histogram_bins: defaults.small_histogram_bins,
            large_histogram_bins: defaults.large_histogram_bins,
            small_frequency_limit: defaults.small_frequency_limit,
            large_frequency_limit: defaults.large_frequency_limit,
        }
    }
}

impl From<&ProfilesConfig> for ProfileDefaults {
    fn from(config: &ProfilesConfig) -> Self {
        ProfileDefaults {
            histogram_method: config.histogram_method,
            small_histogram_bins: config.small_histogram_bins,
            large_histogram_bins: config.large_histogram_bins,
            small_frequency_limit: config.small_frequency_limit,
            large_frequency_limit: config.large_frequency_limit,
        }
    }
}

impl ProfilesConfig {
    pub fn merge(&mut self, other: Self) {
        let default = ProfilesConfig::default();
        if other.histogram_method != default.histogram_method {
            self.histogram_method = other.histogram_method;
        }
        if other.small_histogram_bins != default.small_histogram_bins {
            self.small_histogram_bins = other.small_histogram_bins;
        }
        if other.large_histogram_bins != default.large_histogram_bins {
            self.large_histogram_bins = other.large_histogram_bins;
        }
        if other.small_frequency_limit != default.small_frequency_limit {
            self.small_frequency_limit = other.small_frequency_limit;
        }
        if other.large_frequency_limit != default.large_frequency_limit {
            self.large_frequency_limit = other.large_frequency_limit;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub large_num_digits: usize,
    pub small_num_digits: usize,
    pub max_integral_digits: usize,
    pub max_value_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thousands_sep: Option<String>,
}

const FORMAT_COMMENTS: &[(&str, &str)] = &[
    (
        "large_num_digits",
        "Decimal places for numbers with magnitude >= 1",
    ),
    (
        "small_num_digits",
        "Decimal places for numbers with magnitude < 1",
    ),
    (
        "max_integral_digits",
        "Integral digits before switching to scientific notation",
    ),
    (
        "max_value_length",
        "Longest string value returned before truncation (> 0)",
    ),
    (
        "thousands_sep",
        "Optional: separator inserted between groups of thousands",
    ),
];

impl Default for FormatConfig {
    fn default() -> Self {
        let opts = FormatOptions::default();
        Self {
            large_num_digits: opts.large_num_digits,
            small_num_digits: opts.small_num_digits,
            max_integral_digits: opts.max_integral_digits,
            max_value_length: opts.max_value_length,
            thousands_sep: opts.thousands_sep,
        }
    }
}

impl From<&FormatConfig> for FormatOptions {
    fn from(config: &FormatConfig) -> Self {
        FormatOptions {
            large_num_digits: config.large_num_digits,
            small_num_digits: config.small_num_digits,
            max_integral_digits: config.max_integral_digits,
            max_value_length: config.max_value_length,
            thousands_sep: config.thousands_sep.clone(),
        }
    }
}

impl FormatConfig {
    pub fn merge(&mut self, other: Self) {
        let default = FormatConfig::default();
        if other.large_num_digits != default.large_num_digits {
            self.large_num_digits = other.large_num_digits;
        }
        if other.small_num_digits != default.small_num_digits {
            self.small_num_digits = other.small_num_digits;
        }
        if other.max_integral_digits != default.max_integral_digits {
            self.max_integral_digits = other.max_integral_digits;
        }
        if other.max_value_length != default.max_value_length {
            self.max_value_length = other.max_value_length;
        }
        if other.thousands_sep.is_some() {
            self.thousands_sep = other.thousands_sep;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive; `RUST_LOG` overrides it.
    pub level: String,
}

const LOGGING_COMMENTS: &[(&str, &str)] = &[(
    "level",
    "Log filter (error, warn, info, debug, trace or a tracing directive such as \"tabscope_lib=debug\")\nThe RUST_LOG environment variable takes precedence",
)];

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        if other.level != LoggingConfig::default().level {
            self.level = other.level;
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            schema: SchemaConfig::default(),
            profiles: ProfilesConfig::default(),
            format: FormatConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        let config_path = ConfigManager::new(app_name)?.config_path("config.toml");
        Self::load_from(&config_path)
    }

    /// Defaults merged with the file at `path`, if it exists.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = AppConfig::default();
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| eyre!("Failed to read config file at {}: {}", path.display(), e))?;
            let user_config: AppConfig = toml::from_str(&content)
                .map_err(|e| eyre!("Failed to parse config file at {}: {}", path.display(), e))?;
            config.merge(user_config);
        }

        config
            .validate()
            .map_err(|e| eyre!("Invalid configuration in {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }
        self.schema.merge(other.schema);
        self.profiles.merge(other.profiles);
        self.format.merge(other.format);
        self.logging.merge(other.logging);
    }

    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        let positive = [
            ("schema.max_cached_columns", self.schema.max_cached_columns),
            ("schema.max_cached_cells", self.schema.max_cached_cells),
            ("profiles.small_histogram_bins", self.profiles.small_histogram_bins),
            ("profiles.large_histogram_bins", self.profiles.large_histogram_bins),
            ("profiles.small_frequency_limit", self.profiles.small_frequency_limit),
            ("profiles.large_frequency_limit", self.profiles.large_frequency_limit),
            ("format.max_value_length", self.format.max_value_length),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(eyre!("{} must be greater than 0", name));
        }

        if self.logging.level.trim().is_empty() {
            return Err(eyre!("logging.level must not be empty"));
        }

        Ok(())
    }

    pub fn schema_limits(&self) -> SchemaCacheLimits {
        SchemaCacheLimits::from(&self.schema)
    }

    pub fn profile_defaults(&self) -> ProfileDefaults {
        ProfileDefaults::from(&self.profiles)
    }

    pub fn format_options(&self) -> FormatOptions {
        FormatOptions::from(&self.format)
    }
}
