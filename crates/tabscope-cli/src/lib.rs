use clap::{CommandFactory, Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File format for data files (used to bypass extension-based detection).
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FileFormat {
    /// Parquet columnar format
    Parquet,
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
    /// Pipe-separated values
    Psv,
    /// JSON array format
    Json,
    /// JSON Lines / NDJSON (one JSON object per line)
    Jsonl,
    /// Arrow IPC / Feather
    Arrow,
}

impl FileFormat {
    /// Detect file format from path extension. Returns None when extension is missing or unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Parse format from extension string (e.g. "parquet", "csv").
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "parquet" => Some(Self::Parquet),
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "psv" => Some(Self::Psv),
            "json" => Some(Self::Json),
            "jsonl" | "ndjson" => Some(Self::Jsonl),
            "arrow" | "ipc" | "feather" => Some(Self::Arrow),
            _ => None,
        }
    }

    /// Field separator for delimited text formats.
    pub fn default_delimiter(&self) -> Option<u8> {
        match self {
            Self::Csv => Some(b','),
            Self::Tsv => Some(b'\t'),
            Self::Psv => Some(b'|'),
            _ => None,
        }
    }
}

/// Text format for `--export`.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ExportKind {
    Csv,
    Tsv,
    Html,
}

/// A column given by name or by 0-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl FromStr for ColumnRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("column must not be empty".to_string());
        }
        Ok(match s.parse::<usize>() {
            Ok(i) => ColumnRef::Index(i),
            Err(_) => ColumnRef::Name(s.to_string()),
        })
    }
}

/// `COL` or `COL:desc` / `COL:asc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortArg {
    pub column: ColumnRef,
    pub ascending: bool,
}

impl FromStr for SortArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, ascending) = match s.rsplit_once(':') {
            Some((col, dir)) if dir.eq_ignore_ascii_case("desc") => (col, false),
            Some((col, dir)) if dir.eq_ignore_ascii_case("asc") => (col, true),
            _ => (s, true),
        };
        Ok(SortArg {
            column: column.parse()?,
            ascending,
        })
    }
}

/// `START:COUNT` window of visible rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    pub start: usize,
    pub count: usize,
}

impl FromStr for RowWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, count) = s
            .split_once(':')
            .ok_or_else(|| format!("expected START:COUNT, got '{}'", s))?;
        let start = start
            .trim()
            .parse()
            .map_err(|_| format!("invalid row start '{}'", start))?;
        let count = count
            .trim()
            .parse()
            .map_err(|_| format!("invalid row count '{}'", count))?;
        Ok(RowWindow { start, count })
    }
}

/// `COL:KIND` where KIND is a profile type such as `summary_stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileArg {
    pub column: ColumnRef,
    pub kind: String,
}

impl FromStr for ProfileArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, kind) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected COL:KIND, got '{}'", s))?;
        if kind.is_empty() {
            return Err(format!("missing profile kind in '{}'", s));
        }
        Ok(ProfileArg {
            column: column.parse()?,
            kind: kind.to_string(),
        })
    }
}

/// Command-line arguments for tabscope
#[derive(Clone, Parser, Debug)]
#[command(
    name = "tabscope",
    version,
    about = "Query, filter, sort and profile tabular data files",
    long_about = "Open a data file as a table view, apply row filters and sort keys, \
                  and print schema, cell values, exports and column profiles as JSON, \
                  one reply per line."
)]
pub struct Args {
    /// Path to the data file to open (not required with --generate-config)
    #[arg(required_unless_present = "generate_config", value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Force file format. By default format is detected from the file extension.
    #[arg(long = "format", value_enum)]
    pub format: Option<FileFormat>,

    /// Field delimiter for delimited text files
    #[arg(long = "delimiter", value_name = "C")]
    pub delimiter: Option<char>,

    /// Specify that the file has no header row
    #[arg(long = "no-header", action)]
    pub no_header: bool,

    /// Print the table schema
    #[arg(long = "schema", action)]
    pub schema: bool,

    /// Row filter as JSON (repeatable; combined in order)
    #[arg(long = "filter", value_name = "JSON")]
    pub filters: Vec<String>,

    /// Sort key COL[:desc] where COL is a column name or index (repeatable; first is primary)
    #[arg(long = "sort", value_name = "COL[:desc]")]
    pub sort: Vec<SortArg>,

    /// Print formatted values for visible rows START:COUNT
    #[arg(long = "rows", value_name = "START:COUNT")]
    pub rows: Option<RowWindow>,

    /// Column profile COL:KIND, e.g. price:summary_stats (repeatable)
    #[arg(long = "profile", value_name = "COL:KIND")]
    pub profiles: Vec<ProfileArg>,

    /// Export every visible row in this format
    #[arg(long = "export", value_enum)]
    pub export: Option<ExportKind>,

    /// Read JSON requests, one per line, from FILE ("-" for stdin)
    #[arg(long = "requests", value_name = "FILE")]
    pub requests: Option<PathBuf>,

    /// Generate default configuration file at ~/.config/tabscope/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,
}

/// Escape `|` and newlines for use in markdown table cells.
fn escape_table_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn value_placeholder(arg: &clap::Arg) -> String {
    arg.get_value_names()
        .map(|names| {
            names
                .iter()
                .map(|n: &clap::builder::Str| format!("<{}>", n.as_ref() as &str))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

/// Render command-line options as markdown.
///
/// Used by the gen_docs binary; output is written to stdout.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();

    let mut out = String::from("# Command Line Options\n\n");

    out.push_str("## Usage\n\n```\n");
    out.push_str(&cmd.render_usage().to_string());
    out.push_str("\n```\n\n");

    out.push_str("## Options\n\n");
    out.push_str("| Option | Description |\n");
    out.push_str("|--------|-------------|\n");

    for arg in cmd.get_arguments() {
        let id = arg.get_id().as_ref().to_string();
        if id == "help" || id == "version" {
            continue;
        }

        let option_str = if arg.is_positional() {
            let placeholder = value_placeholder(arg);
            if arg.is_required_set() {
                placeholder
            } else {
                format!("[{placeholder}]")
            }
        } else {
            let mut parts = Vec::new();
            if let Some(s) = arg.get_short() {
                parts.push(format!("-{s}"));
            }
            if let Some(l) = arg.get_long() {
                parts.push(format!("--{l}"));
            }
            let op = parts.join(", ");
            let placeholder = if arg.get_action().takes_values() {
                value_placeholder(arg)
            } else {
                String::new()
            };
            if placeholder.is_empty() {
                op
            } else {
                format!("{op} {placeholder}")
            }
        };

        let help = arg
            .get_help()
            .map(|h| escape_table_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!("| `{option_str}` | {help} |\n"));
    }

    out
}
