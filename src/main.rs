use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::json;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use tabscope_cli::{Args, ColumnRef, ExportKind};
use tabscope_lib::comm::{
    ArraySelection, ColumnProfileRequest, ColumnProfileSpec, ColumnProfileType, ColumnSelection,
    ColumnSortKey, DataSelectionRange, ExplorerEvent, ExplorerReply, ExplorerRequest,
    ExportFormat, RowFilter, TableSelection,
};
use tabscope_lib::error_display::{user_message_from_explorer, user_message_from_report};
use tabscope_lib::{
    load_dataframe, AppConfig, ConfigManager, DataExplorer, ExplorerConfig, LoadOptions,
    PolarsBackend, APP_NAME,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const CLI_CALLBACK_ID: &str = "cli";

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_options(args: &Args) -> Result<LoadOptions> {
    let delimiter = match args.delimiter {
        Some(c) if c.is_ascii() => Some(c as u8),
        Some(c) => return Err(eyre!("Delimiter must be a single ASCII character, got '{}'", c)),
        None => None,
    };
    Ok(LoadOptions {
        format: args.format,
        delimiter,
        has_header: !args.no_header,
    })
}

fn resolve_column(explorer: &DataExplorer, column: &ColumnRef) -> Result<usize> {
    let backend = explorer.backend();
    match column {
        ColumnRef::Index(i) if *i < backend.num_columns() => Ok(*i),
        ColumnRef::Index(i) => Err(eyre!(
            "Column {} is out of range ({} columns)",
            i,
            backend.num_columns()
        )),
        ColumnRef::Name(name) => {
            for i in 0..backend.num_columns() {
                if backend.column_name(i)? == *name {
                    return Ok(i);
                }
            }
            Err(eyre!("No column named '{}'", name))
        }
    }
}

/// Requests implied by the command-line flags, in execution order.
fn requests_from_args(args: &Args, explorer: &DataExplorer) -> Result<Vec<ExplorerRequest>> {
    let mut requests = Vec::new();
    let num_columns = explorer.backend().num_columns();

    if !args.filters.is_empty() {
        let filters = args
            .filters
            .iter()
            .map(|f| {
                serde_json::from_str::<RowFilter>(f)
                    .map_err(|e| eyre!("Invalid --filter JSON '{}': {}", f, e))
            })
            .collect::<Result<Vec<_>>>()?;
        requests.push(ExplorerRequest::SetRowFilters { filters });
    }

    if !args.sort.is_empty() {
        let sort_keys = args
            .sort
            .iter()
            .map(|s| {
                Ok(ColumnSortKey {
                    column_index: resolve_column(explorer, &s.column)?,
                    ascending: s.ascending,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        requests.push(ExplorerRequest::SetSortColumns { sort_keys });
    }

    if args.schema {
        requests.push(ExplorerRequest::GetSchema {
            column_indices: (0..num_columns as i64).collect(),
        });
    }

    if let Some(window) = args.rows.filter(|w| w.count > 0) {
        let first_index = window.start as i64;
        let last_index = first_index + window.count as i64 - 1;
        requests.push(ExplorerRequest::GetDataValues {
            columns: (0..num_columns as i64)
                .map(|column_index| ColumnSelection {
                    column_index,
                    spec: ArraySelection::Range {
                        first_index,
                        last_index,
                    },
                })
                .collect(),
            format_options: None,
        });
    }

    if !args.profiles.is_empty() {
        let mut profiles = Vec::with_capacity(args.profiles.len());
        for p in &args.profiles {
            let profile_type: ColumnProfileType = serde_json::from_value(json!(p.kind))
                .map_err(|_| eyre!("Unknown profile kind '{}'", p.kind))?;
            profiles.push(ColumnProfileRequest {
                column_index: resolve_column(explorer, &p.column)? as i64,
                profiles: vec![ColumnProfileSpec::new(profile_type)],
            });
        }
        requests.push(ExplorerRequest::GetColumnProfiles {
            callback_id: CLI_CALLBACK_ID.to_string(),
            profiles,
            format_options: None,
        });
    }

    if let Some(kind) = args.export {
        let format = match kind {
            ExportKind::Csv => ExportFormat::Csv,
            ExportKind::Tsv => ExportFormat::Tsv,
            ExportKind::Html => ExportFormat::Html,
        };
        requests.push(ExplorerRequest::ExportDataSelection {
            selection: TableSelection::RowRange(DataSelectionRange {
                first_index: 0,
                last_index: i64::MAX,
            }),
            format,
        });
    }

    Ok(requests)
}

fn read_request_lines(path: &Path) -> Result<Vec<ExplorerRequest>> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(std::fs::File::open(path)?))
    };
    let mut requests = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request = serde_json::from_str(&line)
            .map_err(|e| eyre!("{}:{}: invalid request: {}", path.display(), n + 1, e))?;
        requests.push(request);
    }
    Ok(requests)
}

fn print_json(out: &mut impl Write, value: &impl serde::Serialize) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Wait for the profile results of `callback_id`, printing any other events
/// that arrive first.
fn await_profiles(
    events: &Receiver<ExplorerEvent>,
    callback_id: &str,
    out: &mut impl Write,
) -> Result<()> {
    loop {
        let event = events
            .recv()
            .map_err(|_| eyre!("Profile worker stopped before replying"))?;
        let done = matches!(
            &event,
            ExplorerEvent::ColumnProfilesReady { callback_id: id, .. } if id == callback_id
        );
        print_json(out, &event)?;
        if done {
            return Ok(());
        }
    }
}

fn run(args: &Args, config: &AppConfig) -> Result<()> {
    let path = args
        .path
        .as_deref()
        .ok_or_else(|| eyre!("A data file path is required"))?;
    let df = load_dataframe(path, &load_options(args)?)?;
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let (tx, rx) = mpsc::channel::<ExplorerEvent>();
    let mut explorer = DataExplorer::new(
        display_name,
        Arc::new(PolarsBackend::new(df)),
        ExplorerConfig::from(config),
        tx,
    )?;

    let mut requests = requests_from_args(args, &explorer)?;
    if let Some(file) = &args.requests {
        requests.extend(read_request_lines(file)?);
    }
    if requests.is_empty() {
        requests.push(ExplorerRequest::GetState);
    }
    debug!(count = requests.len(), "running requests");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for request in requests {
        let callback_id = match &request {
            ExplorerRequest::GetColumnProfiles { callback_id, .. } => Some(callback_id.clone()),
            _ => None,
        };
        match explorer.handle_request(request) {
            Ok(reply) => {
                print_json(&mut out, &reply)?;
                if let (ExplorerReply::GetColumnProfiles, Some(id)) = (&reply, callback_id) {
                    await_profiles(&rx, &id, &mut out)?;
                }
            }
            Err(err) => {
                print_json(&mut out, &json!({ "error": user_message_from_explorer(&err) }))?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.generate_config {
        let path = ConfigManager::new(APP_NAME)?.write_default_config(args.force)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    color_eyre::install()?;
    let config = AppConfig::load(APP_NAME)?;
    init_logging(&config.logging.level);

    if let Err(e) = run(&args, &config) {
        eprintln!("Error: {}", user_message_from_report(&e, args.path.as_deref()));
        std::process::exit(1);
    }
    Ok(())
}
