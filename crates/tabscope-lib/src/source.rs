//! Loading data files into a polars `DataFrame`.

use std::fs::File;
use std::path::Path;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::prelude::*;
use tabscope_cli::FileFormat;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Overrides extension-based detection.
    pub format: Option<FileFormat>,
    /// Overrides the format's default separator for delimited text.
    pub delimiter: Option<u8>,
    pub has_header: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            format: None,
            delimiter: None,
            has_header: true,
        }
    }
}

/// Format to read `path` as: the explicit choice, else the file extension.
pub fn resolve_format(path: &Path, options: &LoadOptions) -> Result<FileFormat> {
    options
        .format
        .or_else(|| FileFormat::from_path(path))
        .ok_or_else(|| {
            eyre!(
                "Could not determine the format of {}. Use --format to choose one.",
                path.display()
            )
        })
}

pub fn load_dataframe(path: &Path, options: &LoadOptions) -> Result<DataFrame> {
    if !path.exists() {
        return Err(eyre!("File not found: {}", path.display()));
    }
    let format = resolve_format(path, options)?;
    debug!(path = %path.display(), ?format, "loading table");

    let pl_path = PlPath::Local(path.into());
    let lf = match format {
        FileFormat::Csv | FileFormat::Tsv | FileFormat::Psv => {
            let separator = options
                .delimiter
                .or_else(|| format.default_delimiter())
                .unwrap_or(b',');
            LazyCsvReader::new(pl_path)
                .with_separator(separator)
                .with_has_header(options.has_header)
                .finish()?
        }
        FileFormat::Parquet => LazyFrame::scan_parquet(pl_path, Default::default())?,
        FileFormat::Arrow => LazyFrame::scan_ipc(pl_path, Default::default(), Default::default())?,
        FileFormat::Jsonl => LazyJsonLineReader::new(pl_path).finish()?,
        FileFormat::Json => {
            let file = File::open(path)?;
            return Ok(JsonReader::new(file)
                .with_json_format(JsonFormat::Json)
                .finish()?);
        }
    };
    Ok(lf.collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn csv_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "t.csv", "a,b\n1,x\n2,y\n");
        let df = load_dataframe(&path, &LoadOptions::default()).unwrap();
        assert_eq!(df.shape(), (2, 2));
        assert!(df.column("a").is_ok());
        assert!(df.column("b").is_ok());
    }

    #[test]
    fn explicit_format_and_delimiter() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "t.txt", "1;x\n2;y\n3;z\n");
        let options = LoadOptions {
            format: Some(FileFormat::Csv),
            delimiter: Some(b';'),
            has_header: false,
        };
        let df = load_dataframe(&path, &options).unwrap();
        assert_eq!(df.shape(), (3, 2));
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "t.dat", "a\n1\n");
        let err = load_dataframe(&path, &LoadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("--format"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_dataframe(Path::new("/nonexistent/t.csv"), &LoadOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
