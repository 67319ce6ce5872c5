use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::config::{ExperimentConfig, RowOrder};
use crate::errors::PipelineError;
use crate::experiments::{PRESET_NAMES, preset};
use crate::metrics::table_support_skew;
use crate::pipeline::SummaryPipeline;
use crate::source::{RecordSource, SourceTags, open_source};
use crate::summary::SummaryTable;
use crate::transport::fs::{FileDiscovery, file_stem_label, source_id_for};

type DynSource = Box<dyn RecordSource>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "summarize",
    disable_help_subcommand = true,
    about = "Aggregate experiment records into a summary table",
    long_about = "Read raw experiment output files, pair bidirectional half-search records, group, normalize, drop under-supported groups, and emit one tidy summary table.",
    after_help = "Exactly one of --config or --preset selects the experiment. Sources are read in the order given: explicit --source paths first, then each --source-dir in sorted path order."
)]
/// CLI for `summarize`.
///
/// Common usage:
/// - Built-in experiment over a directory: `--preset intervals --source-dir data/intervals --tag-field gen`
/// - Custom JSON config and explicit files: `--config exp.json --source a.out --source b.out`
/// - Write CSV to a file instead of stdout: `--output summary.csv`
struct SummarizeCli {
    #[arg(
        long,
        value_name = "PATH",
        conflicts_with = "preset",
        help = "JSON experiment configuration"
    )]
    config: Option<PathBuf>,
    #[arg(
        long,
        value_name = "NAME",
        value_parser = parse_preset_name,
        help = "Built-in experiment configuration"
    )]
    preset: Option<String>,
    #[arg(
        long = "source",
        value_name = "PATH",
        help = "Raw output file, repeat as needed in source order"
    )]
    sources: Vec<PathBuf>,
    #[arg(
        long = "source-dir",
        value_name = "DIR",
        help = "Directory searched recursively for raw output files"
    )]
    source_dirs: Vec<PathBuf>,
    #[arg(
        long = "extension",
        value_name = "EXT",
        help = "File extension picked up under --source-dir, repeat as needed"
    )]
    extensions: Vec<String>,
    #[arg(
        long = "tag-field",
        value_name = "FIELD",
        help = "Stamp each source's file stem into FIELD and group by it"
    )]
    tag_field: Option<String>,
    #[arg(
        long = "min-support",
        value_name = "N",
        help = "Override the experiment's minimum group size"
    )]
    min_support: Option<u64>,
    #[arg(long, help = "Emit rows in ascending key order")]
    sorted: bool,
    #[arg(long, value_name = "PATH", help = "Output file (stdout when omitted)")]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv, help = "Output format")]
    format: OutputFormat,
}

/// Run the `summarize` demo with the given arguments (program name excluded).
pub fn run_summarize<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) =
        parse_cli::<SummarizeCli, _>(std::iter::once("summarize".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let config = resolve_config(&cli)?;
    let sources = collect_sources(&cli, &config)?;
    let pipeline = SummaryPipeline::new(config)?;
    let table = pipeline.run(&sources)?;

    match &cli.output {
        Some(path) => {
            write_table(&table, cli.format, BufWriter::new(File::create(path)?))?;
            eprintln!("Wrote {} rows to {}", table.len(), path.display());
        }
        None => write_table(&table, cli.format, io::stdout().lock())?,
    }
    print_support_report(&table);
    Ok(())
}

fn resolve_config(cli: &SummarizeCli) -> Result<ExperimentConfig, PipelineError> {
    let mut config = match (&cli.config, &cli.preset) {
        (Some(path), _) => ExperimentConfig::from_json_path(path)?,
        (None, Some(name)) => preset(name).ok_or_else(|| {
            PipelineError::Configuration(format!("unknown experiment preset '{name}'"))
        })?,
        (None, None) => {
            return Err(PipelineError::Configuration(
                "one of --config or --preset is required".to_string(),
            ));
        }
    };
    if let Some(field) = &cli.tag_field
        && !config.group_by.contains(field)
    {
        config.group_by.insert(0, field.clone());
    }
    if let Some(min_support) = cli.min_support {
        config.min_support = min_support;
    }
    if cli.sorted {
        config.row_order = RowOrder::Sorted;
    }
    Ok(config)
}

fn collect_sources(
    cli: &SummarizeCli,
    config: &ExperimentConfig,
) -> Result<Vec<DynSource>, PipelineError> {
    let tags_for = |path: &Path| -> SourceTags {
        match &cli.tag_field {
            Some(field) => vec![(field.clone(), file_stem_label(path).into())],
            None => Vec::new(),
        }
    };

    let mut sources: Vec<DynSource> = Vec::new();
    for path in &cli.sources {
        let source_id = file_stem_label(path);
        sources.push(open_source(source_id, path, &config.input, tags_for(path.as_path())));
    }
    for dir in &cli.source_dirs {
        let mut discovery = FileDiscovery::new(dir);
        if !cli.extensions.is_empty() {
            discovery = discovery.with_extensions(cli.extensions.iter().cloned());
        }
        for path in discovery.discover()? {
            let source_id = source_id_for(dir, &path);
            sources.push(open_source(
                source_id,
                &path,
                &config.input,
                tags_for(path.as_path()),
            ));
        }
    }
    if sources.is_empty() {
        return Err(PipelineError::Configuration(
            "no record sources given; pass --source or --source-dir".to_string(),
        ));
    }
    Ok(sources)
}

fn write_table<W: Write>(
    table: &SummaryTable,
    format: OutputFormat,
    mut writer: W,
) -> Result<(), PipelineError> {
    match format {
        OutputFormat::Csv => table.write_csv(writer),
        OutputFormat::Json => {
            table.write_json(&mut writer)?;
            writeln!(writer)?;
            writer.flush()?;
            Ok(())
        }
    }
}

fn print_support_report(table: &SummaryTable) {
    eprintln!();
    eprintln!("[SUPPORT] {}", table.experiment());
    eprintln!("  records aggregated: {}", table.record_count());
    eprintln!("  groups kept: {}", table.len());
    eprintln!("  groups dropped: {}", table.dropped_groups());
    if let Some(skew) = table_support_skew(table) {
        eprintln!(
            "  group size: min {} / mean {:.1} / max {} (max/min {:.2})",
            skew.min, skew.mean, skew.max, skew.ratio
        );
        for share in skew.per_group.iter().take(5) {
            eprintln!(
                "    {:<32} {:>8} ({:.1}%)",
                share.group,
                share.count,
                share.share * 100.0
            );
        }
    }
    for diagnostic in table.diagnostics() {
        eprintln!("  [WARN] {diagnostic}");
    }
}

fn parse_preset_name(raw: &str) -> Result<String, String> {
    if PRESET_NAMES.contains(&raw) {
        Ok(raw.to_string())
    } else {
        Err(format!(
            "unknown preset '{}'; expected one of: {}",
            raw,
            PRESET_NAMES.join(", ")
        ))
    }
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn args(values: &[&str]) -> impl Iterator<Item = String> {
        values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn summarize_writes_csv_for_a_tagged_directory() {
        let temp = tempdir().unwrap();
        let data = temp.path().join("insertions");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("gnp.out"), "insertions,acc,algo\n3,acc,d\n5,rej,d\n").unwrap();
        fs::write(data.join("rhg.out"), "insertions,acc,algo\n4,acc,bd\n").unwrap();
        let output = temp.path().join("summary.csv");

        run_summarize(args(&[
            "--preset",
            "insertions",
            "--source-dir",
            data.to_str().unwrap(),
            "--tag-field",
            "gen",
            "--output",
            output.to_str().unwrap(),
        ]))
        .unwrap();

        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "gen,algo,count,insertions_mean,insertions_median,acceptance_rate"
        );
        assert_eq!(lines[1], "gnp,d,2,4,4,0.5");
        assert_eq!(lines[2], "rhg,bd,1,4,4,1");
    }

    #[test]
    fn summarize_requires_an_experiment() {
        let err = run_summarize(args(&["--source", "missing.out"])).unwrap_err();
        assert!(err.to_string().contains("--config or --preset"));
    }

    #[test]
    fn summarize_rejects_unknown_presets() {
        assert!(run_summarize(args(&["--preset", "plots"])).is_err());
    }

    #[test]
    fn help_exits_cleanly() {
        assert!(run_summarize(args(&["--help"])).is_ok());
    }
}
