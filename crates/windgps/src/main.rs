//! `windgps` - CLI for the wind/GPS capture decoder
//!
//! This binary decodes capture directories, stores the reconstructed timelines
//! and lets you browse the stored runs.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use clap::Parser;

use windgps::cli::{Cli, Command, ConfigCommand, InspectCommand, ProcessCommand, RunsCommand};
use windgps::codec::layout::LayoutDiscoverer;
use windgps::codec::RecordCodec;
use windgps::{find_log_files, init_logging, Config, Pipeline, Storage};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Process(cmd) => handle_process(config, cmd),
        Command::Inspect(cmd) => handle_inspect(&config, &cmd),
        Command::Runs(cmd) => handle_runs(&config, cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn handle_process(
    mut config: Config,
    cmd: ProcessCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(year) = cmd.year {
        config.clock.expected_year = Some(year);
    }
    if let Some(db) = cmd.db {
        config.storage.database_path = Some(db);
    }
    if !cmd.keys.is_empty() {
        config.wind.keys = cmd.keys;
    }
    config.validate()?;

    let files = find_log_files(&cmd.dir, &config.input)?;
    let dataset = Pipeline::from_config(&config)?.run(&files)?;

    let mut storage = Storage::open(config.database_path())?;
    let run_id = storage.insert_run(&dataset)?;
    let summary = dataset.summary();

    if cmd.json {
        let out = serde_json::json!({
            "run_id": run_id,
            "duplicate": run_id.is_none(),
            "database_path": storage.path(),
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Run:             {}", summary.label.as_deref().unwrap_or("-"));
        println!("Files:           {}", summary.files);
        println!("Layout:          {}", summary.geometry);
        println!("Records decoded: {}", summary.records_decoded);
        println!("Records dropped: {}", summary.records_dropped);
        println!("Dates repaired:  {}", summary.dates_repaired);
        println!(
            "Clock:           {} of {} anchors kept, slope {:.9} s/tick, intercept {:.3}",
            summary.inliers, summary.anchors, summary.slope, summary.intercept
        );
        println!("Rows:            {}", summary.rows);
        match run_id {
            Some(id) => println!("Stored as run {id} in {}", storage.path().display()),
            None => println!("Already stored in {}", storage.path().display()),
        }
    }
    Ok(())
}

fn handle_inspect(
    config: &Config,
    cmd: &InspectCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let codec = RecordCodec::new(config.layout.wind_text_len);
    let layout = LayoutDiscoverer::new(codec, config.layout.max_attempts)
        .discover_file(&cmd.file, config.layout.nominal_geometry())?;
    let block_size = codec.block_size(layout.geometry);
    let records = layout.block_count * layout.geometry.records_per_block as usize;

    if cmd.json {
        let out = serde_json::json!({
            "file": cmd.file,
            "layout": layout,
            "block_size": block_size,
            "record_count": records,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("File:       {}", cmd.file.display());
        println!("Layout:     {}", layout.geometry);
        println!("Block size: {block_size} bytes");
        println!("Blocks:     {}", layout.block_count);
        println!("Records:    {records}");
        println!("Attempts:   {}", layout.attempts);
        if layout.trailing_bytes > 0 {
            println!("Trailing:   {} bytes (partial block)", layout.trailing_bytes);
        }
    }
    Ok(())
}

fn handle_runs(config: &Config, cmd: RunsCommand) -> Result<(), Box<dyn std::error::Error>> {
    let mut storage = Storage::open(config.database_path())?;

    match cmd {
        RunsCommand::List { limit, json } => {
            let runs = storage.list_runs(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else if runs.is_empty() {
                println!("No runs stored in {}", storage.path().display());
            } else {
                for run in runs {
                    println!(
                        "{:>5}  {:<32}  {:>8} rows  {}",
                        run.id,
                        run.label.as_deref().unwrap_or("-"),
                        run.row_count,
                        run.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        RunsCommand::Show { id, samples, json } => {
            let Some(run) = storage.get_run(id)? else {
                return Err(format!("no run with id {id}").into());
            };
            let rows = if samples {
                storage.samples_for_run(id)?
            } else {
                Vec::new()
            };

            if json {
                let mut out = serde_json::json!({ "run": run });
                if samples {
                    out["samples"] = serde_json::to_value(&rows)?;
                }
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Run {}", run.id);
                println!("  Label:       {}", run.label.as_deref().unwrap_or("-"));
                println!("  Source hash: {}", run.source_hash);
                println!("  Stored:      {}", run.created_at.to_rfc3339());
                println!("  Files:       {}", run.file_count);
                println!("  Layout:      {}", run.geometry);
                println!(
                    "  Clock:       {} of {} anchors kept, slope {:.9}, intercept {:.3}",
                    run.inlier_count, run.anchor_count, run.slope, run.intercept
                );
                println!("  Rows:        {}", run.row_count);
                println!("  Wind keys:   {}", run.wind_keys.join(", "));
                for row in rows {
                    println!(
                        "  {:>6} {:>10} {:>11.6} {:>11.6} {:>16.3} {}",
                        row.seq,
                        row.local_millis,
                        row.latitude,
                        row.longitude,
                        row.epoch_seconds,
                        serde_json::to_string(&row.wind)?
                    );
                }
            }
        }
        RunsCommand::Delete { id } => {
            if storage.delete_run(id)? {
                println!("Deleted run {id}");
            } else {
                return Err(format!("no run with id {id}").into());
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Input]");
                println!("  Contains:            {}", config.input.contains);
                println!("  Excludes:            {}", config.input.excludes.join(", "));
                println!();
                println!("[Layout]");
                println!("  Nominal:             {}", config.layout.nominal_geometry());
                println!("  Max attempts:        {}", config.layout.max_attempts);
                println!("  Wind text width:     {}", config.layout.wind_text_len);
                println!("  Revalidate per file: {}", config.layout.revalidate_per_file);
                println!();
                println!("[Clock]");
                match config.clock.expected_year {
                    Some(year) => println!("  Expected year:       {year}"),
                    None => println!("  Expected year:       (unset)"),
                }
                println!("  Base year:           {}", config.clock.base_year);
                println!("  Residual threshold:  {} s", config.clock.residual_threshold);
                println!("  Max trials:          {}", config.clock.max_trials);
                println!("  Seed:                {}", config.clock.seed);
                println!();
                println!("[Wind]");
                println!("  Keys:                {}", config.wind.keys.join(", "));
                println!();
                println!("[Storage]");
                println!("  Database path:       {}", config.database_path().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
