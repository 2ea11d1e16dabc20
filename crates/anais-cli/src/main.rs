use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anais_core::config_file::{self, ConfigFile};
use anais_core::{AiClient, Config, ProviderKind, PromptSet};
use anais_reporting::CsvHeaders;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod output;

use output::ColorMode;

/// Anais Migrator - Move OJS proceedings metadata into import-ready CSV files
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, complete and normalize the metadata of every article
    Migrate {
        /// Saved HTML of the proceedings table of contents
        #[arg(long)]
        toc: PathBuf,

        /// Directory holding one PDF (or pre-extracted .txt) per article
        #[arg(long)]
        pdf_dir: PathBuf,

        /// Directory for the CSV, JSON and log output
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Model provider: openai or anthropic
        #[arg(long)]
        provider: Option<String>,

        /// Model name (provider default when omitted)
        #[arg(long)]
        model: Option<String>,

        /// Explicit config file, layered over the default cascade
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of articles processed concurrently
        #[arg(long)]
        workers: Option<usize>,

        /// Only migrate the first N articles of the table of contents
        #[arg(long)]
        limit: Option<usize>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Do not write the pre-correction CSV set
        #[arg(long)]
        no_snapshot: bool,
    },

    /// Parse the table of contents and show the page windows, without model calls
    DryRun {
        #[arg(long)]
        toc: PathBuf,

        #[arg(long)]
        pdf_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        limit: Option<usize>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Write a config file populated with the defaults
    InitConfig {
        /// Destination (platform config directory when omitted)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate {
            toc,
            pdf_dir,
            output,
            provider,
            model,
            config,
            workers,
            limit,
            no_color,
            no_snapshot,
        } => {
            migrate(
                toc,
                pdf_dir,
                output,
                provider,
                model,
                config,
                workers,
                limit,
                no_color,
                no_snapshot,
            )
            .await
        }
        Command::DryRun {
            toc,
            pdf_dir,
            config,
            limit,
            no_color,
        } => dry_run(toc, pdf_dir, config, limit, no_color).await,
        Command::InitConfig { path, force } => init_config(path, force),
    }
}

/// Stderr logging, plus an uncolored copy in `log_dir/migration.log`.
fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,anais=info"));

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file = File::create(dir.join("migration.log"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();
    Ok(())
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve configuration: CLI flags > env vars > config files > defaults.
fn resolve_config(
    explicit: Option<&Path>,
    provider: Option<String>,
    model: Option<String>,
    workers: Option<usize>,
) -> anyhow::Result<(Config, ConfigFile)> {
    let file = match explicit {
        Some(path) => config_file::merge(
            config_file::load_config(),
            config_file::load_required(path)?,
        ),
        None => config_file::load_config(),
    };

    let mut config = Config::default();
    file.apply(&mut config)?;

    let env_provider = env_nonempty("ANAIS_PROVIDER").or_else(|| {
        env_nonempty("USE_OPENAI")
            .filter(|v| v.eq_ignore_ascii_case("false") || v == "0")
            .map(|_| ProviderKind::Anthropic.as_str().to_string())
    });
    if let Some(name) = provider.or(env_provider) {
        let selected: ProviderKind = name.parse()?;
        if selected != config.provider {
            config.provider = selected;
            config.api_key = file.api_key_for(selected);
        }
    }

    if let Some(key) = env_nonempty(config.provider.api_key_env()) {
        config.api_key = Some(key);
    }
    if let Some(model) = model.or_else(|| env_nonempty("ANAIS_MODEL")) {
        config.model = Some(model);
    }
    if let Some(n) = workers {
        config.num_workers = n;
    }

    Ok((config, file))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

async fn load_sources(
    toc: PathBuf,
    pdf_dir: PathBuf,
    limit: Option<usize>,
) -> anyhow::Result<anais_ingest::IngestReport> {
    use indicatif::{ProgressBar, ProgressStyle};

    if !toc.exists() {
        anyhow::bail!("Table of contents not found: {}", toc.display());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}").unwrap());
    spinner.set_message(format!("Extracting text from {}", pdf_dir.display()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result =
        tokio::task::spawn_blocking(move || anais_ingest::ingest(&toc, &pdf_dir, limit)).await;
    spinner.finish_and_clear();

    Ok(result??)
}

#[allow(clippy::too_many_arguments)]
async fn migrate(
    toc: PathBuf,
    pdf_dir: PathBuf,
    output: PathBuf,
    provider: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
    workers: Option<usize>,
    limit: Option<usize>,
    no_color: bool,
    no_snapshot: bool,
) -> anyhow::Result<()> {
    init_logging(Some(&output.join("logs")))?;
    let color = ColorMode(!no_color);

    let (config, file) = resolve_config(config_path.as_deref(), provider, model, workers)?;

    if config.api_key.is_none() {
        anyhow::bail!(
            "No API key for provider {}: set {} or add it to the [api_keys] section of the config file",
            config.provider.as_str(),
            config.provider.api_key_env()
        );
    }

    let prompts = match config.prompts_file {
        Some(ref path) => PromptSet::load(path)?,
        None => PromptSet::default(),
    };
    let backend = anais_core::ai::build_backend(&config)?;
    let ai = Arc::new(AiClient::from_config(backend, &config, prompts));
    tracing::info!(provider = ai.provider(), workers = config.num_workers, "client ready");

    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());
    let toc_name = display_name(&toc);
    let ingest = load_sources(toc, pdf_dir, limit).await?;

    output::print_ingest_summary(
        &mut writer,
        &toc_name,
        ingest.sources.len(),
        &ingest.missing,
        color,
    )?;

    if ingest.sources.is_empty() {
        writeln!(writer, "No articles to migrate.")?;
        return Ok(());
    }

    // Set up progress callback
    let progress_writer: Arc<Mutex<Box<dyn Write + Send>>> =
        Arc::new(Mutex::new(Box::new(std::io::stdout())));
    let progress_cb = {
        let pw = Arc::clone(&progress_writer);
        move |event: anais_core::ProgressEvent| {
            if let Ok(mut w) = pw.lock() {
                let _ = output::print_progress(&mut *w, &event, color);
                let _ = w.flush();
            }
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let report = anais_core::migrate(ingest.sources, config, ai, progress_cb, cancel).await;

    let headers = CsvHeaders::from_config(file.output.as_ref());
    let snapshot = !no_snapshot
        && file
            .output
            .as_ref()
            .and_then(|o| o.snapshot)
            .unwrap_or(true);
    let written =
        anais_reporting::export_run(&output, &report, &headers, snapshot, &ingest.missing)?;

    output::print_failures(&mut writer, &report, color)?;
    output::print_summary(&mut writer, &report, ingest.missing.len(), &written, color)?;

    Ok(())
}

async fn dry_run(
    toc: PathBuf,
    pdf_dir: PathBuf,
    config_path: Option<PathBuf>,
    limit: Option<usize>,
    no_color: bool,
) -> anyhow::Result<()> {
    use owo_colors::OwoColorize;

    init_logging(None)?;
    let color = ColorMode(!no_color);
    let (config, _) = resolve_config(config_path.as_deref(), None, None, None)?;
    let window_config = anais_parsing::WindowConfig {
        head_pages: config.head_pages,
        tail_pages: config.tail_pages,
    };

    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());
    let toc_name = display_name(&toc);
    let ingest = load_sources(toc, pdf_dir, limit).await?;

    output::print_ingest_summary(
        &mut writer,
        &toc_name,
        ingest.sources.len(),
        &ingest.missing,
        color,
    )?;

    for (i, source) in ingest.sources.iter().enumerate() {
        let windows = anais_parsing::select_windows(&source.pages, &window_config);
        let header = format!(
            "[{}] {} ({}, {} pages)",
            i + 1,
            source.label(),
            source.html.section,
            source.pages.len()
        );
        if color.enabled() {
            writeln!(writer, "{}", header.bold())?;
        } else {
            writeln!(writer, "{}", header)?;
        }
        writeln!(writer, "  id:    {}", source.id)?;
        writeln!(
            writer,
            "  pages: {}",
            match (source.html.page_from, source.html.page_to) {
                (Some(from), Some(to)) => format!("{}-{}", from, to),
                (Some(from), None) => from.to_string(),
                _ => "-".to_string(),
            }
        )?;
        writeln!(
            writer,
            "  head:  pages {:?}, {} chars",
            windows.head_pages,
            windows.head.chars().count()
        )?;
        if config.skips_references(&source.html.section) {
            writeln!(writer, "  tail:  skipped for section {}", source.html.section)?;
        } else {
            writeln!(
                writer,
                "  tail:  pages {:?}, {} chars",
                windows.tail_pages,
                windows.tail.chars().count()
            )?;
        }
        if anais_parsing::has_encoding_damage(&windows.head) {
            let warning = "  head text shows encoding damage";
            if color.enabled() {
                writeln!(writer, "{}", warning.yellow())?;
            } else {
                writeln!(writer, "{}", warning)?;
            }
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let contents = ConfigFile::from_config(&Config::default());
    let target = match path {
        Some(ref path) => path.clone(),
        None => config_file::config_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?,
    };
    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            target.display()
        );
    }
    let written = match path {
        Some(path) => {
            config_file::save_to_path(&contents, &path)?;
            path
        }
        None => config_file::save_config(&contents)?,
    };
    println!("Wrote {}", written.display());
    Ok(())
}
