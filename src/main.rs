//! CLI entry point for `pecmbox`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use pecmbox::config::Config;
use pecmbox::model::summary::ParseResult;
use pecmbox::pipeline::{self, ParseOptions};

#[derive(Parser)]
#[command(
    name = "pecmbox",
    version,
    about = "Parse MBOX archives of certified mail (PEC)",
    long_about = "Parse MBOX archives of Italian certified mail (PEC): unwrap \
                  envelopes, extract bodies and attachments, and group \
                  messages into threads by subject."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an archive and list its messages
    Parse {
        path: PathBuf,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
        /// Write catalog.json and emails/<id>.json to this directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Show the subject groups of an archive
    Groups {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print one message as text
    Show {
        path: PathBuf,
        /// Message id (`email_…`)
        email_id: String,
    },
    /// Save all attachments to <DIR>/<email_id>/
    Attachments {
        path: PathBuf,
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = pecmbox::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let options = ParseOptions::from(&config);

    match cli.command {
        Commands::Parse { path, json, output } => {
            cmd_parse(&path, json, output.as_deref(), &options)
        }
        Commands::Groups { path, json } => cmd_groups(&path, json, &options),
        Commands::Show { path, email_id } => cmd_show(&path, &email_id, &options),
        Commands::Attachments { path, output } => cmd_attachments(&path, &output, &options),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = pecmbox::config::log_file_path(config);
    let log_dir = log_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "pecmbox.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Parse an archive behind a spinner.
fn parse_with_spinner(path: &Path, options: &ParseOptions) -> anyhow::Result<(ParseResult, Duration)> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    spinner.set_message(format!("Parsing {}", path.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let result = pipeline::parse_file(path, options);
    spinner.finish_and_clear();
    Ok((result?, start.elapsed()))
}

fn cmd_parse(
    path: &Path,
    json: bool,
    output: Option<&Path>,
    options: &ParseOptions,
) -> anyhow::Result<()> {
    let (result, elapsed) = parse_with_spinner(path, options)?;

    if let Some(dir) = output {
        let catalog = pecmbox::export::json::write_catalog(&result, dir)?;
        eprintln!("  Wrote {}", catalog.display());
    }

    if json {
        println!("{}", pecmbox::export::json::to_json_string(&result)?);
    } else {
        print_messages_table(path, &result, elapsed);
    }
    Ok(())
}

fn cmd_groups(path: &Path, json: bool, options: &ParseOptions) -> anyhow::Result<()> {
    let (result, _) = parse_with_spinner(path, options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.summary.groups)?);
        return Ok(());
    }

    println!();
    println!("  {} group(s)", result.summary.groups.len());
    println!();
    for group in &result.summary.groups {
        println!("  {:>4}  {}  {}", group.email_ids.len(), group.group_id, group.label);
        for email_id in &group.email_ids {
            if let Some(msg) = result.message(email_id) {
                let subject: String = msg.subject.chars().take(60).collect();
                println!("          {:<16} {}", msg.date, subject);
            }
        }
    }
    println!();
    Ok(())
}

fn cmd_show(path: &Path, email_id: &str, options: &ParseOptions) -> anyhow::Result<()> {
    let (result, _) = parse_with_spinner(path, options)?;
    let Some(msg) = result.message(email_id) else {
        anyhow::bail!("Message not found: {email_id}");
    };
    print!("{}", pecmbox::export::text::render_message(msg));
    Ok(())
}

fn cmd_attachments(path: &Path, output: &Path, options: &ParseOptions) -> anyhow::Result<()> {
    let (result, _) = parse_with_spinner(path, options)?;

    let with_att = result
        .messages
        .values()
        .filter(|m| !m.attachments.is_empty())
        .count();
    if with_att == 0 {
        println!("  No messages with attachments found.");
        return Ok(());
    }

    println!("  Extracting attachments from {with_att} message(s)");

    let pb = ProgressBar::new(result.messages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Extracting [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let paths = pecmbox::export::attachment::save_all_attachments(
        &result,
        output,
        &|current, _total| {
            pb.set_position(current as u64);
        },
    )?;

    pb.finish_and_clear();
    println!(
        "  Extracted {} attachment(s) to {}",
        paths.len(),
        output.display()
    );
    Ok(())
}

fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "pecmbox", &mut std::io::stdout());
    Ok(())
}

fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print the message list as a table.
fn print_messages_table(path: &Path, result: &ParseResult, elapsed: Duration) {
    use humansize::{format_size, BINARY};

    let summary = &result.summary;
    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    println!();
    println!("  {:<12} {}", "File", path.display());
    println!("  {:<12} {}", "Size", format_size(file_size, BINARY));
    println!("  {:<12} {}", "Source id", summary.source_id);
    println!("  {:<12} {}", "Messages", summary.email_count);
    println!("  {:<12} {}", "Groups", summary.groups.len());
    println!("  {:<12} {:.2?}", "Parse time", elapsed);
    println!();

    if summary.emails_summary.is_empty() {
        return;
    }

    println!(
        "  {:<18} {:<16} {:<28} {:<40} {:>3}",
        "Id", "Date", "From", "Subject", "Att"
    );
    println!("  {}", "-".repeat(109));

    for entry in &summary.emails_summary {
        let from: String = entry.sender.chars().take(27).collect();
        let subject: String = entry.subject.chars().take(39).collect();
        let date: String = entry.date.chars().take(16).collect();
        println!(
            "  {:<18} {:<16} {:<28} {:<40} {:>3}",
            entry.email_id, date, from, subject, entry.attachment_count
        );
    }
    println!();
}
