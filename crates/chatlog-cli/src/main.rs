//! chatlog: decrypt and query a chat client's local archive
//!
//! Commands:
//!   decrypt             - decrypt an account's containers into a plain directory
//!   list-groups         - list group chats in a decrypted archive
//!   query               - print a conversation's messages for a time range
//!   config show         - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use chatlog_container::{Decryptor, ProgressFn};
use chatlog_core::config::ChatlogConfig;
use chatlog_core::time::{parse_bound, Bound};
use chatlog_crypto::Secret;
use chatlog_query::{ChatlogReader, MessageQuery};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "chatlog",
    version,
    about = "Chat archive decryptor and query tool",
    long_about = "chatlog: decrypt a chat client's encrypted local database containers and query conversation history"
)]
struct Cli {
    /// Path to chatlog.toml configuration file
    #[arg(long, short = 'c', env = "CHATLOG_CONFIG", default_value = "chatlog.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "CHATLOG_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "CHATLOG_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decrypt message shards and the contact directory
    ///
    /// The input may be the account data directory or its db_storage
    /// directory. Output is flat: message_N.db and contact.db.
    Decrypt {
        /// Account data directory
        #[arg(long, short = 'i')]
        input: PathBuf,
        /// Archive secret, 64 hex characters
        #[arg(long, short = 'k', env = "CHATLOG_KEY", hide_env_values = true)]
        key: String,
        /// Output directory for decrypted containers
        #[arg(long, short = 'o')]
        output: PathBuf,
    },

    /// List group chats
    #[command(name = "list-groups")]
    ListGroups {
        /// Decrypted archive directory
        #[arg(long)]
        db_path: PathBuf,
        /// Maximum number of rooms (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print a conversation's messages
    Query {
        /// Decrypted archive directory
        #[arg(long)]
        db_path: PathBuf,
        /// Conversation id (room id or contact id)
        #[arg(long, short = 't')]
        talker: String,
        /// Start of range: YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS" (default from config)
        #[arg(long)]
        start: Option<String>,
        /// End of range, inclusive; a bare date covers the whole day (default: now)
        #[arg(long)]
        end: Option<String>,
        /// Maximum number of messages (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        /// Messages to skip before the first one returned
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Include non-text messages (images, voice, system, ...)
        #[arg(long)]
        all_types: bool,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
        /// Write to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = match &cli.log_format {
        Some(format) => format.clone(),
        None => LogFormat::from_str(&config.logging.format, true).unwrap_or(LogFormat::Text),
    };
    init_logging(level, &format);
    debug!(config = %cli.config.display(), "configuration loaded");

    match cli.command {
        Commands::Decrypt { input, key, output } => cmd_decrypt(&config, &input, &key, &output),
        Commands::ListGroups { db_path, limit, json } => {
            cmd_list_groups(&config, &db_path, limit, json)
        }
        Commands::Query {
            db_path,
            talker,
            start,
            end,
            limit,
            offset,
            all_types,
            json,
            output,
        } => {
            let query = QueryArgs {
                talker,
                start,
                end,
                limit,
                offset,
                all_types,
            };
            cmd_query(&config, &db_path, query, json, output.as_deref())
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<ChatlogConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(ChatlogConfig::default())
    }
}

/// Logs go to stderr so stdout stays clean for `--json`.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── `chatlog decrypt` ─────────────────────────────────────────────────────────

fn cmd_decrypt(config: &ChatlogConfig, input: &Path, key: &str, output: &Path) -> Result<()> {
    let secret = Secret::from_hex(key).context("invalid --key")?;
    let decryptor = Decryptor::with_config(secret, &config.decrypt);

    if !input.is_dir() {
        anyhow::bail!("input directory not found: {}", input.display());
    }

    println!("Decrypting {} → {}", input.display(), output.display());

    let pb = make_progress_bar(0, "decrypt");
    let pb_clone = pb.clone();
    let progress: ProgressFn = Box::new(move |done, total, name| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(name.to_string());
    });

    let report = decryptor
        .decrypt_directory_with(input, output, Some(&progress), None)
        .with_context(|| format!("decrypting {}", input.display()))?;
    pb.finish_with_message("done".to_string());

    info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failures.len(),
        "decryption finished"
    );

    println!();
    println!("Decrypt complete:");
    println!("  succeeded: {} of {} files", report.succeeded, report.total);
    for failure in &report.failures {
        println!("  failed:    {} ({})", failure.path.display(), failure.error);
    }

    if report.total == 0 {
        anyhow::bail!("no containers found under {}", input.display());
    }
    if report.succeeded == 0 {
        anyhow::bail!("no container could be decrypted; check the key");
    }
    Ok(())
}

// ── `chatlog list-groups` ─────────────────────────────────────────────────────

fn cmd_list_groups(config: &ChatlogConfig, db_path: &Path, limit: usize, json: bool) -> Result<()> {
    let mut reader = ChatlogReader::with_config(db_path, config.query.clone());
    let rooms = reader
        .list_groups(limit)
        .with_context(|| format!("listing groups in {}", db_path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rooms)?);
        return Ok(());
    }

    for room in &rooms {
        println!("{:<32} {}", room.username, room.display_name());
    }
    println!();
    println!("{} groups", rooms.len());
    Ok(())
}

// ── `chatlog query` ───────────────────────────────────────────────────────────

struct QueryArgs {
    talker: String,
    start: Option<String>,
    end: Option<String>,
    limit: usize,
    offset: usize,
    all_types: bool,
}

fn cmd_query(
    config: &ChatlogConfig,
    db_path: &Path,
    args: QueryArgs,
    json: bool,
    output: Option<&Path>,
) -> Result<()> {
    let mut query = MessageQuery::new(&args.talker)
        .text_only(config.query.text_only && !args.all_types)
        .page(args.limit, args.offset);
    if let Some(start) = &args.start {
        query.start = Some(parse_bound(start, Bound::Start).context("invalid --start")?);
    }
    if let Some(end) = &args.end {
        query.end = Some(parse_bound(end, Bound::End).context("invalid --end")?);
    }

    let mut reader = ChatlogReader::with_config(db_path, config.query.clone());
    let messages = reader
        .get_messages(&query)
        .with_context(|| format!("querying {} in {}", args.talker, db_path.display()))?;
    let title = reader
        .get_group_display_name(&args.talker)
        .unwrap_or_else(|_| args.talker.clone());
    reader.close();

    let rendered = if json {
        serde_json::to_string_pretty(&messages).context("serializing messages")?
    } else {
        let mut text = format!("# {} ({} messages)\n", title, messages.len());
        for message in &messages {
            text.push_str(&message.format());
            text.push('\n');
        }
        text
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered.as_bytes())
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {} messages to {}", messages.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            if json {
                writeln!(stdout)?;
            }
        }
    }
    Ok(())
}

// ── `chatlog config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &ChatlogConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
