use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use codestudio::{
    AppContext, BatchProcessor, DataKind, Encoded, EncodingInput, ExportEncoder as _,
    ExportFormat, Exported, ImageExporter, Locale, StudioConfig,
    export::{PdfFonts, history_file_name},
    payload::{VCardFields, WifiFields, WifiSecurity},
};

#[derive(Parser, Debug)]
#[command(name = "codestudio", version)]
struct Cli {
    /// Configuration JSON. Missing fields use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage directory from the configuration.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the canonical payload for one input.
    Encode(EncodeArgs),
    /// Print the canonical payload of every line in a file.
    Batch(BatchArgs),
    /// Inspect or manage the persisted generation history.
    #[command(subcommand)]
    History(HistoryCommand),
    /// Read or change the interface language preference.
    #[command(subcommand)]
    Locale(LocaleCommand),
}

#[derive(Parser, Debug)]
struct EncodeArgs {
    #[arg(long, value_enum, default_value_t = DataKind::PlainText)]
    kind: DataKind,

    /// Raw input for single-field kinds.
    raw: Option<String>,

    #[arg(long, default_value = "")]
    ssid: String,
    #[arg(long, default_value = "")]
    password: String,
    #[arg(long, value_enum, default_value_t = WifiSecurity::Wpa)]
    security: WifiSecurity,

    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    phone: String,
    #[arg(long, default_value = "")]
    email: String,
    #[arg(long, default_value = "")]
    org: String,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// Text file with one entry per line.
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long, value_enum, default_value_t = DataKind::PlainText)]
    kind: DataKind,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List entries, most recent first.
    List,
    /// Remove every entry.
    Clear,
    /// Write every entry's image into a directory.
    Export {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Png)]
        format: ExportFormat,
    },
}

#[derive(Subcommand, Debug)]
enum LocaleCommand {
    Get,
    Set {
        #[arg(value_enum)]
        locale: Locale,
    },
    Toggle,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Encode(args) => cmd_encode(args),
        Command::Batch(args) => cmd_batch(args),
        Command::History(cmd) => cmd_history(open_context(cli.config, cli.data_dir)?, cmd),
        Command::Locale(cmd) => cmd_locale(open_context(cli.config, cli.data_dir)?, cmd),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_context(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<AppContext> {
    let mut cfg = match config {
        Some(path) => StudioConfig::from_json_file(&path)?,
        None => StudioConfig::default(),
    };
    if let Some(dir) = data_dir {
        cfg.data_dir = dir;
    }
    AppContext::open(cfg).context("open application context")
}

fn cmd_encode(args: EncodeArgs) -> anyhow::Result<()> {
    let input = match args.kind {
        DataKind::Wifi => EncodingInput::Wifi(WifiFields {
            ssid: args.ssid,
            password: args.password,
            security: args.security,
        }),
        DataKind::VCard => EncodingInput::VCard(VCardFields {
            name: args.name,
            phone: args.phone,
            email: args.email,
            organization: args.org,
        }),
        kind => EncodingInput::from_raw(kind, args.raw.unwrap_or_default())?,
    };
    match codestudio::encode(&input) {
        Encoded::Payload(payload) => println!("{payload}"),
        Encoded::Skipped => eprintln!("nothing to encode"),
    }
    Ok(())
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read batch input '{}'", args.in_path.display()))?;
    let mut batch = BatchProcessor::new();
    batch.load(&text);
    for (index, item) in batch.items().iter().enumerate() {
        let input = EncodingInput::from_raw(args.kind, item.raw_line.as_str())?;
        match codestudio::encode(&input) {
            Encoded::Payload(payload) => {
                println!("{}\t{}", index + 1, payload.as_str().escape_debug())
            }
            Encoded::Skipped => println!("{}\t-", index + 1),
        }
    }
    eprintln!("{} lines", batch.len());
    Ok(())
}

fn cmd_history(mut ctx: AppContext, cmd: HistoryCommand) -> anyhow::Result<()> {
    match cmd {
        HistoryCommand::List => {
            for entry in ctx.history().list() {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.id,
                    entry.result.kind.as_str(),
                    entry
                        .result
                        .created_at
                        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                    entry.result.payload.as_str().escape_debug()
                );
            }
        }
        HistoryCommand::Clear => {
            ctx.history_mut().clear();
            if let Some(e) = ctx.history().last_persist_error() {
                anyhow::bail!("history cleared in memory only: {e}");
            }
        }
        HistoryCommand::Export { out, format } => {
            std::fs::create_dir_all(&out)
                .with_context(|| format!("create output dir '{}'", out.display()))?;
            let mut exporter = ImageExporter::new();
            if let Some(dir) = ctx.config().pdf_font_dir.clone() {
                exporter = exporter.with_pdf_fonts(PdfFonts {
                    dir,
                    family: ctx.config().pdf_font_family.clone(),
                });
            }
            let mut written = 0usize;
            for entry in ctx.history().list() {
                match exporter.export(&entry.result, format) {
                    Ok(Exported::File(mut file)) => {
                        file.name = history_file_name(entry, format.extension());
                        let path = file.write_into(&out)?;
                        eprintln!("wrote {}", path.display());
                        written += 1;
                    }
                    Ok(Exported::Unavailable(notice)) => eprintln!("#{}: {notice}", entry.id),
                    Err(e) => eprintln!("#{}: {e}", entry.id),
                }
            }
            eprintln!("{written} of {} entries exported", ctx.history().len());
        }
    }
    Ok(())
}

fn cmd_locale(mut ctx: AppContext, cmd: LocaleCommand) -> anyhow::Result<()> {
    let locale = match cmd {
        LocaleCommand::Get => ctx.locale().get(),
        LocaleCommand::Set { locale } => {
            ctx.locale_mut()
                .set(locale)
                .context("persist locale preference")?;
            locale
        }
        LocaleCommand::Toggle => ctx
            .locale_mut()
            .toggle()
            .context("persist locale preference")?,
    };
    println!("{locale}");
    Ok(())
}
