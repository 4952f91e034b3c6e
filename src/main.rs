use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use cat_mt_assist::service::TermPair;
use cat_mt_assist::{
    GeneralSettings, HttpChannel, Injector, Message, MessageChannel, Modifiers, OptionsPage,
    Popup, ProviderKind, Runtime,
};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "cat-mt-assist",
    version,
    about = "Machine-translation assistant for CAT editor pages"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Send messages to a running server instead of handling them in process
    #[arg(long = "channel", global = true)]
    channel: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the message channel and status page over HTTP
    Serve {
        /// Listen address (default from settings [server] addr)
        #[arg(long = "addr")]
        addr: Option<String>,
    },
    /// Translate text read from the argument or stdin
    Translate {
        #[arg(short = 'p', long = "provider")]
        provider: String,
        /// Glossary entry as SOURCE=TARGET (repeatable)
        #[arg(short = 't', long = "term")]
        terms: Vec<String>,
        /// Preceding segments passed as reference context
        #[arg(short = 'c', long = "context")]
        context: Option<String>,
        text: Option<String>,
    },
    /// Run a provider's usage or balance query
    Query { service: String },
    /// Read or edit provider settings
    Options {
        #[command(subcommand)]
        action: OptionsAction,
    },
    /// Show one status card per provider
    Status {
        /// Ignore cached readings
        #[arg(long = "refresh")]
        refresh: bool,
    },
    /// Click a provider button on a saved editor page and write the result
    Inject {
        /// HTML snapshot of the editor page
        #[arg(long = "page")]
        page: PathBuf,
        #[arg(short = 'p', long = "provider")]
        provider: String,
        #[arg(long = "ctrl")]
        ctrl: bool,
        #[arg(long = "meta")]
        meta: bool,
        /// Where to write the updated page (default: stdout)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Print the copy-button text for the active segment of a saved page
    Copy {
        #[arg(long = "page")]
        page: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum OptionsAction {
    Show {
        provider: String,
    },
    /// Save fields given as NAME=VALUE; unspecified fields keep their stored value
    Save {
        provider: String,
        #[arg(short = 's', long = "set")]
        values: Vec<String>,
    },
    /// Write the provider's default values
    Reset {
        provider: String,
    },
    General {
        #[arg(long = "debug")]
        debug: Option<bool>,
        #[arg(long = "formatter")]
        formatter: Option<bool>,
        #[arg(long = "context-window")]
        context_window: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cat_mt_assist::logging::init(cli.verbose)?;
    let runtime = Runtime::load(cli.read_settings.as_deref().map(Path::new))?;

    match cli.command {
        Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| runtime.settings.server_addr.clone());
            cat_mt_assist::server::run_server(runtime.coordinator()?, addr).await
        }
        Command::Options { action } => run_options(&runtime, action),
        command => {
            let channel = open_channel(&runtime, cli.channel.as_deref())?;
            run_with_channel(&runtime, channel.as_ref(), command).await
        }
    }
}

fn open_channel(runtime: &Runtime, url: Option<&str>) -> Result<Box<dyn MessageChannel>> {
    let channel: Box<dyn MessageChannel> = match url {
        Some(url) => Box::new(HttpChannel::new(url)),
        None => Box::new(runtime.coordinator()?),
    };
    Ok(channel)
}

async fn run_with_channel(
    runtime: &Runtime,
    channel: &dyn MessageChannel,
    command: Command,
) -> Result<()> {
    match command {
        Command::Translate {
            provider,
            terms,
            context,
            text,
        } => {
            let text = match text {
                Some(text) => text,
                None => read_stdin()?,
            };
            let terms = terms
                .iter()
                .map(|raw| parse_term(raw))
                .collect::<Result<Vec<_>>>()?;
            let reply = channel
                .send(Message::translate(provider, text, terms, context))
                .await?;
            match (reply.translation, reply.error) {
                (Some(translation), _) => println!("{}", translation),
                (None, Some(error)) => return Err(anyhow!(error)),
                (None, None) => return Err(anyhow!("empty reply")),
            }
        }
        Command::Query { service } => {
            let reply = channel.send(Message::query_service(service)).await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        Command::Status { refresh } => {
            let cards = Popup::new(runtime.storage.clone(), channel)
                .cards(refresh)
                .await;
            for card in cards {
                println!("{:<10} {:<9} {}", card.label, card.badge.as_str(), card.meta);
            }
        }
        Command::Inject {
            page,
            provider,
            ctrl,
            meta,
            output,
        } => {
            let kind = provider.parse::<ProviderKind>()?;
            let mut injector = load_page(runtime, &page)?;
            let outcome = injector
                .click_provider(kind, Modifiers { ctrl, meta }, channel)
                .await;
            for toast in injector.toasts().entries() {
                eprintln!("{}", toast.message);
            }
            tracing::debug!("click outcome: {:?}", outcome);
            injector.run_frame();
            write_output(output.as_deref(), &injector.html())?;
        }
        Command::Copy { page } => {
            let mut injector = load_page(runtime, &page)?;
            let text = injector
                .click_copy()
                .ok_or_else(|| anyhow!("no active segment on page"))?;
            println!("{}", text);
        }
        Command::Serve { .. } | Command::Options { .. } => {}
    }
    Ok(())
}

fn run_options(runtime: &Runtime, action: OptionsAction) -> Result<()> {
    let page = OptionsPage::new(runtime.storage.clone());
    match action {
        OptionsAction::Show { provider } => {
            let form = page.load(provider.parse::<ProviderKind>()?);
            println!("{}", serde_json::to_string_pretty(&form)?);
        }
        OptionsAction::Save { provider, values } => {
            let mut form = page.load(provider.parse::<ProviderKind>()?);
            for raw in &values {
                let (name, value) = raw
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected NAME=VALUE, got {}", raw))?;
                if !form.set(name.trim(), value) {
                    return Err(anyhow!("unknown field for {}: {}", form.provider, name));
                }
            }
            println!("{}", page.save(&form)?);
        }
        OptionsAction::Reset { provider } => {
            let form = page.reset(provider.parse::<ProviderKind>()?);
            println!("{}", page.save(&form)?);
        }
        OptionsAction::General {
            debug,
            formatter,
            context_window,
        } => {
            let mut general = page.general();
            if debug.is_none() && formatter.is_none() && context_window.is_none() {
                println!("{}", serde_json::to_string_pretty(&general)?);
                return Ok(());
            }
            general = GeneralSettings {
                debug: debug.unwrap_or(general.debug),
                formatter_enabled: formatter.unwrap_or(general.formatter_enabled),
                context_window_size: context_window.unwrap_or(general.context_window_size),
            };
            page.save_general(&general)?;
            println!("{}", serde_json::to_string_pretty(&page.general())?);
        }
    }
    Ok(())
}

fn load_page(runtime: &Runtime, path: &Path) -> Result<Injector> {
    let html = fs::read_to_string(path)
        .with_context(|| format!("failed to read page: {}", path.display()))?;
    let debug = cat_mt_assist::logging::DebugFlag::watch(&runtime.storage);
    Ok(Injector::load(&html, &runtime.storage, &runtime.settings, &debug))
}

fn write_output(path: Option<&Path>, html: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, html)
            .with_context(|| format!("failed to write page: {}", path.display())),
        None => {
            println!("{}", html);
            Ok(())
        }
    }
}

fn parse_term(raw: &str) -> Result<TermPair> {
    let (source, target) = raw.split_once('=').unwrap_or((raw, ""));
    let source = source.trim();
    if source.is_empty() {
        return Err(anyhow!("term source is empty: {}", raw));
    }
    Ok(TermPair::new(source, target.trim()))
}

fn read_stdin() -> Result<String> {
    if io::stdin().is_terminal() {
        return Err(anyhow!("no text given; pass it as an argument or on stdin"));
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}
