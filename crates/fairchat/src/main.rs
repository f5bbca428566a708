//! fairchat - command-line client for the certification assistant
//!
//! Sends messages to the assistant backend and prints streamed replies, and
//! exposes the session lookups the chat view relies on.

use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

use fairchat::config::{self, APP_NAME, AppConfig};
use fairchat::{
    ApiClient, Conversation, ConversationOptions, HttpTransport, Intent, Reply, ReplyStatus,
    SessionManager,
};

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();
    debug!("using config {}", ctx.config_path.display());

    match cli.command {
        Command::Ask { message, chat } => handle_ask(&ctx, &message, &chat).await,
        Command::Chat(chat) => handle_chat(&ctx, &chat).await,
        Command::Context { session_id } => handle_context(&ctx, &session_id).await,
        Command::Clear { session_id } => handle_clear(&ctx, &session_id).await,
        Command::ModelUrl { model_id } => handle_model_url(&ctx, model_id).await,
        Command::Status => handle_status(&ctx).await,
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "fairchat",
    author,
    version,
    about = "Chat with the certification assistant from the terminal.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, short = 'c', value_name = "PATH", env = "FAIRCHAT_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Assistant backend URL (overrides the config file)
    #[arg(long, short = 's', env = "FAIRCHAT_SERVER_URL", global = true)]
    server: Option<String>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Args)]
struct ChatArgs {
    /// Model the conversation is about (required for code analysis)
    #[arg(long, short = 'm')]
    model_id: Option<i64>,
    /// Repository the server may fetch for context
    #[arg(long)]
    github_url: Option<String>,
    /// Scope key for the session id (defaults to the model id)
    #[arg(long)]
    scope: Option<String>,
    /// Wait for complete replies instead of streaming
    #[arg(long)]
    no_stream: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one message and print the reply
    Ask {
        /// The message to send
        message: String,
        #[command(flatten)]
        chat: ChatArgs,
    },
    /// Interactive chat reading messages from stdin
    ///
    /// Every line is one message. Ctrl-C stops the reply in progress.
    Chat(ChatArgs),
    /// Show the server-side context of a session
    Context {
        /// Session ID
        session_id: String,
    },
    /// Clear the server-side context of a session
    Clear {
        /// Session ID
        session_id: String,
    },
    /// Show the repository URL registered for a model
    ModelUrl {
        /// Model ID
        model_id: i64,
    },
    /// Check backend status
    Status,
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_path: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_path = config::resolve_config_path(common.config.as_deref())
            .context("resolving config path")?;
        let mut config = config::load_or_init_config(&config_path)
            .with_context(|| format!("loading config from {}", config_path.display()))?;
        if let Some(ref server) = common.server {
            config.server.url = server.clone();
        }
        Ok(Self {
            common,
            config_path,
            config,
        })
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return;
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("fairchat={level},reqwest={level}")));

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color)
                        .with_target(self.common.verbose > 1),
                )
                .try_init()
                .ok();
        }

        // Also init env_logger for compatibility with log crate users
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Warn),
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn http(&self) -> Result<HttpTransport> {
        HttpTransport::new(&self.config.server, self.config.auth.clone())
            .context("building HTTP client")
    }

    fn api(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(self.http()?, self.config.endpoints.clone()))
    }

    fn conversation(&self, args: &ChatArgs) -> Result<Conversation<HttpTransport>> {
        let scope = args
            .scope
            .clone()
            .or_else(|| args.model_id.map(|id| id.to_string()))
            .unwrap_or_else(|| self.config.chat.default_scope.clone());
        let streaming = self.config.chat.streaming && !args.no_stream;

        let session = SessionManager::new(scope);
        info!("chat session {}", session.id());

        Ok(Conversation::new(
            self.http()?,
            self.config.endpoints.clone(),
            session,
            ConversationOptions {
                model_id: args.model_id,
                github_url: args.github_url.clone(),
                streaming,
            },
        ))
    }
}

/// Cancels `token` on Ctrl-C until the returned handle is aborted.
fn cancel_on_ctrl_c(token: &CancellationToken) -> tokio::task::JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

async fn exchange(
    ctx: &RuntimeContext,
    convo: &mut Conversation<HttpTransport>,
    api: &ApiClient,
    message: &str,
) -> Result<Reply> {
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);
    let json = ctx.common.json;

    let mut printed = false;
    let reply = convo
        .send_observed(message, &cancel, &mut |fragment: &str| {
            if !json {
                print!("{fragment}");
                let _ = io::stdout().flush();
                printed = true;
            }
        })
        .await;
    watcher.abort();
    let reply = reply?;

    let text = convo
        .store()
        .get(&reply.assistant_message)
        .map(|m| m.text.clone())
        .unwrap_or_default();

    if json {
        let out = serde_json::json!({
            "session_id": convo.session().id(),
            "context_attached": convo.session().context_attached(),
            "reply": &reply,
            "text": text,
        });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("{}", reply_trailer(&reply.status, printed, &text));
    }

    if reply.route.intent == Intent::CodeAnalysis && ctx.config.session.reconcile_context {
        match api.session_context(convo.session().id()).await {
            Ok(context) => {
                convo.reconcile_context(&context);
            }
            Err(err) => warn!("could not reconcile session context: {err}"),
        }
    }

    Ok(reply)
}

/// What to print once a reply is over. `printed` says whether fragments
/// were already written to stdout.
fn reply_trailer(status: &ReplyStatus, printed: bool, text: &str) -> String {
    match status {
        ReplyStatus::Completed if printed => String::new(),
        ReplyStatus::Cancelled if printed => "\n(cancelled)".to_string(),
        ReplyStatus::Cancelled => "(cancelled)".to_string(),
        ReplyStatus::Failed { .. } if printed => format!("\n{text}"),
        _ => text.to_string(),
    }
}

/// Next input line, or `None` once input ends or `interrupt` fires.
async fn next_line_or_interrupt<R, F>(lines: &mut Lines<R>, interrupt: F) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = interrupt => {
            debug!("interrupted at prompt");
            Ok(None)
        }
        line = lines.next_line() => line.context("reading stdin"),
    }
}

async fn ctrl_c_pressed() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn handle_ask(ctx: &RuntimeContext, message: &str, args: &ChatArgs) -> Result<()> {
    let mut convo = ctx.conversation(args)?;
    let api = ctx.api()?;
    let reply = exchange(ctx, &mut convo, &api, message).await?;
    if let ReplyStatus::Failed { detail } = reply.status {
        anyhow::bail!("assistant request failed: {detail}");
    }
    Ok(())
}

async fn handle_chat(ctx: &RuntimeContext, args: &ChatArgs) -> Result<()> {
    let mut convo = ctx.conversation(args)?;
    let api = ctx.api()?;
    let interactive = io::stdin().is_terminal() && !ctx.common.json;

    if interactive {
        eprintln!(
            "Session {} - type a message, Ctrl-D to quit.",
            convo.session().id()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            eprint!("> ");
            let _ = io::stderr().flush();
        }
        let Some(line) = next_line_or_interrupt(&mut lines, ctrl_c_pressed()).await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        exchange(ctx, &mut convo, &api, line).await?;
    }

    info!(
        "chat session {} ended after {} messages",
        convo.session().id(),
        convo.store().len()
    );
    Ok(())
}

async fn handle_context(ctx: &RuntimeContext, session_id: &str) -> Result<()> {
    let context = ctx
        .api()?
        .session_context(session_id)
        .await
        .context("fetching session context")?;

    if ctx.common.json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    println!("Session:        {session_id}");
    println!("Code attached:  {}", if context.has_github_code { "yes" } else { "no" });
    println!("Messages:       {}", context.conversation_length);
    if let Some(model) = &context.model_info {
        println!("Model:          {}", model.name);
    }
    if !context.files_fetched.is_empty() {
        println!("Files:");
        for file in &context.files_fetched {
            println!("  {file}");
        }
    }
    Ok(())
}

async fn handle_clear(ctx: &RuntimeContext, session_id: &str) -> Result<()> {
    let response = ctx
        .api()?
        .clear_session(session_id)
        .await
        .context("clearing session")?;
    if ctx.common.json {
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("{}", response.message);
    }
    Ok(())
}

async fn handle_model_url(ctx: &RuntimeContext, model_id: i64) -> Result<()> {
    let url = ctx
        .api()?
        .model_github_url(model_id)
        .await
        .context("fetching model repository URL")?;
    if ctx.common.json {
        println!("{}", serde_json::json!({ "model_id": model_id, "github_url": url }));
    } else {
        match url {
            Some(url) => println!("{url}"),
            None => println!("Model {model_id} has no repository URL"),
        }
    }
    Ok(())
}

async fn handle_status(ctx: &RuntimeContext) -> Result<()> {
    let api = ctx.api()?;
    let healthy = api.health().await.context("checking backend health")?;

    if ctx.common.json {
        println!(
            "{}",
            serde_json::json!({ "status": if healthy { "ok" } else { "error" }, "server": api.base_url() })
        );
    } else if healthy {
        println!("Assistant backend is running at {}", api.base_url());
    } else {
        println!("Assistant backend at {} is not healthy", api.base_url());
    }
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else {
                println!(
                    "{}",
                    serde_yaml::to_string(&ctx.config).context("serializing config to YAML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            config::write_default_config(&ctx.config_path)
                .with_context(|| format!("resetting {}", ctx.config_path.display()))?;
            println!("Wrote default config to {}", ctx.config_path.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}
