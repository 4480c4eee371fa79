//! stru - terminal chat client for the stru completion service

mod auth;
mod commands;
mod config;
mod ui;
mod utils;

use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use stru_api::{Completion, CompletionClient, IdentityClient, SessionContext};
use stru_chat::{ChatHandle, ChatSession, HttpTransport, RetryConfig};
use tracing_subscriber::EnvFilter;

/// stru - chat with the stru completion service
#[derive(Parser, Debug)]
#[command(name = "stru")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Send a single message and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Service origin (default: https://api.stru.ai)
    #[arg(long)]
    base_url: Option<String>,

    /// User id sent with completion requests
    #[arg(short, long)]
    user_id: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Log in through the browser
    #[arg(long)]
    login: bool,

    /// Log in with a session token you already have
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Log out and forget the saved session token
    #[arg(long)]
    logout: bool,

    /// Show the logged-in user
    #[arg(long)]
    whoami: bool,

    /// Ask the service for a haiku
    #[arg(long)]
    haiku: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("stru=debug,stru_api=debug,stru_chat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();
    let base_url = cfg.resolve_base_url(args.base_url.as_deref());
    tracing::debug!(%base_url, "using service");

    let http = stru_api::client::build_http_client(cfg.connect_timeout())
        .context("Failed to build HTTP client")?;
    let identity = IdentityClient::with_client(http.clone(), base_url.clone());

    if args.login || args.token.is_some() {
        return handle_login(&identity, args.token).await;
    }

    if args.logout {
        return handle_logout(&identity).await;
    }

    let credentials = auth::load_credentials();

    // CLI takes precedence over config, config over the saved login
    let user_id = args
        .user_id
        .or(cfg.user_id.clone())
        .or_else(|| credentials.as_ref().and_then(|c| c.user_id.clone()))
        .unwrap_or_else(|| "anonymous".to_string());

    let mut context = SessionContext::new(user_id);
    if let Some(credentials) = credentials {
        context = context.with_token(credentials.token);
    }

    if args.whoami {
        return show_whoami(&identity, &context).await;
    }

    if args.haiku {
        return show_haiku(&identity, &context).await;
    }

    let retry = match cfg.max_retries {
        Some(max_retries) => RetryConfig {
            max_retries,
            ..Default::default()
        },
        None => RetryConfig::default(),
    };
    let transport = HttpTransport::new(CompletionClient::with_client(http, base_url))
        .with_retry_config(retry);

    let mut session = ChatSession::new(context, Arc::new(transport));
    install_ctrl_c(session.handle());

    // Non-interactive mode
    if let Some(command) = args.command {
        return run_command(&mut session, &command).await;
    }

    run_interactive(&mut session, &identity).await
}

/// Ctrl-C stops a streaming answer; when idle it exits
fn install_ctrl_c(handle: ChatHandle) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("Could not listen for Ctrl-C");
                return;
            }
            if handle.is_streaming() {
                handle.abort();
            } else {
                std::process::exit(130);
            }
        }
    });
}

/// Send one message, printing the answer as it streams
async fn run_turn(session: &mut ChatSession, input: &str) -> stru_chat::Result<Completion> {
    let printer = ui::spawn_printer(session.subscribe());
    let result = session.send(input).await;

    let turn_started = !matches!(
        result,
        Err(stru_chat::Error::EmptyMessage | stru_chat::Error::Busy)
    );
    ui::finish_printer(printer, turn_started).await;

    result
}

async fn run_command(session: &mut ChatSession, command: &str) -> anyhow::Result<()> {
    let completion = run_turn(session, command).await?;
    if completion != Completion::Done {
        tracing::debug!(?completion, "answer did not complete");
    }
    Ok(())
}

async fn run_interactive(session: &mut ChatSession, identity: &IdentityClient) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        let context = session.context();
        eprintln!(
            "stru ({}) session: {}",
            context.user_id,
            &context.session_id.to_string()[..8]
        );
        if context.token.is_none() {
            eprintln!("Not logged in. Run `stru --login` to sign in.");
        }
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(input, session) {
            match result {
                commands::CommandResult::Clear => match session.clear() {
                    Ok(()) => println!("Cleared conversation."),
                    Err(e) => eprintln!("Error: {}", e),
                },
                commands::CommandResult::Exit => break,
                commands::CommandResult::Message(msg) => println!("{}", msg),
                commands::CommandResult::WhoAmI => {
                    if let Err(e) = show_whoami(identity, session.context()).await {
                        eprintln!("Error: {:#}", e);
                    }
                }
                commands::CommandResult::Haiku => {
                    if let Err(e) = show_haiku(identity, session.context()).await {
                        eprintln!("Error: {:#}", e);
                    }
                }
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            continue;
        }

        if let Err(e) = run_turn(session, input).await {
            eprintln!("Error: {}", e);
        }
    }

    Ok(())
}

async fn show_whoami(identity: &IdentityClient, context: &SessionContext) -> anyhow::Result<()> {
    match identity.user_info(context).await? {
        Some(info) => {
            println!("Hello, {}!", info.display_name());
            if let Some(email) = &info.email {
                println!("Email:   {}", email);
            }
            if let Some(picture) = &info.picture {
                println!("Picture: {}", picture);
            }
        }
        None => {
            println!("Not logged in.");
            println!("Login with: stru --login");
        }
    }
    Ok(())
}

async fn show_haiku(identity: &IdentityClient, context: &SessionContext) -> anyhow::Result<()> {
    match identity.generate_haiku(context).await {
        Ok(haiku) => println!("{}", haiku.trim_end()),
        Err(stru_api::Error::Unauthenticated) => {
            println!("Log in first: stru --login");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn handle_login(identity: &IdentityClient, token: Option<String>) -> anyhow::Result<()> {
    let result = match token {
        Some(token) => auth::verify_token(identity, &token).await,
        None => {
            println!("Logging in to stru...");
            println!();

            auth::login(
                identity,
                |url| {
                    println!("Opening browser to sign in...");
                    println!();
                    println!("If the browser doesn't open, visit this URL:");
                    println!("  {}", url);
                    println!();
                    auth::open_browser(&url);
                },
                || async {
                    println!("After signing in, paste your session token below:");
                    print!("> ");
                    io::stdout().flush().ok();

                    let mut input = String::new();
                    io::stdin().read_line(&mut input).ok();
                    input.trim().to_string()
                },
            )
            .await
        }
    };

    match result {
        Ok((credentials, info)) => {
            auth::save_credentials(&credentials).context("Failed to save credentials")?;
            println!();
            println!("Logged in as {}!", info.display_name());
            println!(
                "Credentials saved to {}",
                auth::credentials_file().display()
            );
        }
        Err(e) => {
            eprintln!();
            eprintln!("Login failed: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn handle_logout(identity: &IdentityClient) -> anyhow::Result<()> {
    let Some(credentials) = auth::load_credentials() else {
        println!("Not logged in.");
        return Ok(());
    };

    match auth::logout(identity, &credentials).await {
        Ok(()) => println!("Logged out."),
        Err(e) => {
            eprintln!("Logout failed: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
