use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wander_ai::tts::speaker::{SpeakerState, SpeechOutcome};
use wander_ai::{ChatMessage, MessageRole, RouteOutcome, RoutedResponse, WanderService};
use wander_core::config::{ConfigManager, WanderConfig};
use wander_core::logging;
use wander_core::{MemorySessionStore, NotificationStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prior turns kept as conversational context.
const MAX_HISTORY: usize = 20;

const HELP: &str = "\
Ask anything, e.g. \"things to do in Austin tonight\".
  :providers            show provider availability
  :enable <id>          turn a provider on
  :disable <id>         turn a provider off
  :stop                 stop speaking
  :quit                 exit";

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

fn init_services() -> Result<(ConfigManager, Arc<WanderService>)> {
    WanderConfig::ensure_dirs().context("Failed to create config directories")?;
    let config = ConfigManager::new().context("Failed to load config")?;

    let service = Arc::new(WanderService::new(
        &config.get(),
        Arc::new(MemorySessionStore::new()),
        Arc::new(NotificationStore::new()),
    ));
    service.follow_config(&config);

    Ok((config, service))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init_logging()?;
    info!("Starting Wander v{VERSION}");

    let (config, service) = init_services().inspect_err(|e| {
        error!("Service initialization failed: {e:#}");
    })?;
    let interrupts = Interrupts::install();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        let query = args.join(" ");
        if let Some(response) = answer(&service, &interrupts, &query, &[]).await {
            report_speech(&service, service.speak_response(&response).await);
            wait_for_speech(&service, &interrupts).await;
        }
        return Ok(());
    }

    repl(&config, &service, &interrupts).await
}

// ---------------------------------------------------------------------------
// Ctrl-C
// ---------------------------------------------------------------------------

/// One Ctrl-C listener for the whole session. An interrupt cancels the
/// request in flight if there is one, otherwise it ends the session.
struct Interrupts {
    in_flight: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
}

impl Interrupts {
    fn install() -> Self {
        let in_flight: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));
        let shutdown = CancellationToken::new();

        let (slot, session) = (Arc::clone(&in_flight), shutdown.clone());
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match slot.lock().take() {
                    Some(request) => request.cancel(),
                    None => {
                        session.cancel();
                        break;
                    }
                }
            }
        });

        Self {
            in_flight,
            shutdown,
        }
    }

    fn begin_request(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.in_flight.lock() = Some(token.clone());
        token
    }

    fn end_request(&self) {
        self.in_flight.lock().take();
    }
}

// ---------------------------------------------------------------------------
// Interactive loop
// ---------------------------------------------------------------------------

async fn repl(
    config: &ConfigManager,
    service: &Arc<WanderService>,
    interrupts: &Interrupts,
) -> Result<()> {
    println!("Wander v{VERSION}. Type :help for commands.");

    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let next = tokio::select! {
            _ = interrupts.shutdown.cancelled() => break,
            next = lines.next_line() => next.context("Failed to read stdin")?,
        };
        let Some(line) = next else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            (":quit" | ":q", _) => break,
            (":help", _) => println!("{HELP}"),
            (":stop", _) => service.stop_speaking(),
            (":providers", _) => print_providers(service),
            (":enable", id) => toggle(config, service, id.trim(), true),
            (":disable", id) => toggle(config, service, id.trim(), false),
            _ => {
                let Some(response) = answer(service, interrupts, line, &history).await else {
                    continue;
                };

                let speaker = Arc::clone(service);
                let spoken = response.clone();
                tokio::spawn(async move {
                    let outcome = speaker.speak_response(&spoken).await;
                    report_speech(&speaker, outcome);
                });

                history.push(ChatMessage::text(MessageRole::User, line));
                history.push(ChatMessage::text(MessageRole::Assistant, response.text));
                if history.len() > MAX_HISTORY {
                    history.drain(..history.len() - MAX_HISTORY);
                }
            }
        }
    }

    service.stop_speaking();
    info!("Wander shutting down");
    Ok(())
}

/// Route one query and print the result. Returns the response when there
/// was an answer to read aloud.
async fn answer(
    service: &WanderService,
    interrupts: &Interrupts,
    query: &str,
    history: &[ChatMessage],
) -> Option<RoutedResponse> {
    let cancel = interrupts.begin_request();
    let response = service.respond(query, history, &cancel).await;
    interrupts.end_request();

    match response.outcome {
        RouteOutcome::Answered => {
            println!("\n{}\n", response.text);
            if !response.categories.is_empty() {
                let tags: Vec<&str> = response.categories.iter().map(String::as_str).collect();
                println!("[{}]", tags.join(", "));
            }
            Some(response)
        }
        RouteOutcome::Cancelled => {
            println!("(cancelled)");
            None
        }
        RouteOutcome::EmptyQuery => None,
        _ => {
            if let Some(notice) = response.user_notice() {
                println!("{notice}");
            }
            None
        }
    }
}

fn report_speech(service: &WanderService, outcome: SpeechOutcome) {
    if outcome == SpeechOutcome::Failed
        && let Some(n) = service.notifications().latest()
    {
        eprintln!("{}", n.message);
    }
}

/// Block until the current utterance finishes or the session is interrupted.
async fn wait_for_speech(service: &WanderService, interrupts: &Interrupts) {
    while service.speaker().state() != SpeakerState::Idle {
        tokio::select! {
            _ = interrupts.shutdown.cancelled() => {
                service.stop_speaking();
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }
}

fn print_providers(service: &WanderService) {
    let registry = service.router().registry();
    for p in registry.all() {
        let mark = if p.is_available { "on " } else { "off" };
        println!("  [{mark}] {:<12} {:<6} priority {}", p.id, p.capability.as_str(), p.priority);
    }
}

fn toggle(config: &ConfigManager, service: &WanderService, id: &str, enabled: bool) {
    if id.is_empty() {
        println!("usage: :{} <provider id>", if enabled { "enable" } else { "disable" });
        return;
    }
    if service.router().registry().get(id).is_none() {
        println!("Unknown provider: {id}");
        return;
    }
    match service.set_provider_enabled(config, id, enabled) {
        Ok(()) => print_providers(service),
        Err(e) => {
            warn!(provider = id, "Toggle failed: {e}");
            println!("{}", e.user_message());
        }
    }
}
