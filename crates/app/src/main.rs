//! NeyroPlan console front-end.
//!
//! A deliberately thin driver around the core: it reads commands, forwards
//! them to the orchestrator or the session store, and prints read-only
//! snapshots. No chat or state-machine logic lives here.

use anyhow::Result;
use orchestrator::{GenerateOutcome, Orchestrator};
use providers::GeminiClient;
use shared::chat::MessageKind;
use shared::settings::GenerationSettings;
use std::sync::Arc;
use std::time::Duration;
use store::{FileStorage, SessionStore};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = GenerationSettings::default();
    let backend = Arc::new(GeminiClient::new(settings)?);
    let mut store = SessionStore::new(Box::new(FileStorage::new()));
    store.hydrate();
    let engine = Arc::new(Orchestrator::new(store, backend));

    let mut shadow_mode = false;

    println!("NeyroPlan. Yordam uchun /help yozing.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line.as_str(), "")) {
            ("/help", _) => print_help(),
            ("/quit", _) => break,
            ("/new", _) => {
                engine.store().lock().create_session(shadow_mode);
                println!("yangi suhbat ochildi");
            }
            ("/list", _) => print_sessions(&engine),
            ("/open", arg) => match session_id_at(&engine, arg) {
                Some(id) => engine.store().lock().select_session(&id),
                None => println!("bunday suhbat yo'q"),
            },
            ("/delete", arg) => match session_id_at(&engine, arg) {
                Some(id) => engine.store().lock().delete_session(&id),
                None => println!("bunday suhbat yo'q"),
            },
            ("/shadow", _) => {
                shadow_mode = !shadow_mode;
                if shadow_mode {
                    // Entering the alternate mode drops stale restricted
                    // threads and opens a fresh one, like the original
                    // unlock handler.
                    let store = engine.store();
                    let mut store = store.lock();
                    store.remove_restricted();
                    store.create_session(true);
                    println!("SHADOW TERMINAL ACTIVATED");
                } else {
                    println!("oddiy rejimga qaytildi");
                }
            }
            ("/purge", _) => {
                engine.store().lock().purge();
                println!("HISTORY_PURGED_SUCCESSFULLY");
            }
            ("/image", prompt) => run_generation(&engine, prompt, MessageKind::Image, shadow_mode).await,
            ("/video", prompt) => run_generation(&engine, prompt, MessageKind::Video, shadow_mode).await,
            _ => run_generation(&engine, &line, MessageKind::Text, shadow_mode).await,
        }
    }

    Ok(())
}

fn print_help() {
    println!("  /new           yangi suhbat");
    println!("  /list          suhbatlar ro'yxati");
    println!("  /open <n>      suhbatni tanlash");
    println!("  /delete <n>    suhbatni o'chirish");
    println!("  /image <matn>  rasm yaratish");
    println!("  /video <matn>  video yaratish");
    println!("  /shadow        maxfiy rejimni almashtirish");
    println!("  /purge         hammasini o'chirish");
    println!("  /quit          chiqish");
    println!("  boshqa matn    oddiy savol");
}

fn print_sessions(engine: &Arc<Orchestrator>) {
    let current = engine.current_session_id();
    for (i, session) in engine.sessions_snapshot().iter().enumerate() {
        let marker = if Some(&session.id) == current.as_ref() {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:>2}. {} ({} xabar)",
            marker,
            i + 1,
            session.title,
            session.messages.len()
        );
    }
}

fn session_id_at(engine: &Arc<Orchestrator>, arg: &str) -> Option<String> {
    let index: usize = arg.trim().parse().ok()?;
    engine
        .sessions_snapshot()
        .get(index.checked_sub(1)?)
        .map(|s| s.id.clone())
}

/// Drive one generation request, echoing transient status changes while it
/// runs and the final placeholder content when it settles.
async fn run_generation(
    engine: &Arc<Orchestrator>,
    prompt: &str,
    kind: MessageKind,
    shadow_mode: bool,
) {
    let task = {
        let engine = engine.clone();
        let prompt = prompt.to_string();
        tokio::spawn(async move { engine.generate(&prompt, kind, shadow_mode).await })
    };

    let mut last_status: Option<String> = None;
    while !task.is_finished() {
        let status = engine.status_message();
        if status != last_status {
            if let Some(text) = &status {
                println!("[{text}]");
            }
            last_status = status;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    match task.await {
        Ok(GenerateOutcome::Ignored) => println!("(so'rov e'tiborga olinmadi)"),
        Ok(_) => {
            let current = engine.current_session_id();
            let sessions = engine.sessions_snapshot();
            let last = current
                .and_then(|id| sessions.into_iter().find(|s| s.id == id))
                .and_then(|s| s.messages.last().cloned());
            if let Some(message) = last {
                println!("{}", message.content);
                if let Some(url) = &message.media_url {
                    println!("media: {url}");
                }
            }
        }
        Err(e) => tracing::error!("generation task failed: {e}"),
    }
}
