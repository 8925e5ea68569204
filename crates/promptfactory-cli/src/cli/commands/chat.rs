use super::{build_client, exit_codes, mutation_code, resolve_version, Session};
use crate::cli::args::{ChatArgs, ChatSub};
use promptfactory_core::config::FactoryConfig;
use promptfactory_core::engine::dispatch::{CancelToken, DispatchPolicy, DispatchStatus, Dispatcher};
use promptfactory_core::messages::BucketKey;
use promptfactory_core::model::Rating;
use promptfactory_core::report::console;
use promptfactory_core::Workspace;

fn bucket_label(ws: &Workspace, bucket: &BucketKey) -> String {
    match bucket.version_id() {
        Some(vid) => {
            let name = ws.versions().get(vid).map_or(vid, |v| v.name.as_str());
            format!("{} / {}", name, bucket.model_id())
        }
        None => bucket.model_id().to_string(),
    }
}

/// Buckets narrowed by the optional `--model` / `--version` filters.
fn filtered_buckets(
    ws: &Workspace,
    model: Option<&str>,
    version: Option<&str>,
) -> Option<Vec<BucketKey>> {
    let version_id = match version {
        Some(reference) => Some(resolve_version(ws, reference)?.id),
        None => None,
    };
    Some(
        ws.messages()
            .bucket_keys()
            .into_iter()
            .filter(|b| model.map_or(true, |m| b.model_id() == m))
            .filter(|b| match &version_id {
                Some(vid) => b.version_id() == Some(vid.as_str()),
                None => true,
            })
            .collect(),
    )
}

/// Finds a message by full id or unique id prefix.
fn find_message(ws: &Workspace, buckets: &[BucketKey], reference: &str) -> Option<(BucketKey, String)> {
    let mut hits = buckets.iter().flat_map(|b| {
        ws.messages()
            .get_messages(b)
            .into_iter()
            .filter(|m| m.id.starts_with(reference))
            .map(move |m| (b.clone(), m.id))
    });
    match (hits.next(), hits.next()) {
        (Some(hit), None) if !reference.is_empty() => Some(hit),
        (Some(_), Some(_)) => {
            eprintln!("ambiguous message id '{}' (narrow with --model or --version)", reference);
            None
        }
        _ => {
            eprintln!("message not found: {}", reference);
            None
        }
    }
}

pub async fn run(args: ChatArgs, cfg: &FactoryConfig) -> anyhow::Result<i32> {
    let mut session = Session::open(cfg)?;

    let code = match args.cmd {
        ChatSub::Send { text } => {
            if session.ws.active_buckets().is_empty() {
                eprintln!("no models selected (use `prompt set-models` or confirm a comparison)");
                return Ok(exit_codes::REFUSED);
            }
            let dispatcher = Dispatcher::new(build_client(cfg)?, DispatchPolicy::from(&cfg.dispatch));

            let cancel = CancelToken::new();
            let trigger = cancel.clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("cancelling outstanding requests");
                    trigger.cancel();
                }
            });

            let outcomes = session.ws.send_message(&dispatcher, &text, &cancel).await;
            interrupt.abort();

            let ws = &session.ws;
            for outcome in &outcomes {
                let reply = ws
                    .messages()
                    .message(&outcome.bucket, &outcome.message_id)
                    .and_then(|m| m.content.clone())
                    .unwrap_or_default();
                let timing = match outcome.status {
                    DispatchStatus::Completed => format!(" ({} ms)", outcome.latency_ms),
                    _ => String::new(),
                };
                println!("[{}]{} {}", bucket_label(ws, &outcome.bucket), timing, reply);
            }
            exit_codes::OK
        }
        ChatSub::Show { model, version } => {
            let ws = &session.ws;
            let Some(buckets) = filtered_buckets(ws, model.as_deref(), version.as_deref()) else {
                return Ok(exit_codes::REFUSED);
            };
            if buckets.is_empty() {
                println!("No messages.");
            }
            for bucket in buckets {
                println!("== {} ==", bucket_label(ws, &bucket));
                console::print_conversation(&ws.messages().get_messages(&bucket));
            }
            return Ok(exit_codes::OK);
        }
        ChatSub::Rate {
            message,
            rating,
            model,
            version,
        } => {
            let Some(rating) = Rating::parse(&rating) else {
                eprintln!("unknown rating '{}' (expected good|bad|none)", rating);
                return Ok(exit_codes::CONFIG_ERROR);
            };
            let ws = &mut session.ws;
            let Some(buckets) = filtered_buckets(ws, model.as_deref(), version.as_deref()) else {
                return Ok(exit_codes::REFUSED);
            };
            let Some((bucket, id)) = find_message(ws, &buckets, &message) else {
                return Ok(exit_codes::REFUSED);
            };
            mutation_code(ws.rate_message(&bucket, &id, rating), &message)
        }
        ChatSub::Clear => {
            session.ws.clear_conversation();
            exit_codes::OK
        }
    };

    session.save()?;
    Ok(code)
}
