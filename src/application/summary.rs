//! Cached, single-flight summary of recent activity.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    application::{
        echoes::EchoStore,
        error::AppError,
        generator::{ChatMessage, GenerationError, GenerationOptions, TextGenerator},
        pagination::EchoQuery,
    },
    cache::RECENT_SUMMARY_KEY,
    domain::entities::EchoRecord,
    infra::error::InfraError,
    util::timezone::format_local_minute,
};

const METRIC_GENERATE_TOTAL: &str = "echoes_summary_generate_total";
const METRIC_GENERATE_MS: &str = "echoes_summary_generate_ms";
const RECENT_ECHO_COUNT: u32 = 10;

const SYSTEM_PROMPT: &str = "You summarise a person's recent posts. Answer in plain prose only: \
no markdown, no lists, no headings and no code formatting.";

const INSTRUCTION: &str = "Based on the posts above, summarise in a few friendly sentences \
what the author has been up to recently. If there are no posts, reply that the author has \
been rather mysterious lately.";

/// Cloneable so every waiter of one flight gets the same failure.
#[derive(Debug, Clone, Error)]
pub enum SummaryError {
    #[error("loading recent echoes failed: {0}")]
    Source(Arc<AppError>),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl From<SummaryError> for AppError {
    fn from(err: SummaryError) -> Self {
        match err {
            SummaryError::Source(source) => match Arc::try_unwrap(source) {
                Ok(inner) => inner,
                Err(shared) => AppError::unexpected(shared.to_string()),
            },
            SummaryError::Generation(err) => InfraError::generator(err.to_string()).into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummarySettings {
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

type SummaryFlight = Shared<BoxFuture<'static, Result<String, SummaryError>>>;

#[derive(Clone)]
pub struct SummaryCoalescer {
    store: EchoStore,
    generator: Arc<dyn TextGenerator>,
    settings: SummarySettings,
    flights: Arc<DashMap<&'static str, (u64, SummaryFlight)>>,
    next_flight: Arc<AtomicU64>,
}

impl SummaryCoalescer {
    pub fn new(store: EchoStore, generator: Arc<dyn TextGenerator>, settings: SummarySettings) -> Self {
        Self {
            store,
            generator,
            settings,
            flights: Arc::new(DashMap::new()),
            next_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Concurrent callers on a cold cache share one generation and all see
    /// its outcome. A failed flight is forgotten, so the next call retries.
    ///
    /// The flight runs on its own task: dropping every waiter does not stall
    /// it, and it unregisters itself when done.
    pub async fn recent_summary(&self) -> Result<String, SummaryError> {
        if let Some(summary) = self.store.cache().text(RECENT_SUMMARY_KEY) {
            return Ok(summary);
        }

        let (flight_id, flight) = self.join_or_start();
        let result = flight.await;
        forget_flight(&self.flights, flight_id);
        result
    }

    /// Flights currently registered. Zero once the last flight has finished.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    fn join_or_start(&self) -> (u64, SummaryFlight) {
        match self.flights.entry(RECENT_SUMMARY_KEY) {
            Entry::Occupied(entry) => {
                let (id, flight) = entry.get();
                debug!(flight = *id, "Joining in-flight summary");
                (*id, flight.clone())
            }
            Entry::Vacant(entry) => {
                let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let flights = self.flights.clone();
                let task = tokio::spawn(
                    compute(self.store.clone(), self.generator.clone(), self.settings)
                        .inspect(move |_| forget_flight(&flights, id)),
                );
                let flight = async move {
                    task.await.unwrap_or_else(|err| {
                        warn!(flight = id, error = %err, "Summary flight aborted");
                        Err(GenerationError::Cancelled.into())
                    })
                }
                .boxed()
                .shared();
                entry.insert((id, flight.clone()));
                (id, flight)
            }
        }
    }
}

/// Only drops the entry if it still belongs to `flight_id`.
fn forget_flight(flights: &DashMap<&'static str, (u64, SummaryFlight)>, flight_id: u64) {
    flights.remove_if(RECENT_SUMMARY_KEY, |_, (id, _)| *id == flight_id);
}

async fn compute(
    store: EchoStore,
    generator: Arc<dyn TextGenerator>,
    settings: SummarySettings,
) -> Result<String, SummaryError> {
    let cache = store.cache().clone();
    if let Some(summary) = cache.text(RECENT_SUMMARY_KEY) {
        return Ok(summary);
    }

    let ticket = cache.ticket();
    let recent = store
        .get_by_page(&EchoQuery::new(1, RECENT_ECHO_COUNT, None), false)
        .await
        .map_err(|err| SummaryError::Source(Arc::new(err)))?;
    let messages = summary_messages(&recent.items, store.timezone());

    let started = Instant::now();
    let outcome = tokio::time::timeout(
        settings.timeout,
        generator.generate(
            &messages,
            GenerationOptions {
                temperature: settings.temperature,
            },
        ),
    )
    .await
    .unwrap_or(Err(GenerationError::Timeout));
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let status = if outcome.is_ok() { "ok" } else { "error" };
    counter!(METRIC_GENERATE_TOTAL, "status" => status).increment(1);
    histogram!(METRIC_GENERATE_MS).record(elapsed_ms);

    let summary = outcome?.trim().to_string();
    if summary.is_empty() {
        return Err(GenerationError::EmptyResponse.into());
    }

    if cache.fill_text(ticket, RECENT_SUMMARY_KEY, summary.clone()) {
        info!(echoes = recent.items.len(), elapsed_ms, "Recent summary generated");
    } else {
        warn!(
            key = RECENT_SUMMARY_KEY,
            "Recent summary not cached; returning it uncached"
        );
    }
    Ok(summary)
}

fn summary_messages(echoes: &[EchoRecord], tz: chrono_tz::Tz) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(echoes.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(echoes.iter().enumerate().map(|(index, echo)| {
        let tags = echo
            .tags
            .iter()
            .map(|tag| tag.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        ChatMessage::user(format!(
            "User {} posted at {} item {}: {}. Tags: {}.",
            echo.username,
            format_local_minute(echo.created_at, tz),
            index + 1,
            echo.content,
            if tags.is_empty() { "none" } else { tags.as_str() },
        ))
    }));
    messages.push(ChatMessage::user(INSTRUCTION));
    messages
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::{
        application::generator::Role,
        domain::{entities::TagRecord, types::Layout},
    };

    fn echo(content: &str, tags: &[&str]) -> EchoRecord {
        EchoRecord {
            id: Uuid::new_v4(),
            content: content.to_string(),
            username: "mika".to_string(),
            user_id: Uuid::nil(),
            media: Vec::new(),
            tags: tags
                .iter()
                .map(|name| TagRecord {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    usage_count: 1,
                    created_at: datetime!(2024-05-01 00:00 UTC),
                })
                .collect(),
            private: false,
            layout: Layout::Waterfall,
            extension: None,
            fav_count: 0,
            created_at: datetime!(2024-05-01 12:30 UTC),
        }
    }

    #[test]
    fn one_message_per_echo_between_prompt_and_instruction() {
        let messages = summary_messages(
            &[echo("hiking", &["outdoors", "weekend"]), echo("coffee", &[])],
            chrono_tz::Asia::Shanghai,
        );

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(
            messages[1].content,
            "User mika posted at 2024-05-01 20:30 item 1: hiking. Tags: outdoors, weekend."
        );
        assert!(messages[2].content.ends_with("coffee. Tags: none."));
        assert_eq!(messages[3].content, INSTRUCTION);
    }

    #[test]
    fn shared_source_errors_degrade_to_unexpected() {
        let source = Arc::new(AppError::NotFound);
        let kept = source.clone();
        let err: AppError = SummaryError::Source(source).into();
        assert!(matches!(err, AppError::Unexpected(_)));
        drop(kept);

        let err: AppError = SummaryError::Source(Arc::new(AppError::NotFound)).into();
        assert!(err.is_not_found());
    }
}
