//! Tracing subscriber and metric descriptions.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use std::{io, sync::Once};

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::{Dispatch, Level, Subscriber, dispatcher, error};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::{
    application::error::{AppError, ErrorReport},
    config::{LogFormat, LoggingSettings},
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Installs the global subscriber. Fails when one is already installed.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(output_layer(logging.format))
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
    }
}

/// Logs a fatal error with its source chain. Falls back to a temporary
/// ERROR-level subscriber when telemetry was never installed.
pub fn report_error(source: &'static str, err: &AppError) {
    let report = ErrorReport::from_error(source, err);
    let emit = || {
        error!(
            source = report.source,
            kind = err.kind(),
            chain = %report.chain(),
            "Command failed"
        );
    };

    if dispatcher::has_been_set() {
        emit();
        return;
    }

    let subscriber = fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    dispatcher::with_default(&Dispatch::new(subscriber), emit);
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "echoes_cache_hit_total",
            Unit::Count,
            "Cache hits, labelled by namespace."
        );
        describe_counter!(
            "echoes_cache_miss_total",
            Unit::Count,
            "Cache misses, labelled by namespace."
        );
        describe_counter!(
            "echoes_cache_evict_total",
            Unit::Count,
            "Cache evictions due to capacity, labelled by namespace."
        );
        describe_counter!(
            "echoes_cache_invalidate_total",
            Unit::Count,
            "Cache invalidations, labelled by target."
        );
        describe_counter!(
            "echoes_cache_fill_skipped_total",
            Unit::Count,
            "Cache fills rejected because an invalidation happened during the read."
        );
        describe_counter!(
            "echoes_post_commit_failure_total",
            Unit::Count,
            "Post-commit hook failures, labelled by hook."
        );
        describe_counter!(
            "echoes_recommend_total",
            Unit::Count,
            "Layout recommendations, labelled by source."
        );
        describe_counter!(
            "echoes_summary_generate_total",
            Unit::Count,
            "Recent summary generations, labelled by status."
        );
        describe_histogram!(
            "echoes_summary_generate_ms",
            Unit::Milliseconds,
            "Recent summary generation latency in milliseconds."
        );
    });
}
