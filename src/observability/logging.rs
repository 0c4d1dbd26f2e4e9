//! Text line format shared by the console and file sinks.
//!
//! ```text
//! 2024-05-01 09:14:03.512 +02:00 [INF] WS-042 jdoe Excel.AddIn 4711 my_app::pricing request: Price loaded id=7
//! ```
//! The four enrichment fields always follow the level, so every line carries
//! them regardless of what the call site recorded.

use std::fmt;
use std::sync::Arc;

use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::observability::enrichment::EnrichmentFields;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

/// Event formatter that stamps enrichment fields on each line.
#[derive(Debug, Clone)]
pub struct EnrichedFormat {
    fields: Arc<EnrichmentFields>,
}

impl EnrichedFormat {
    pub fn new(fields: Arc<EnrichmentFields>) -> Self {
        Self { fields }
    }
}

/// Three-letter level tag.
pub fn level_tag(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRC",
        Level::DEBUG => "DBG",
        Level::INFO => "INF",
        Level::WARN => "WRN",
        Level::ERROR => "ERR",
    }
}

impl<S, N> FormatEvent<S, N> for EnrichedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let f = &self.fields;

        write!(
            writer,
            "{} [{}] {} {} {} {} {} ",
            Local::now().format(TIMESTAMP_FORMAT),
            level_tag(meta.level()),
            f.machine_name,
            f.user_name,
            f.application_name,
            f.process_id,
            meta.target(),
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}: ", span.name())?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
