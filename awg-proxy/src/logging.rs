//! Wires up stderr logging with an exact `INFO: `/`ERROR: `/`DEBUG: ` prefix
//! and nothing else (no timestamp, no target, no ANSI). `LogLevel::None`
//! installs no subscriber at all, so every `tracing` macro call becomes a
//! no-op rather than being filtered at the lowest level.

use std::fmt;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use awg_core::LogLevel;

struct PrefixFormat;

impl<S, N> FormatEvent<S, N> for PrefixFormat
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
        let prefix = match *event.metadata().level() {
            Level::ERROR | Level::WARN => "ERROR: ",
            Level::INFO => "INFO: ",
            Level::DEBUG | Level::TRACE => "DEBUG: ",
        };
        writer.write_str(prefix)?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

pub fn init(level: LogLevel) {
    if level == LogLevel::None {
        return;
    }

    let filter = match level {
        LogLevel::None => unreachable!(),
        LogLevel::Error => "error",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .event_format(PrefixFormat)
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("logging subscriber installed twice");
}
