use std::{panic, thread};

use tracing::error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::CargoEnv;

/// drop these and buffered log lines and sentry events are lost
pub struct LoggerGuards {
    pub _tracing_guard: WorkerGuard,
    pub _sentry_guard: Option<sentry::ClientInitGuard>,
}

pub struct Logger {}

impl Logger {
    /// `RUST_LOG` wins when set. otherwise info in development and debug for our own crate in
    /// production, where the per-chapter fallback chatter ends up in the rolling file
    pub fn init(cargo_env: CargoEnv, sentry_dsn: Option<String>) -> LoggerGuards {
        let (writer, guard) = Self::writer(cargo_env);
        let sentry_guard = sentry_dsn.map(|dsn| Self::init_sentry(cargo_env, dsn));

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(Self::default_directives(cargo_env)));

        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(writer));

        if sentry_guard.is_some() {
            registry.with(sentry_tracing::layer()).init();
        } else {
            registry.init();
        }

        Self::install_panic_hook();

        LoggerGuards {
            _tracing_guard: guard,
            _sentry_guard: sentry_guard,
        }
    }

    fn default_directives(cargo_env: CargoEnv) -> &'static str {
        // hyper and reqwest are loud at debug and say nothing we need
        match cargo_env {
            CargoEnv::Development => "info,hyper=warn,reqwest=warn",
            CargoEnv::Production => "info,drama_edge=debug,hyper=warn,reqwest=warn",
        }
    }

    fn writer(cargo_env: CargoEnv) -> (NonBlocking, WorkerGuard) {
        match cargo_env {
            CargoEnv::Development => tracing_appender::non_blocking(std::io::stdout()),
            CargoEnv::Production => {
                tracing_appender::non_blocking(tracing_appender::rolling::daily("logs", "daily.log"))
            }
        }
    }

    fn init_sentry(cargo_env: CargoEnv, dsn: String) -> sentry::ClientInitGuard {
        let environment = match cargo_env {
            CargoEnv::Development => "development",
            CargoEnv::Production => "production",
        };

        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(environment.into()),
                attach_stacktrace: true,
                ..Default::default()
            },
        ))
    }

    /// panics go through tracing so they land in the same sink (and sentry) as everything else
    fn install_panic_hook() {
        panic::set_hook(Box::new(|info| {
            let current = thread::current();
            let name = current.name().unwrap_or("unknown");

            let msg = info
                .payload()
                .downcast_ref::<&'static str>()
                .copied()
                .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
                .unwrap_or("Box<Any>");

            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "unknown location".to_string());

            error!(
                target: "panic",
                "thread '{}' panicked at '{}': {}\n{:?}",
                name,
                msg,
                location,
                backtrace::Backtrace::new()
            );
        }));
    }
}
