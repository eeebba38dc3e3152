use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use ripple_codec::NOISE_DATA_TAG;
use ripple_engine::{PipelineConfig, RetryPolicy, RetrySettings, WindowConfig, WindowSettings};
use ripple_storage_memory::MemorySinkConfig;
use ripple_storage_postgres::PostgresSinkConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "ripple-server", about = "Оконная буферизация показаний с записью в SQL")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить сервер
    Serve(ServeArgs),
    /// Отправить тестовые показания на сервер и напечатать статусы
    Emit(EmitArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "RIPPLE_CONFIG")]
    pub config: String,
}

#[derive(Args, Clone, Debug)]
pub struct EmitArgs {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:9000", env = "RIPPLE_ADDR")]
    pub addr: String,
    /// Number of readings to send
    #[arg(long, default_value_t = 100)]
    pub count: u64,
    /// Pause between readings, ms
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,
    /// `source` field of every reading
    #[arg(long, default_value = "emitter")]
    pub source: String,
    /// Outer record tag
    #[arg(long, default_value_t = NOISE_DATA_TAG)]
    pub tag: u8,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Тег входящих записей и исходящих статусов.
    #[serde(default = "default_tag")]
    pub tag: u8,
    /// Максимальный размер payload одного фрейма (0 = без ограничения).
    #[serde(default = "default_max_frame")]
    pub max_frame: usize,
    /// Ёмкость inbound/outbound каналов одного соединения.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[storage]` section, selected by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Postgres(PostgresSinkConfig),
    Memory(MemorySinkConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemorySinkConfig::default())
    }
}

fn default_listen() -> String {
    "0.0.0.0:9000".into()
}
fn default_tag() -> u8 {
    NOISE_DATA_TAG
}
fn default_max_frame() -> usize {
    65_536
}
fn default_channel_buffer() -> usize {
    1024
}
fn default_shutdown_grace_ms() -> u64 {
    5_000
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Validated pipeline settings shared by all connections. `name` is
    /// filled in per connection.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ServerError> {
        if self.channel_buffer == 0 {
            return Err(ServerError::Config {
                context: "validate",
                detail: "channel_buffer must be greater than 0".into(),
            });
        }
        let window = WindowConfig::try_from(&self.window).map_err(|e| e.with_context("[window]"))?;
        let retry = RetryPolicy::try_from(&self.retry).map_err(|e| e.with_context("[retry]"))?;
        Ok(PipelineConfig {
            name: String::new(),
            tag: self.tag,
            window,
            retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.tag, 0x10);
        assert!(matches!(config.storage, StorageConfig::Memory(ref m) if m.max_records == 100_000));

        let pipeline = config.pipeline_config().unwrap();
        assert_eq!(pipeline.window.max_count(), 30);
        assert_eq!(pipeline.window.max_duration(), Duration::from_secs(5));
        assert_eq!(pipeline.retry.max_attempts(), 1);
    }

    #[test]
    fn full_file_is_parsed() {
        let config = ServerConfig::parse(
            r#"
listen = "127.0.0.1:7000"
tag = 0x20
max_frame = 1024
channel_buffer = 8
shutdown_grace_ms = 100

[window]
max_count = 3
max_duration_ms = 250

[retry]
max_attempts = 4
backoff_ms = 10
max_backoff_ms = 40

[storage]
kind = "postgres"
dsn = "host=db user=ripple dbname=demo"
create_table = true
"#,
        )
        .unwrap();

        assert_eq!(config.tag, 0x20);
        assert_eq!(config.max_frame, 1024);
        match &config.storage {
            StorageConfig::Postgres(pg) => {
                assert_eq!(pg.dsn, "host=db user=ripple dbname=demo");
                assert_eq!(pg.table, "noises");
                assert!(pg.create_table);
            }
            other => panic!("unexpected storage: {other:?}"),
        }

        let pipeline = config.pipeline_config().unwrap();
        assert_eq!(pipeline.tag, 0x20);
        assert_eq!(pipeline.window.max_count(), 3);
        assert_eq!(pipeline.retry.delay_before(4), Duration::from_millis(40));
    }

    #[test]
    fn invalid_window_is_reported_with_section() {
        let config = ServerConfig::parse("[window]\nmax_count = 0\n").unwrap();
        let err = config.pipeline_config().unwrap_err();
        assert!(err.to_string().contains("[window]"), "{err}");
    }

    #[test]
    fn zero_channel_buffer_is_rejected() {
        let config = ServerConfig::parse("channel_buffer = 0\n").unwrap();
        assert!(config.pipeline_config().is_err());
    }

    #[test]
    fn unknown_storage_kind_fails_to_parse() {
        assert!(ServerConfig::parse("[storage]\nkind = \"redis\"\n").is_err());
    }
}
