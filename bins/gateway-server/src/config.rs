use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use broker_api::OrderingPolicy;
use browse_engine::BrowseSettings;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "gateway-server", about = "Broker admin and browsing gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway until Ctrl+C
    Serve(ServeArgs),
    /// One-shot topic administration, printing JSON
    Topics(TopicsArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "gateway.toml", env = "GATEWAY_CONFIG")]
    pub config: String,
    /// Overrides `api_port` from the config
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Args, Clone, Debug)]
pub struct TopicsArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "gateway.toml", env = "GATEWAY_CONFIG")]
    pub config: String,
    #[command(subcommand)]
    pub action: TopicsAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum TopicsAction {
    /// List topics
    List,
    /// Create a topic
    Create {
        name: String,
        #[arg(long, default_value_t = 1)]
        partitions: i32,
        #[arg(long, default_value_t = 1)]
        replication: i16,
        /// Topic config entry, repeatable: `--set retention.ms=60000`
        #[arg(long = "set", value_parser = parse_key_val)]
        entries: Vec<(String, String)>,
    },
    /// Delete a topic
    Delete { name: String },
    /// Print one page of messages
    Messages {
        name: String,
        #[arg(long, default_value = "NEWEST_FIRST", value_parser = parse_order)]
        order: OrderingPolicy,
        #[arg(long)]
        page_size: Option<usize>,
    },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_order(raw: &str) -> Result<OrderingPolicy, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_uppercase()))
        .map_err(|_| format!("unknown order '{raw}', expected OLDEST_FIRST or NEWEST_FIRST"))
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub browse: BrowseSettings,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

#[derive(Debug, Deserialize)]
pub struct ClusterConfig {
    /// `kafka` or `memory`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Backend-specific table, handed over as JSON.
    #[serde(default)]
    pub config: Option<toml::Value>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            config: None,
        }
    }
}

fn default_api_port() -> u16 {
    9300
}
fn default_backend() -> String {
    "kafka".to_string()
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

impl ClusterConfig {
    /// The backend table as JSON; `"{}"` when absent.
    pub fn config_json(&self) -> Result<String, ServerError> {
        match &self.config {
            Some(value) => serde_json::to_string(value)
                .map_err(|e| ServerError::Config { context: "cluster.config", detail: e.to_string() }),
            None => Ok("{}".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.api_port, 9300);
        assert_eq!(config.browse, BrowseSettings::default());
        assert_eq!(config.cluster.backend, "kafka");
        assert_eq!(config.cluster.config_json().unwrap(), "{}");
    }

    #[test]
    fn full_config() {
        let config = ServerConfig::parse(
            r#"
api_port = 8088

[browse]
page_size = 50
read_timeout_ms = 1500

[cluster]
backend = "memory"

[cluster.config]
brokers = 3

[[cluster.config.topics]]
name = "orders"
partitions = 2
replication_factor = 1
"#,
        )
        .unwrap();
        assert_eq!(config.api_port, 8088);
        assert_eq!(config.browse.page_size, 50);
        assert_eq!(config.browse.read_timeout_ms, 1500);
        assert_eq!(config.browse.admin_timeout_ms, 10_000);
        assert_eq!(config.cluster.backend, "memory");

        let json: serde_json::Value = serde_json::from_str(&config.cluster.config_json().unwrap()).unwrap();
        assert_eq!(json["brokers"], 3);
        assert_eq!(json["topics"][0]["name"], "orders");
    }

    #[test]
    fn malformed_config_is_rejected() {
        assert!(ServerConfig::parse("api_port = \"high\"").is_err());
        assert!(matches!(
            ServerConfig::load("/nonexistent/gateway.toml"),
            Err(ServerError::Config { context: "read", .. })
        ));
    }

    #[test]
    fn topics_create_arguments() {
        let cli = Cli::try_parse_from([
            "gateway-server",
            "topics",
            "--config",
            "dev.toml",
            "create",
            "orders",
            "--partitions",
            "3",
            "--set",
            "retention.ms=60000",
        ])
        .unwrap();
        let Commands::Topics(args) = cli.command else {
            panic!("expected topics command");
        };
        assert_eq!(args.config, "dev.toml");
        match args.action {
            TopicsAction::Create { name, partitions, replication, entries } => {
                assert_eq!(name, "orders");
                assert_eq!(partitions, 3);
                assert_eq!(replication, 1);
                assert_eq!(entries, vec![("retention.ms".to_string(), "60000".to_string())]);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn order_accepts_legacy_spelling() {
        assert_eq!(parse_order("old_first"), Ok(OrderingPolicy::OldestFirst));
        assert_eq!(parse_order("NEWEST_FIRST"), Ok(OrderingPolicy::NewestFirst));
        assert!(parse_order("sideways").is_err());
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }
}
