use broker_api::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("unknown cluster backend '{0}' (expected \"kafka\" or \"memory\")")]
    UnknownBackend(String),

    #[error("{0}")]
    Gateway(#[from] GatewayError),

    #[error("api server: {0}")]
    Api(String),

    #[error("output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
