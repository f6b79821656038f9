use std::collections::HashMap;

use serde::Serialize;

use crate::cmd::build_service;
use crate::config::{ServerConfig, TopicsAction, TopicsArgs};
use crate::error::ServerError;

pub async fn run(args: TopicsArgs) -> Result<(), ServerError> {
    let config = ServerConfig::load(&args.config)?;
    let service = build_service(&config)?;

    match args.action {
        TopicsAction::List => print_json(&service.get_topics().await?),
        TopicsAction::Create { name, partitions, replication, entries } => {
            let config: HashMap<String, String> = entries.into_iter().collect();
            print_json(&service.create_topic(&name, partitions, replication, config).await?)
        }
        TopicsAction::Delete { name } => print_json(&service.delete_topic(&name).await?),
        TopicsAction::Messages { name, order, page_size } => {
            let page_size = page_size.unwrap_or(service.settings().page_size);
            print_json(&service.get_messages(&name, order, page_size, None).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ServerError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
