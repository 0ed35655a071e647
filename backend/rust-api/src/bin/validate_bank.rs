use anyhow::Context;
use tracing_subscriber::fmt::init;

use adaptive_math_api::{
    config::Config,
    models::Difficulty,
    services::question_bank_service::{load_question_bank, load_support_catalog},
};

/// Loads the configured question bank and support content the way the server
/// does and reports what a learner would actually be served.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();

    let config = Config::load().context("Failed to load configuration")?;

    let mongo = match &config.mongo_uri {
        Some(uri) if config.questions_collection.is_some() => {
            let client = mongodb::Client::with_uri_str(uri)
                .await
                .context("Failed to connect to MongoDB")?;
            Some(client.database(&config.mongo_database))
        }
        _ => None,
    };

    let bank = load_question_bank(&config, mongo.as_ref()).await?;
    let catalog = load_support_catalog(&config)?;

    println!("Question bank");
    for tier in Difficulty::all() {
        let count = bank.count_for(tier);
        let warn = if count < config.adaptive.batch_size {
            "  (shorter than one batch)"
        } else {
            ""
        };
        println!("  {:<14} {:>4}{}", tier.as_str(), count, warn);
    }
    println!(
        "  supplementary  {:>4}{}",
        bank.supplementary_pool().len(),
        if bank.has_supplementary_section() {
            ""
        } else {
            "  (falls back to primary)"
        }
    );
    println!("Support topics   {:>4}", catalog.len());

    if !bank.rejected().is_empty() {
        println!("Rejected entries {:>4}", bank.rejected().len());
        for err in bank.rejected() {
            println!("  - {}", err);
        }
        anyhow::bail!("{} malformed bank entries", bank.rejected().len());
    }

    Ok(())
}
