use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Collection, Database};

use crate::adaptive::{QuestionBank, SupportCatalog};
use crate::config::Config;

/// Loads the question bank from MongoDB when a collection is configured,
/// otherwise from the JSON file at `question_bank_path`.
pub async fn load_question_bank(config: &Config, mongo: Option<&Database>) -> Result<QuestionBank> {
    let bank = match (config.questions_collection.as_deref(), mongo) {
        (Some(collection), Some(db)) => load_from_mongo(db, collection).await?,
        (Some(collection), None) => {
            tracing::warn!(
                "questions.collection={} is set but MongoDB is not configured, using {}",
                collection,
                config.question_bank_path
            );
            load_from_file(&config.question_bank_path)?
        }
        (None, _) => load_from_file(&config.question_bank_path)?,
    };

    tracing::info!(
        "Question bank loaded: primary={}, supplementary={}, rejected={}",
        bank.primary().len(),
        bank.supplementary_pool().len(),
        bank.rejected().len()
    );
    Ok(bank)
}

fn load_from_file(path: &str) -> Result<QuestionBank> {
    QuestionBank::load_from_path(path)
        .with_context(|| format!("Failed to load question bank from {}", path))
}

async fn load_from_mongo(db: &Database, collection: &str) -> Result<QuestionBank> {
    let questions: Collection<Document> = db.collection(collection);
    let documents: Vec<Document> = questions
        .find(doc! {})
        .await
        .with_context(|| format!("Failed to query collection {}", collection))?
        .try_collect()
        .await
        .with_context(|| format!("Failed to read questions from {}", collection))?;

    // Decoded one by one in the bank so a bad document is skipped, not fatal.
    let entries = documents.into_iter().map(document_to_json).collect();
    let bank = QuestionBank::from_values(entries);
    if bank.primary().is_empty() {
        anyhow::bail!("Collection {} holds no usable questions", collection);
    }
    Ok(bank)
}

fn document_to_json(document: Document) -> serde_json::Value {
    Bson::Document(document).into_relaxed_extjson()
}

pub fn load_support_catalog(config: &Config) -> Result<SupportCatalog> {
    SupportCatalog::load_from_path(&config.support_content_path).with_context(|| {
        format!(
            "Failed to load support content from {}",
            config.support_content_path
        )
    })
}
