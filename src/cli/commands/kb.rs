//! Knowledge base commands.

use super::check_ready;
use crate::cli::preflight::Operation;
use crate::cli::{KbAction, Output};
use crate::config::Settings;
use crate::knowledge::{load_articles, KnowledgeBase};
use anyhow::Result;

/// Run the kb command.
pub async fn run_kb(action: &KbAction, settings: Settings) -> Result<()> {
    match action {
        KbAction::Import { file } => {
            check_ready(Operation::Search)?;
            let kb = KnowledgeBase::from_settings(&settings)?;

            let articles = load_articles(file)?;
            if articles.is_empty() {
                Output::warning(&format!("No articles in {}", file.display()));
                return Ok(());
            }

            let spinner = Output::spinner(&format!("Embedding {} articles...", articles.len()));
            let result = kb.import(articles).await;
            spinner.finish_and_clear();

            let imported = result?;
            Output::success(&format!("Imported {} articles", imported));
            Output::kv("Index", &settings.knowledge_path().display().to_string());
            Output::kv("Total", &kb.index().count().await?.to_string());
        }

        KbAction::Search {
            query,
            limit,
            min_score,
        } => {
            check_ready(Operation::Search)?;
            let kb = KnowledgeBase::from_settings(&settings)?;

            let spinner = Output::spinner("Searching knowledge base...");
            let result = kb.search(query, *limit, *min_score).await;
            spinner.finish_and_clear();

            let hits = result?;
            if hits.is_empty() {
                Output::info("No matching articles.");
                return Ok(());
            }

            Output::header(&format!("{} result(s) for \"{}\"", hits.len(), query));
            for hit in &hits {
                Output::article_match(hit);
            }
        }

        KbAction::Count => {
            let kb = KnowledgeBase::from_settings(&settings)?;
            Output::kv("Articles", &kb.index().count().await?.to_string());
        }
    }

    Ok(())
}
