//! CLI output formatting utilities.

use crate::chat::ToolObservation;
use crate::knowledge::ArticleMatch;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print one tool call made during a turn.
    pub fn tool_call(observation: &ToolObservation) {
        println!(
            "  {} {}",
            style(format!("[{}]", observation.tool_name)).dim(),
            style(content_preview(&observation.content, 120)).dim()
        );
    }

    /// Print a knowledge base hit.
    pub fn article_match(hit: &ArticleMatch) {
        println!(
            "\n{} {} (score: {:.2})",
            style(">>").green(),
            style(&hit.article.title).bold(),
            hit.score
        );
        println!("   {}", content_preview(&hit.article.content, 200));
        if let Some(url) = &hit.article.url {
            println!("   {}", style(url).dim());
        }
    }

    /// Print a line of dialogue.
    pub fn dialogue(speaker: &str, text: &str) {
        println!("{} {}", style(format!("{}:", speaker)).cyan().bold(), text);
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Truncate content with ellipsis, on a char boundary.
pub(crate) fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
