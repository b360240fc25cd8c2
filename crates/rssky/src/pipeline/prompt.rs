//! Prompt templates for the summary and digest requests.
//!
//! Templates use literal `{placeholder}` markers that are substituted with
//! plain string replacement, so JSON braces elsewhere in a template are
//! left alone.

/// Marker for the user's importance criteria (both templates).
pub const IMPORTANCE_CRITERIA: &str = "{importance_criteria}";

/// Marker for the item block in the summary template.
pub const ARTICLE_CONTENT: &str = "{article_content}";

/// Marker for the serialized batch in the digest template.
pub const SUMMARIES_JSON: &str = "{summaries_json}";

/// Character budget for the title/date/content block of a summary prompt.
pub const MAX_CONTENT_CHARS: usize = 20_000;

pub const TRUNCATION_MARKER: &str = "... [content truncated]";

/// Appended to every summary prompt.
pub const STRICT_JSON_INSTRUCTION: &str =
    "Respond ONLY with a valid JSON object, and do not include comments or explanations.";

/// Introduces the batch when the digest template has no [`SUMMARIES_JSON`].
pub const SUMMARIES_PREAMBLE: &str =
    "Here are the summaries (each is a direct JSON object from summary.json):";

pub const DEFAULT_IMPORTANCE_CRITERIA: &str = "Focus on technological breakthroughs, scientific discoveries, major political events, and significant market movements.";

pub const DEFAULT_SUMMARY_PROMPT: &str = "\
You are an expert news analyst. Analyze the following article and provide:
1. A 0-10 importance rating (where 10 is extremely important globally)
2. A max 2000-word summary with one paragraph for each of the news stories in this text
3. A brief assessment of potential impact
4. The date of the article
Base the importance rating on the following user-provided criteria:
{importance_criteria}

Article:
{article_content}
";

pub const DEFAULT_REPORT_PROMPT: &str = "\
You are an expert news analyst. Below you will find a JSON structure of news article summaries, with importance ratings. Many of these articles may actually be about the same story. Some articles contain multiple news stories.
Your job is to group news stories together (treating them as a single story with multiple sources). News stories with multiple sources should be seen as more important than those with a single source. Don't clump things together in broad subjects, such as AI, that's too broad. We're focussed on individual NEWS stories. For each news story, provide:

1. Your own concise title
2. The importance rating (derived from the source article importance ratings and your judgement on the overall importance criteria below)
3. A comprehensive summary (300-500 words)
4. Date (use the most recent date from sources)
5. A list of ALL multiple related news article sources from the input list (including name, title, and URL)

Use the following criteria to evaluate importance between:
{importance_criteria}
Sort all the final news stories by importance rating, highest first.
";

/// User-configurable prompt texts.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplates {
    pub importance_criteria: String,
    /// Per-item template.
    pub summary: String,
    /// Digest template.
    pub report: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            importance_criteria: DEFAULT_IMPORTANCE_CRITERIA.to_string(),
            summary: DEFAULT_SUMMARY_PROMPT.to_string(),
            report: DEFAULT_REPORT_PROMPT.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Render the per-item prompt.
    ///
    /// The item block is `Title: …\nDate: …\n\n<content>`, capped at
    /// [`MAX_CONTENT_CHARS`] characters.
    pub fn render_summary(&self, title: &str, date: &str, content: &str) -> String {
        let block = truncate_chars(
            &format!("Title: {title}\nDate: {date}\n\n{content}"),
            MAX_CONTENT_CHARS,
        );
        let template = format!(
            "{}\n\n{STRICT_JSON_INSTRUCTION}",
            self.summary
                .replace(IMPORTANCE_CRITERIA, &self.importance_criteria)
                .trim()
        );
        if template.contains(ARTICLE_CONTENT) {
            template.replace(ARTICLE_CONTENT, &block)
        } else {
            format!("{template}\n\n{block}")
        }
    }

    /// Render the digest prompt around an already-serialized batch.
    pub fn render_report(&self, summaries_json: &str) -> String {
        let template = self
            .report
            .replace(IMPORTANCE_CRITERIA, &self.importance_criteria);
        if template.contains(SUMMARIES_JSON) {
            template.replace(SUMMARIES_JSON, summaries_json)
        } else {
            format!("{template}\n\n{SUMMARIES_PREAMBLE}\n{summaries_json}")
        }
    }
}

/// Keep the first `max` characters, appending [`TRUNCATION_MARKER`] when
/// anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut out = text.get(..cut).unwrap_or(text).to_string();
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prompt_embeds_block_and_instruction() {
        let prompts = PromptTemplates::default();
        let prompt = prompts.render_summary("Rates Rise", "2023-01-01", "The bank raised rates.");

        assert!(prompt.contains(DEFAULT_IMPORTANCE_CRITERIA));
        assert!(prompt.contains("Title: Rates Rise\nDate: 2023-01-01\n\nThe bank raised rates."));
        assert!(prompt.ends_with(STRICT_JSON_INSTRUCTION));
        assert!(!prompt.contains(IMPORTANCE_CRITERIA));
        assert!(!prompt.contains(ARTICLE_CONTENT));
    }

    #[test]
    fn summary_prompt_without_placeholder_appends_block() {
        let prompts = PromptTemplates {
            summary: "Summarize as JSON {\"importance\": n}.".into(),
            ..Default::default()
        };
        let prompt = prompts.render_summary("T", "D", "C");
        assert!(prompt.starts_with("Summarize as JSON {\"importance\": n}."));
        assert!(prompt.ends_with("Title: T\nDate: D\n\nC"));
    }

    #[test]
    fn long_content_is_truncated() {
        let prompts = PromptTemplates::default();
        let content = "é".repeat(MAX_CONTENT_CHARS + 500);
        let prompt = prompts.render_summary("T", "D", &content);
        assert!(prompt.contains(TRUNCATION_MARKER));

        let block_start = prompt.find("Title: T").unwrap();
        let block_end = prompt.find(TRUNCATION_MARKER).unwrap();
        let block = prompt.get(block_start..block_end).unwrap();
        assert_eq!(block.chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn truncate_chars_boundaries() {
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("abcd", 3), format!("abc{TRUNCATION_MARKER}"));
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn report_prompt_placeholder_and_fallback() {
        let prompts = PromptTemplates {
            report: "Criteria: {importance_criteria}\nData: {summaries_json}".into(),
            importance_criteria: "AI only".into(),
            ..Default::default()
        };
        assert_eq!(prompts.render_report("[1]"), "Criteria: AI only\nData: [1]");

        let prompt = PromptTemplates::default().render_report("[]");
        assert!(prompt.ends_with(&format!("{SUMMARIES_PREAMBLE}\n[]")));
    }
}
