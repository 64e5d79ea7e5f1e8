use crate::schema::NO_RESULTS_FOUND;

/// Token in a user template that is replaced by the row's entity value.
pub const PLACEHOLDER: &str = "{company}";

/// Substitute `value` for every occurrence of [`PLACEHOLDER`].
///
/// Plain substring replacement. A template without the placeholder comes
/// back unchanged and the value is simply not used.
pub fn resolve_template(template: &str, value: &str) -> String {
    template.replace(PLACEHOLDER, value)
}

/// One `Results: ...` line per snippet, or the no-results marker when there
/// is nothing to show the model.
pub fn build_context(snippets: &[String]) -> String {
    let context = snippets
        .iter()
        .map(|s| format!("Results: {}", s))
        .collect::<Vec<_>>()
        .join("\n");

    if context.trim().is_empty() {
        NO_RESULTS_FOUND.to_string()
    } else {
        context
    }
}

pub fn build_extraction_prompt(query: &str, context: &str) -> String {
    format!(
        r#"You will be given a prompt and a dataset of search results.
If the information the prompt asks for is present in the dataset, extract it and reply with that data only, with no extra information.
If there are multiple answers, separate them with commas.
If no data is available, reply with "No data available" only.

PROMPT:
{} from the following search results:

SEARCH RESULTS:
{}

Do not repeat the prompt. Give the answer."#,
        query, context
    )
}
