//! Intent-specific prompt rendering.
use docqa_core::types::{ChunkOrigin, QueryIntent, RetrievedChunk};

use crate::intent::classify;

const TABLE_INSTRUCTIONS: &str = "\
You are an assistant answering questions about a PDF document that contains tables and structured data.
Answer with the following in mind:

1. Table formatting
   - Present tabular answers as a markdown table with a header row.
   - Keep the document's column names and units.
   - Align numbers consistently and keep their original precision.

2. Organizing the data
   - Group related rows together and keep the document's ordering.
   - Say explicitly when a value is missing or unclear.

3. Context
   - Add a short explanation of what the table shows.
   - Point out notable patterns or outliers.";

const TABLE_CLOSING: &str = "Answer with a clearly formatted table and the context needed to read it.";

const CHART_INSTRUCTIONS: &str = "\
You are an assistant answering questions about charts and figures in a PDF document.
Answer with the following in mind:

1. Describing the chart
   - Name the chart type (bar, line, pie, scatter, ...).
   - Name the axes, their units and the legend entries.

2. Interpreting the data
   - Describe the main trends, peaks and dips.
   - Compare the series or categories shown.

3. Numbers
   - Quote the concrete values the chart shows, with units.
   - Say when a value is read off the chart and therefore approximate.";

const CHART_CLOSING: &str = "Describe the visual elements clearly and explain what they show.";

const NUMERICAL_INSTRUCTIONS: &str = "\
You are an assistant answering numerical questions about a PDF document.
Answer with the following in mind:

1. Calculations
   - Work through the calculation step by step.
   - State every input value and where in the context it comes from.

2. Presenting results
   - Give the final figure with its units and a sensible precision.
   - Use a small table when several values are compared.

3. Context
   - Explain what the result means for the question asked.
   - Mention any assumptions or gaps in the data.";

const NUMERICAL_CLOSING: &str = "Show the working and explain the result.";

const GENERAL_INSTRUCTIONS: &str = "\
You are an assistant answering questions about a PDF document.
Answer with the following in mind:

1. Structure
   - Lead with a direct answer, then supporting detail.
   - Use headings or bullet points for longer answers.

2. Handling data
   - Use a markdown table when the answer involves several values.
   - Quote numbers exactly as they appear in the context.

3. Clarity
   - Rely only on the context below and say when it does not contain the answer.
   - Reference the source pages you used.";

const GENERAL_CLOSING: &str = "Give a well-structured, clear answer.";

fn template(intent: QueryIntent) -> (&'static str, &'static str) {
    match intent {
        QueryIntent::Table => (TABLE_INSTRUCTIONS, TABLE_CLOSING),
        QueryIntent::Chart => (CHART_INSTRUCTIONS, CHART_CLOSING),
        QueryIntent::Numerical => (NUMERICAL_INSTRUCTIONS, NUMERICAL_CLOSING),
        QueryIntent::General => (GENERAL_INSTRUCTIONS, GENERAL_CLOSING),
    }
}

/// Classify `query` and render the prompt for it. No model is called.
pub fn compose(query: &str, results: &[RetrievedChunk]) -> (String, QueryIntent) {
    let intent = classify(query);
    (render(intent, query, results), intent)
}

/// Instructions, closing directive, numbered context blocks, then the question.
pub fn render(intent: QueryIntent, query: &str, results: &[RetrievedChunk]) -> String {
    let (instructions, closing) = template(intent);
    let mut out = String::with_capacity(instructions.len() + results.iter().map(|r| r.chunk.text.len() + 32).sum::<usize>() + query.len() + 64);
    out.push_str(instructions);
    out.push_str("\n\n");
    out.push_str(closing);
    out.push_str("\n\nContext:\n");
    for (i, r) in results.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("Source {} (Page {}):\n", i + 1, page_label(r)));
        out.push_str(&r.chunk.text);
    }
    out.push_str("\n\nQuestion: ");
    out.push_str(query);
    out
}

fn page_label(r: &RetrievedChunk) -> String {
    match (r.chunk.origin, r.chunk.page) {
        (ChunkOrigin::Image, _) => "Image".to_string(),
        (ChunkOrigin::Text, Some(p)) => p.to_string(),
        (ChunkOrigin::Text, None) => "N/A".to_string(),
    }
}
