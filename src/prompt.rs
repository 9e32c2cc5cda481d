//! Prompt assembly for the downstream generator.
//!
//! The wording below is what the generator has been tuned against; keep it
//! byte-for-byte.
use std::fmt::Write;

use crate::retriever::Passage;

/// Reply the generator gives when the query has nothing to do with the context.
pub const OUT_OF_CONTEXT: &str = "OUT OF CONTEXT";

const PASSAGE_DELIMITER: &str = "---";

/// Render one `Date`/`Title`/`Description` block per passage, in order.
#[must_use]
pub fn format_context(passages: &[Passage]) -> String {
    let mut context = String::new();
    for p in passages {
        let _ = write!(
            context,
            "Date: {}\nTitle: {}\nDescription: {}\n{PASSAGE_DELIMITER}\n",
            p.metadata.date, p.metadata.title, p.metadata.description
        );
    }
    context
}

/// Build the grounded prompt for `query` from the ranked `passages`.
#[must_use]
pub fn build_prompt(query: &str, passages: &[Passage]) -> String {
    let context = format_context(passages);
    format!(
        "\ntranscript: {query}\n\nAdditional Information:\n{context}\n, respond\n\
         If the transcript is not related to the provided information, respond with '{OUT_OF_CONTEXT}'. \
         Else provide a detailed and accurate answer based on the provided information.\n\
         Your answer:\n"
    )
}
