//! Classifier instructions and expected response shapes.
//!
//! Shapes are written in the OpenAPI subset that every supported backend
//! accepts (object / array / string / boolean with `properties` and
//! `required`).

use serde_json::{json, Value};

use crate::config::TaxonomyConfig;

pub const EXTRACTION_INSTRUCTIONS: &str = r#"Analyze this note and extract every piece of content it holds, tagging each piece with the category it belongs to.

Guidelines:
- A single note can contribute to MULTIPLE categories; return one extraction per distinct piece of content
- Each extraction's "content" must be a verbatim excerpt from the note, never a paraphrase, and never empty
- Prefer actionable categories (e.g. "Books to Read") over abstract ones (e.g. "Literature")
- Use natural, human-readable category names
- Be specific enough to be useful, but general enough to group related notes
- If a note is too vague or lacks meaningful content (a lone phone number, a single word, incoherent text, just a filename for an image or recording), return no extractions and mark it as unused

Examples:
- "Check out Dune, also remember to buy milk, and that story John told about Paris"
  -> "Check out Dune" under "Movies to Watch", "buy milk" under "Shopping List", "that story John told about Paris" under "Stories to Remember"
- "IMG_1234.jpg" or "847-555-0123"
  -> no extractions, unused = true

Return "unused": false whenever at least one extraction is returned."#;

const TAXONOMY_INSTRUCTIONS: &str = r#"Review this list of category labels collected from individual notes. Merge similar and overlapping labels into a clean, consolidated taxonomy.

Rules:
- Combine near-duplicates aggressively (e.g. "Movies to Watch" + "Films to See" + "Movies to Check Out" -> "Movies to Watch")
- Keep categories at a consistent level of specificity across the taxonomy
- Prefer the most common or most natural phrasing when merging
- Keep labels separate only when they denote genuinely distinct purposes (e.g. "Movies to Watch" and "Movie Reviews" are different)
- Maintain the actionable nature of category names where applicable
- Aim for roughly {min}-{max} final categories; this is a target, not a hard limit

Examples of good merges:
- "Books to Read" + "Reading List" + "Book Recommendations" -> "Books to Read"
- "Gift Ideas" + "Present Ideas" + "Gift Ideas for Mom" -> "Gift Ideas"

For each final category return its canonical name and the list of input labels it subsumes, spelled exactly as they appear in the input. Every input label must appear in exactly one group."#;

/// Instructions for the taxonomy call with the configured size target.
pub fn taxonomy_instructions(settings: &TaxonomyConfig) -> String {
    TAXONOMY_INSTRUCTIONS
        .replace("{min}", &settings.target_min.to_string())
        .replace("{max}", &settings.target_max.to_string())
}

/// Expected shape of a per-note extraction response.
pub fn extraction_shape() -> Value {
    json!({
        "type": "object",
        "properties": {
            "extractions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["category", "content"]
                }
            },
            "unused": { "type": "boolean" }
        },
        "required": ["extractions", "unused"]
    })
}

/// Expected shape of the taxonomy response.
pub fn taxonomy_shape() -> Value {
    json!({
        "type": "object",
        "properties": {
            "categories": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "canonical": { "type": "string" },
                        "raw": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["canonical", "raw"]
                }
            }
        },
        "required": ["categories"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_instructions_carry_target_range() {
        let settings = TaxonomyConfig {
            target_min: 5,
            target_max: 9,
            ..TaxonomyConfig::default()
        };
        let text = taxonomy_instructions(&settings);
        assert!(text.contains("roughly 5-9 final categories"));
        assert!(!text.contains("{min}"));
    }

    #[test]
    fn shapes_require_their_top_level_fields() {
        assert_eq!(
            extraction_shape()["required"],
            json!(["extractions", "unused"])
        );
        assert_eq!(taxonomy_shape()["required"], json!(["categories"]));
    }
}
