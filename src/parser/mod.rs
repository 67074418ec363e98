pub mod classify;
pub mod keys;
pub mod sections;
pub mod tokens;

use crate::options::Options;
use classify::Classified;
use tokens::TokenSequence;

pub struct ExtractedProperty {
    pub key: String,
    pub value: Classified,
}

pub struct Extraction {
    pub description: TokenSequence,
    pub properties: Vec<ExtractedProperty>,
}

/// Three-pass pipeline: markdown → tokens → segments → keyed, classified properties.
pub fn extract_properties(markdown: &str, options: &Options) -> Extraction {
    let segments = sections::segment(tokens::lex(markdown));
    let properties = segments
        .properties
        .into_iter()
        .map(|segment| ExtractedProperty {
            key: keys::key_from_heading(&segment.heading, segment.body.links(), options),
            value: classify::classify(segment.body),
        })
        .collect();

    Extraction {
        description: segments.description,
        properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_fixture() {
        let md = std::fs::read_to_string("tests/fixtures/recipe.md").unwrap();
        let extraction = extract_properties(&md, &Options::default());
        let keys: Vec<&str> = extraction.properties.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, ["ingredients", "servings", "metadata", "method"]);
        assert_eq!(extraction.description.len(), 2);
        assert!(matches!(extraction.properties[0].value, Classified::RichText(_)));
        assert!(matches!(extraction.properties[1].value, Classified::Structured(_)));
        assert!(matches!(extraction.properties[2].value, Classified::Structured(_)));
        assert!(matches!(extraction.properties[3].value, Classified::RichText(_)));
    }

    #[test]
    fn heading_references_resolve_against_whole_description() {
        let md = "Intro\n\n# Per [Unit][u]\n\n```\n3\n```\n\n[u]: https://units.test";
        let extraction = extract_properties(md, &Options::default());
        assert_eq!(extraction.properties[0].key, "per_unit");
    }
}
