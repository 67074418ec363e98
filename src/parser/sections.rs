use super::tokens::{Token, TokenSequence};

/// One `# Heading` and everything up to the next depth-1 heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySegment {
    pub heading: Token,
    pub body: TokenSequence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    pub description: TokenSequence,
    pub properties: Vec<PropertySegment>,
}

/// Cut a flat token sequence at depth-1 headings. Linear, left to right,
/// and lossless: every token lands in exactly one segment.
pub fn segment(mut tokens: TokenSequence) -> Segments {
    let description = take_until_boundary(&mut tokens);
    let mut properties = Vec::new();

    while let Some(heading) = tokens.pop_front() {
        let body = take_until_boundary(&mut tokens);
        properties.push(PropertySegment { heading, body });
    }

    Segments {
        description,
        properties,
    }
}

fn take_until_boundary(tokens: &mut TokenSequence) -> TokenSequence {
    let end = tokens
        .tokens()
        .iter()
        .position(Token::is_top_level_heading)
        .unwrap_or(tokens.len());
    tokens.split_front(end)
}

// ── Tests ──
