/// Substituted when the user leaves the description empty
pub const FALLBACK_DESCRIPTION: &str = "A beautiful picture";

const STYLE_PREFIX: &str = "Studio Ghibli animation style";

const STYLE_QUALIFIERS: &str = concat!(
    "hand-drawn 2D cel animation, watercolor painting technique, ",
    "Hayao Miyazaki art direction, soft dreamlike atmosphere, peaceful serene mood, ",
    "extremely soft muted watercolor tones, minimal line definition, gentle lighting, ",
    "perfect anatomy, natural pose, professional animation quality"
);

/// Longest description accepted from the front-end, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Wrap a user description in the fixed style qualifiers.
///
/// A reference image URL, when present, goes first as its own token; providers
/// that condition on images in the prompt expect it there.
pub fn compose_prompt(description: &str, reference_url: Option<&str>) -> String {
    let description = match description.trim() {
        "" => FALLBACK_DESCRIPTION,
        trimmed => trimmed,
    };
    let styled = format!("{STYLE_PREFIX}, {description}, {STYLE_QUALIFIERS}");

    match reference_url.map(str::trim) {
        Some(url) if !url.is_empty() => format!("{url} {styled}"),
        _ => styled,
    }
}
