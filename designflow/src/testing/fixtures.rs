//! Canned model outputs for a small bakery landing page.

use super::mocks::ScriptedTextGenerator;

/// The user prompt.
pub const BAKERY_PROMPT: &str = "A landing page for a neighborhood bakery";

/// Outline stage output: prose, no code block.
pub const BAKERY_OUTLINE: &str = "\
1. Hero with the bakery name and a photo of fresh loaves.
2. Today's bread: three cards.
3. Visit us: address and opening hours.";

/// Wireframe stage output.
pub const BAKERY_WIREFRAME: &str = "Here is the wireframe:
```html
<main><h1>Crumb &amp; Co.</h1><img src=\"https://picsum.photos/1200/600\" alt=\"Fresh loaves on a wooden counter\"></main>
```";

/// HTML inside [`BAKERY_WIREFRAME`].
pub const BAKERY_WIREFRAME_HTML: &str = "<main><h1>Crumb &amp; Co.</h1><img src=\"https://picsum.photos/1200/600\" alt=\"Fresh loaves on a wooden counter\"></main>";

/// Refinement stage output.
pub const BAKERY_FINAL: &str = "Final design:
```html
<main class=\"font-serif\"><section class=\"h-96 bg-[url(https://picsum.photos/1600/900)] bg-cover\" aria-label=\"Warm bakery interior at dawn with flour in the air\"><h1 class=\"text-5xl\">Crumb &amp; Co.</h1></section><div class=\"grid grid-cols-3 gap-6\"><img src=\"https://picsum.photos/400/300\" alt=\"Rustic sourdough boule with a crackled crust\"><img src=\"https://picsum.photos/400/300\" alt=\"Golden butter croissants on parchment\"><img src=\"https://picsum.photos/400\" alt=\"\"></div></main>
```
Enjoy!";

/// HTML inside [`BAKERY_FINAL`].
pub const BAKERY_FINAL_HTML: &str = "<main class=\"font-serif\"><section class=\"h-96 bg-[url(https://picsum.photos/1600/900)] bg-cover\" aria-label=\"Warm bakery interior at dawn with flour in the air\"><h1 class=\"text-5xl\">Crumb &amp; Co.</h1></section><div class=\"grid grid-cols-3 gap-6\"><img src=\"https://picsum.photos/400/300\" alt=\"Rustic sourdough boule with a crackled crust\"><img src=\"https://picsum.photos/400/300\" alt=\"Golden butter croissants on parchment\"><img src=\"https://picsum.photos/400\" alt=\"\"></div></main>";

/// A generator scripted with the three bakery stage outputs.
#[must_use]
pub fn bakery_generator() -> ScriptedTextGenerator {
    ScriptedTextGenerator::new()
        .with_response(BAKERY_OUTLINE)
        .with_response(BAKERY_WIREFRAME)
        .with_response(BAKERY_FINAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::extract_html_block;

    #[test]
    fn test_fixture_blocks_match() {
        assert_eq!(extract_html_block(BAKERY_OUTLINE), None);
        assert_eq!(extract_html_block(BAKERY_WIREFRAME), Some(BAKERY_WIREFRAME_HTML));
        assert_eq!(extract_html_block(BAKERY_FINAL), Some(BAKERY_FINAL_HTML));
    }
}
