//! Cleanup of raw model output before display.
//!
//! Models drift from the requested layout: they wrap HTML in code fences or
//! indent it, and a markdown renderer then shows raw markup. This strips the
//! fences and the indentation. It is best-effort string surgery and does not
//! guarantee well-formed markup afterwards.

use std::sync::LazyLock;

use regex::{Captures, Regex};

// A run of three or more backticks plus the language tag glued to it.
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`{3,}[A-Za-z0-9_+\-]*").unwrap());

// Horizontal whitespace at the start of each line (includes U+3000).
static LEADING_WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[^\S\r\n]+").unwrap());

static DISH_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-dish\s*=\s*"([^"]+)""#).unwrap());

static DISH_IMG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img\b([^>]*?)\bdata-dish\s*=\s*"([^"]+)"([^>]*)>"#).unwrap()
});

static SRC_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bsrc\s*=").unwrap());

pub fn sanitize(raw: &str) -> String {
    let without_fences = FENCE_RE.replace_all(raw, "");
    let dedented = LEADING_WS_RE.replace_all(&without_fences, "");
    dedented.trim().to_string()
}

/// Dish names tagged with `data-dish="..."`, in order of first appearance.
pub fn dish_markers(html: &str) -> Vec<String> {
    let mut dishes: Vec<String> = Vec::new();
    for caps in DISH_ATTR_RE.captures_iter(html) {
        let dish = caps[1].trim().to_string();
        if !dish.is_empty() && !dishes.contains(&dish) {
            dishes.push(dish);
        }
    }
    dishes
}

/// Give every `<img data-dish="{dish}">` without a `src` the image URL.
pub fn attach_dish_image(html: &str, dish: &str, image_url: &str) -> String {
    let image_url = image_url.replace('"', "%22");
    DISH_IMG_RE
        .replace_all(html, |caps: &Captures| {
            let whole = &caps[0];
            if caps[2].trim() != dish || SRC_ATTR_RE.is_match(whole) {
                return whole.to_string();
            }
            format!(
                r#"<img src="{}"{}data-dish="{}"{}>"#,
                image_url, &caps[1], &caps[2], &caps[3]
            )
        })
        .into_owned()
}
