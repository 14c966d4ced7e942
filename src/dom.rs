use scraper::{ElementRef, Selector};

/// Parse a fixed list of CSS selectors. Only for literals known to be valid.
pub fn compile(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|s| Selector::parse(s).unwrap()).collect()
}

/// Full text content, as the browser's `textContent` would give it.
pub fn raw_text(el: ElementRef) -> String {
    el.text().collect()
}

/// Text content trimmed at the ends only; inner line breaks survive.
pub fn trimmed_text(el: ElementRef) -> String {
    raw_text(el).trim().to_string()
}

/// Text content with runs of whitespace collapsed and ends trimmed.
pub fn text_of(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first descendant matched by the first selector that matches
/// anything with non-empty text.
pub fn first_text(scope: ElementRef, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        scope
            .select(sel)
            .next()
            .map(text_of)
            .filter(|t| !t.is_empty())
    })
}

/// First non-empty value of any of `attrs` on the first element each selector matches.
pub fn first_attr(scope: ElementRef, selectors: &[Selector], attrs: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let el = scope.select(sel).next()?;
        attrs
            .iter()
            .filter_map(|a| el.value().attr(a))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    })
}

pub fn class_name<'a>(el: ElementRef<'a>) -> &'a str {
    el.value().attr("class").unwrap_or("")
}
