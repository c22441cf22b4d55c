use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static SEL_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("invalid selector: anchor"));
static SEL_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("invalid selector: table cell"));

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

/// Trimmed text of every `td` in a table row, in column order.
pub(crate) fn cell_texts(row: ElementRef) -> Vec<String> {
    row.select(&SEL_CELL)
        .map(|td| elem_text(td).trim().to_string())
        .collect()
}

/// `href` of the first anchor nested in the `column`th cell of a table row.
pub(crate) fn cell_href(row: ElementRef, column: usize) -> Option<String> {
    row.select(&SEL_CELL)
        .nth(column)?
        .select(&SEL_ANCHOR)
        .find_map(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// A single fetched HTML page, parsed once and queried by the extractors.
///
/// Lookups never fail: a locator that matches nothing yields an empty string
/// or an empty list, and the caller decides whether that is fatal.
pub struct PageDocument {
    html: Html,
}

impl PageDocument {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// Trimmed text of the first element matching `selector`.
    pub fn first_text(&self, selector: &Selector) -> String {
        self.html
            .select(selector)
            .next()
            .map(|e| elem_text(e).trim().to_string())
            .unwrap_or_default()
    }

    pub fn select_all(&self, selector: &Selector) -> Vec<ElementRef<'_>> {
        self.html.select(selector).collect()
    }

    /// `href` of the first anchor whose visible text is exactly `text`,
    /// surrounding whitespace included.
    pub fn link_href(&self, text: &str) -> String {
        self.html
            .select(&SEL_ANCHOR)
            .filter(|a| elem_text(*a) == text)
            .find_map(|a| a.value().attr("href"))
            .map(str::to_string)
            .unwrap_or_default()
    }
}
