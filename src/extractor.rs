use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::fmt;

use crate::error::IndicatorError;

const CONTAINER_ID: &str = "_BcentralIndicadoresViewer_INSTANCE_pLcePZ0Eybi8_myTooltipDelegate";

lazy_static! {
    static ref DOLAR_BLOCKS: Selector =
        Selector::parse(&format!("#{CONTAINER_ID} div.fin-indicators div.col-6")).unwrap();
    static ref UF_PARAGRAPHS: Selector =
        Selector::parse(&format!("#{CONTAINER_ID} div.tooltip-wrap p")).unwrap();
    static ref PARAGRAPH: Selector = Selector::parse("p").unwrap();
    static ref NOISE: Regex = Regex::new(r"[$\r\n\s]+").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Uf,
    Dolar,
}

impl Indicator {
    pub fn name(&self) -> &'static str {
        match self {
            Indicator::Uf => "uf",
            Indicator::Dolar => "dolar",
        }
    }

    pub fn sibling(&self) -> Indicator {
        match self {
            Indicator::Uf => Indicator::Dolar,
            Indicator::Dolar => Indicator::Uf,
        }
    }

    /// Scrapes this indicator out of `html` and normalizes it to a
    /// dot-decimal string.
    pub fn scrape(
        &self,
        extractor: &dyn IndicatorExtractor,
        html: &str,
    ) -> Result<String, IndicatorError> {
        let raw = match self {
            Indicator::Uf => extractor.extract_uf(html)?,
            Indicator::Dolar => extractor.extract_dolar(html)?,
        };
        normalize_decimal(&raw)
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pulls raw indicator text (e.g. `36.956,27`) out of the indicators page.
pub trait IndicatorExtractor: Send + Sync {
    fn extract_uf(&self, html: &str) -> Result<String, IndicatorError>;
    fn extract_dolar(&self, html: &str) -> Result<String, IndicatorError>;
}

/// Structural traversal of the Banco Central landing page. Any layout change
/// on their side breaks it; there is no fallback.
pub struct BcentralExtractor;

impl IndicatorExtractor for BcentralExtractor {
    fn extract_uf(&self, html: &str) -> Result<String, IndicatorError> {
        let document = Html::parse_document(html);
        let paragraph = document
            .select(&UF_PARAGRAPHS)
            .nth(1)
            .ok_or_else(|| IndicatorError::Selector("uf paragraph".into()))?;

        first_text(paragraph).ok_or_else(|| IndicatorError::Selector("uf text".into()))
    }

    fn extract_dolar(&self, html: &str) -> Result<String, IndicatorError> {
        let document = Html::parse_document(html);
        let block = document
            .select(&DOLAR_BLOCKS)
            .nth(2)
            .ok_or_else(|| IndicatorError::Selector("dolar block".into()))?;
        let paragraph = block
            .select(&PARAGRAPH)
            .nth(1)
            .ok_or_else(|| IndicatorError::Selector("dolar paragraph".into()))?;

        first_text(paragraph).ok_or_else(|| IndicatorError::Selector("dolar text".into()))
    }
}

// Text of the first child node with currency symbols and whitespace removed.
fn first_text(element: ElementRef) -> Option<String> {
    let child = element.first_child()?;
    let text = match child.value() {
        Node::Text(text) => text.to_string(),
        _ => ElementRef::wrap(child)?.text().collect::<String>(),
    };

    let cleaned = NOISE.replace_all(&text, "").into_owned();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// `36.956,27` -> `36956.27`. Thousands dots go, the first comma becomes the
/// decimal point.
pub fn normalize_decimal(raw: &str) -> Result<String, IndicatorError> {
    let normalized = raw.replace('.', "").replacen(',', ".", 1);

    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(normalized),
        _ => Err(IndicatorError::Parse(format!("decimal {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(dolar_paragraph: &str, uf_paragraph: &str) -> String {
        format!(
            r#"<html><body>
<div id="{CONTAINER_ID}">
  <div class="fin-indicators">
    <div class="col-6"><p>UF</p><p>$36.956,27</p></div>
    <div class="col-6"><p>EURO</p><p>$1.010,56</p></div>
    <div class="col-6"><p>DÓLAR</p>{dolar_paragraph}</div>
    <div class="col-6"><p>IPC</p><p>0,5%</p></div>
  </div>
  <div class="tooltip-wrap">
    <p class="basic-text">Unidad de Fomento</p>
    {uf_paragraph}
  </div>
</div>
</body></html>"#
        )
    }

    #[test]
    fn extracts_dolar_from_third_block() {
        let html = page("<p>\n   $942,31\r\n </p>", "<p>$36.956,27</p>");
        assert_eq!(BcentralExtractor.extract_dolar(&html).unwrap(), "942,31");
    }

    #[test]
    fn extracts_uf_from_tooltip() {
        let html = page("<p>$942,31</p>", "<p> $ 36.956,27 </p>");
        assert_eq!(BcentralExtractor.extract_uf(&html).unwrap(), "36.956,27");
    }

    #[test]
    fn only_the_first_child_node_is_read() {
        let html = page("<p><strong>$ 1.942,31</strong> pesos</p>", "<p>$36.956,27</p>");
        assert_eq!(BcentralExtractor.extract_dolar(&html).unwrap(), "1.942,31");
    }

    #[test]
    fn missing_markup_is_a_selector_error() {
        let html = "<html><body><div class=\"fin-indicators\"></div></body></html>";
        assert!(matches!(
            BcentralExtractor.extract_dolar(html),
            Err(IndicatorError::Selector(_))
        ));
        assert!(matches!(
            BcentralExtractor.extract_uf(html),
            Err(IndicatorError::Selector(_))
        ));
    }

    #[test]
    fn empty_paragraph_is_a_selector_error() {
        let html = page("<p> $ </p>", "<p></p>");
        assert!(matches!(
            BcentralExtractor.extract_dolar(&html),
            Err(IndicatorError::Selector(_))
        ));
        assert!(matches!(
            BcentralExtractor.extract_uf(&html),
            Err(IndicatorError::Selector(_))
        ));
    }

    #[test]
    fn normalizes_chilean_decimals() {
        assert_eq!(normalize_decimal("36.956,27").unwrap(), "36956.27");
        assert_eq!(normalize_decimal("942,31").unwrap(), "942.31");
        assert_eq!(normalize_decimal("1.000.000").unwrap(), "1000000");
    }

    #[test]
    fn rejects_non_numeric_text() {
        assert!(matches!(
            normalize_decimal("N/D"),
            Err(IndicatorError::Parse(_))
        ));
        assert!(normalize_decimal("1,2,3").is_err());
        assert!(normalize_decimal("inf").is_err());
    }

    #[test]
    fn scrape_extracts_and_normalizes() {
        let html = page("<p>$942,31</p>", "<p>$36.956,27</p>");
        assert_eq!(
            Indicator::Uf.scrape(&BcentralExtractor, &html).unwrap(),
            "36956.27"
        );
        assert_eq!(
            Indicator::Dolar.scrape(&BcentralExtractor, &html).unwrap(),
            "942.31"
        );
    }
}
