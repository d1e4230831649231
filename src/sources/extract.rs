//! Pull the headline and body text out of an article page.

use scraper::{ElementRef, Html, Selector};

use crate::{Error, Result};

/// The readable parts of an article page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub text: String,
}

/// Extract the title (`og:title`, then `<title>`, then the first `<h1>`) and the paragraph
/// text of an HTML page. Paragraphs inside `<article>` win over the rest of the body.
pub fn extract_article(html: &str) -> Result<ExtractedArticle> {
    let document = Html::parse_document(html);

    let title = meta_content(&document, r#"meta[property="og:title"]"#)?
        .or(first_text(&document, "title")?)
        .or(first_text(&document, "h1")?);

    let mut paragraphs = paragraph_texts(&document, "article p")?;
    if paragraphs.is_empty() {
        paragraphs = paragraph_texts(&document, "body p")?;
    }

    Ok(ExtractedArticle {
        title,
        text: paragraphs.join("\n\n"),
    })
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::msg(format!("invalid selector '{css}': {e}")))
}

fn meta_content(document: &Html, css: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|s| !s.is_empty()))
}

fn first_text(document: &Html, css: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .map(element_text)
        .find(|s| !s.is_empty()))
}

fn paragraph_texts(document: &Html, css: &str) -> Result<Vec<String>> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .map(element_text)
        .filter(|s| !s.is_empty())
        .collect())
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
