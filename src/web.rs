//! Server-rendered HTML page: upload form, question form, answer and citations.

use pulldown_cmark::{Event, Options, Parser, html};

/// Everything the page can show after a request.
#[derive(Debug, Default, Clone)]
pub struct PageView {
    /// Filenames of the active upload batch.
    pub filenames: Vec<String>,
    /// Question echoed back into the form.
    pub query: Option<String>,
    /// Answer markdown as returned by the language model.
    pub answer: Option<String>,
    /// Citation strings for the answer.
    pub sources: Vec<String>,
    /// Human-readable failure message.
    pub error: Option<String>,
}

/// Render `markdown` to HTML.
///
/// Raw HTML in the input is escaped rather than passed through, since answers come from a
/// remote model.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Render the full page.
pub fn render_page(view: &PageView) -> String {
    let mut body = String::new();

    body.push_str(
        "<form method=\"post\" enctype=\"multipart/form-data\">\n\
         <label>PDF files <input type=\"file\" name=\"pdf\" accept=\"application/pdf\" multiple></label>\n\
         <button type=\"submit\">Upload</button>\n\
         </form>\n",
    );

    if !view.filenames.is_empty() {
        body.push_str("<section class=\"files\">\n<h2>Loaded documents</h2>\n<ul>\n");
        for name in &view.filenames {
            body.push_str(&format!("<li>{}</li>\n", html_escape::encode_text(name)));
        }
        body.push_str("</ul>\n</section>\n");
    }

    let query = view.query.as_deref().unwrap_or_default();
    body.push_str(&format!(
        "<form method=\"post\">\n\
         <label>Question <input type=\"text\" name=\"query\" value=\"{}\" size=\"80\"></label>\n\
         <button type=\"submit\">Ask</button>\n\
         </form>\n",
        html_escape::encode_double_quoted_attribute(query)
    ));

    if let Some(error) = &view.error {
        body.push_str(&format!(
            "<p class=\"error\">{}</p>\n",
            html_escape::encode_text(error)
        ));
    }

    if let Some(answer) = &view.answer {
        body.push_str("<section class=\"answer\">\n<h2>Answer</h2>\n");
        body.push_str(&markdown_to_html(answer));
        body.push_str("</section>\n");
    }

    if !view.sources.is_empty() {
        body.push_str("<section class=\"sources\">\n<h2>Sources</h2>\n<ul>\n");
        for source in &view.sources {
            body.push_str(&format!("<li>{}</li>\n", html_escape::encode_text(source)));
        }
        body.push_str("</ul>\n</section>\n");
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>PDF Q&amp;A</title>\n</head>\n<body>\n<h1>PDF Q&amp;A</h1>\n{body}</body>\n</html>\n"
    )
}
