// Human-readable renderings of a Report, shared by the file and webhook channels
use std::fmt::Write as _;

use crate::article::SummarizedArticle;
use crate::report::Report;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn article_meta(entry: &SummarizedArticle) -> String {
    let article = &entry.article;
    match article.published_at {
        Some(at) => format!("{}, {}", article.source_id, at.format("%Y-%m-%d %H:%M UTC")),
        None => article.source_id.clone(),
    }
}

fn title_or_url(entry: &SummarizedArticle) -> &str {
    let title = entry.article.title.trim();
    if title.is_empty() {
        &entry.article.url
    } else {
        title
    }
}

/// Markdown document with one `## keyword` section per keyword, in report order.
pub fn markdown(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", report.title);
    let _ = writeln!(
        out,
        "_{} to {}_\n",
        report.period_start.format(DATE_FORMAT),
        report.period_end.format(DATE_FORMAT)
    );
    let _ = writeln!(
        out,
        "{} articles, {} distinct, {} without summary\n",
        report.total_articles_considered, report.total_after_dedup, report.failed_summary_count
    );

    if let Some(overview) = &report.overview {
        let _ = writeln!(out, "{}\n", overview.trim());
    }

    for section in &report.sections {
        let _ = writeln!(out, "## {}\n", section.keyword);
        if section.is_empty() {
            out.push_str("_No articles._\n\n");
            continue;
        }
        for entry in &section.articles {
            let _ = writeln!(
                out,
                "- [{}]({}) — {}",
                title_or_url(entry),
                entry.article.url,
                article_meta(entry)
            );
            if let Some(image) = &entry.article.image_url {
                let _ = writeln!(out, "  ![{}]({})", title_or_url(entry), image);
            }
            if entry.is_failed() {
                out.push_str("  _summary unavailable_\n");
            } else {
                let _ = writeln!(out, "  {}", entry.summary_text);
            }
        }
        out.push('\n');
    }

    if !report.collection.failed_sources.is_empty() {
        out.push_str("---\n\nUnavailable sources:\n");
        for failure in &report.collection.failed_sources {
            let _ = writeln!(out, "- {}", failure);
        }
    }
    out
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Self-contained HTML page. All report text is escaped.
pub fn html(report: &Report) -> String {
    let title = escape(&report.title);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", title);
    out.push_str(
        "<style>body{font-family:sans-serif;max-width:48em;margin:2em auto;line-height:1.5}\
         .meta{color:#666;font-size:0.9em}.failed{color:#999;font-style:italic}\
         img{max-width:100%;max-height:12em;display:block;margin:0.3em 0}</style>\n",
    );
    out.push_str("</head>\n<body>\n");
    let _ = writeln!(out, "<h1>{}</h1>", title);
    let _ = writeln!(
        out,
        "<p class=\"meta\">{} to {} &middot; {} articles, {} distinct, {} without summary</p>",
        report.period_start.format(DATE_FORMAT),
        report.period_end.format(DATE_FORMAT),
        report.total_articles_considered,
        report.total_after_dedup,
        report.failed_summary_count
    );

    if let Some(overview) = &report.overview {
        let _ = writeln!(out, "<p>{}</p>", escape(overview.trim()));
    }

    for section in &report.sections {
        let _ = writeln!(out, "<h2>{}</h2>", escape(&section.keyword));
        if section.is_empty() {
            out.push_str("<p class=\"failed\">No articles.</p>\n");
            continue;
        }
        out.push_str("<ul>\n");
        for entry in &section.articles {
            let _ = write!(
                out,
                "<li><a href=\"{}\">{}</a> <span class=\"meta\">{}</span><br>",
                escape(&entry.article.url),
                escape(title_or_url(entry)),
                escape(&article_meta(entry))
            );
            if let Some(image) = &entry.article.image_url {
                let _ = write!(
                    out,
                    "<img src=\"{}\" alt=\"{}\" loading=\"lazy\">",
                    escape(image),
                    escape(title_or_url(entry))
                );
            }
            if entry.is_failed() {
                out.push_str("<span class=\"failed\">summary unavailable</span>");
            } else {
                out.push_str(&escape(&entry.summary_text));
            }
            out.push_str("</li>\n");
        }
        out.push_str("</ul>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}
