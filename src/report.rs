//! Markdown rendering of a [`ResearchResult`] for terminal output.

use crate::engine::ResearchResult;

/// Escape characters that break Markdown link text: `[`, `]`, `(`, `)`.
fn escape_link_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '[' | ']' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Collapse line breaks so a value stays on its heading or list line.
fn single_line(s: &str) -> String {
    s.split(['\n', '\r'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_markdown(title: &str, result: &ResearchResult) -> String {
    let mut out = format!("# {}\n\n", single_line(title));
    out.push_str(result.summary.trim());
    out.push_str("\n\n");

    if !result.facts.is_empty() {
        out.push_str("## Facts\n\n");
        for fact in &result.facts {
            out.push_str(&format!("- {}\n", single_line(fact)));
        }
        out.push('\n');
    }

    out.push_str("## Sources\n\n");
    if result.citations.is_empty() {
        out.push_str("No sources found.\n");
        return out;
    }
    for (i, c) in result.citations.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}]({}) ({}",
            i + 1,
            escape_link_text(&single_line(&c.title)),
            c.url,
            c.source_type.as_str()
        ));
        if let Some(score) = c.score {
            out.push_str(&format!(", score {score}"));
        }
        out.push(')');
        if let Some(publisher) = &c.publisher {
            out.push_str(&format!(" · {}", single_line(publisher)));
        }
        out.push('\n');
        if let Some(snippet) = &c.snippet {
            out.push_str(&format!("   > {}\n", single_line(snippet)));
        }
    }
    out
}
