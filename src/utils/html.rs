use crate::models::{PublishReport, Session, WorkflowStage};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use uuid::Uuid;

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; margin: 40px; }
        .title { text-align: center; font-size: 2em; color: #4CAF50; }
        .description { text-align: center; font-size: 1.2em; margin-bottom: 20px; }
        .section { margin: 20px auto; padding: 10px; border-radius: 5px; background-color: #f9f9f9; box-shadow: 0 2px 5px rgba(0, 0, 0, 0.1); }
        .error { background-color: #fdecea; padding: 10px; border-radius: 4px; }
        .success { background-color: #edf7ed; padding: 10px; border-radius: 4px; }
        .warning { background-color: #fff4e5; padding: 10px; border-radius: 4px; }
        .notice { font-family: monospace; color: #555; margin: 2px 0; }
        .stage { color: #888; font-size: 0.9em; }
        input[type=text], textarea { width: 100%; padding: 8px; margin: 6px 0; box-sizing: border-box; }
"#;

pub fn render_page(id: Uuid, session: &Session, last: Option<&PublishReport>) -> String {
    let mut body = String::new();

    if let Some(error) = &session.error {
        body.push_str(&format!(r#"<div class="error">{}</div>"#, text(error)));
    }

    render_form(&mut body, id, session);

    if !session.chapters.is_empty() {
        render_outline(&mut body, id, session);
    }

    if let Some(report) = last {
        render_report(&mut body, report);
    }

    if !session.results.is_empty() {
        body.push_str(r#"<div class="section"><strong>Published so far:</strong><ul>"#);
        for result in &session.results {
            body.push_str(&format!(
                "<li>{}: {}</li>",
                text(&result.title),
                text(&result.report.outcome.message())
            ));
        }
        body.push_str("</ul></div>");
    }

    body.push_str(&format!(
        r#"<p class="stage">Current state: {}</p>"#,
        text(session.stage.label())
    ));

    layout(&body)
}

pub fn render_not_found() -> String {
    layout(r#"<div class="error">This session has expired. <a href="/">Start a new one</a>.</div>"#)
}

fn layout(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>AI Book Generator</title>
    <meta charset="utf-8">
    <style>{}</style>
</head>
<body>
    <div class="title">📚 AI Book Generator</div>
    <div class="description">Generate and manage your book content easily!</div>
    {}
</body>
</html>
"#,
        STYLE, body
    )
}

fn render_form(body: &mut String, id: Uuid, session: &Session) {
    let locked = session.stage != WorkflowStage::AwaitingInput;
    let disabled = if locked { " disabled" } else { "" };
    body.push_str(&format!(
        r#"<form method="post" action="/outline" class="section">
        <input type="hidden" name="session" value="{id}">
        <label>Enter the book title:<input type="text" name="title" value="{title}"{disabled}></label>
        <label>Enter the book description:<textarea name="description" rows="4"{disabled}>{description}</textarea></label>
        <button type="submit"{disabled}>Generate Table of Contents</button>
    </form>"#,
        id = id,
        title = attr(&session.title),
        description = text(&session.description),
        disabled = disabled,
    ));
    if locked {
        body.push_str(&format!(
            r#"<form method="post" action="/reset"><input type="hidden" name="session" value="{}"><button type="submit">Start over</button></form>"#,
            id
        ));
    }
}

fn render_outline(body: &mut String, id: Uuid, session: &Session) {
    body.push_str(r#"<div class="section"><strong>Table of Contents:</strong><ul>"#);
    for (index, chapter) in session.chapters.iter().enumerate() {
        body.push_str(&format!(
            r#"<li>{chapter}
            <form method="post" action="/publish" style="display:inline">
                <input type="hidden" name="session" value="{id}">
                <input type="hidden" name="index" value="{index}">
                <button type="submit">Push to GitHub '{chapter}'</button>
            </form></li>"#,
            chapter = text(chapter),
            id = id,
            index = index,
        ));
    }
    body.push_str("</ul></div>");
}

fn render_report(body: &mut String, report: &PublishReport) {
    use crate::models::PublishOutcome::*;

    body.push_str(r#"<div class="section">"#);
    if let Some(snapshot) = report.rate_limit {
        body.push_str(&format!("<p><strong>{}</strong></p>", text(&snapshot.to_string())));
    }
    for notice in &report.notices {
        body.push_str(&format!(r#"<p class="notice">{}</p>"#, text(notice)));
    }
    let class = match report.outcome {
        Published { .. } => "success",
        AlreadyExists { .. } => "warning",
        RateLimited | Failed { .. } | RetriesExhausted => "error",
    };
    body.push_str(&format!(
        r#"<div class="{}">{}</div></div>"#,
        class,
        text(&report.outcome.message())
    ));
}
