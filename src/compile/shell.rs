//! Document shells and built-in page templates.

/// Stylesheet shared by both compiled documents.
const BASE_CSS: &str = r#"
        body {
            font-family: "Segoe UI", "Helvetica Neue", Helvetica, Arial, sans-serif;
            font-size: 12px;
            color: #333;
            line-height: 1.6;
            max-width: 800px;
            text-align: justify;
        }
        h1 { font-size: 1.75em; color: #000; }
        h2 {
            margin-top: 20px;
            margin-bottom: 9px;
            font-size: 1.5em;
            border-bottom: 2px solid #eee;
            padding-bottom: 5px;
            color: #ff5757;
        }
        h3 { margin-top: 18px; margin-bottom: 7px; font-size: 1.1em; color: #000; }
        p { margin-top: 0; margin-bottom: 1em; }
        a { color: #0056b3; text-decoration: none; }
        table { width: 100%; margin: 20px 0; border-collapse: collapse; }
        table, th, td { border: 1px solid #ddd; }
        th, td { text-align: left; padding: 8px; }
        th { background-color: #212121; color: #fff; }
        tr:nth-child(even) { background-color: #f2f2f2; }
        tr:nth-child(odd) { background-color: #fff; }
        caption {
            margin-top: 20px;
            margin-bottom: 10px;
            font-size: 1.2em;
            font-weight: bold;
            text-align: left;
            color: #ff5757;
        }
        .mermaid { text-align: center; }
        @media print {
            .pagebreak { clear: both; page-break-after: always; }
        }"#;

const EXECUTIVE_SUMMARY_CSS: &str = r#"
        body { padding: 30px 20px; }
        h2 { text-align: center; }
        li { margin-bottom: 5px; padding-left: 10px; }
        li strong { color: #ba2727; font-weight: bold; }"#;

const REPORT_CSS: &str = r#"
        body { margin: auto; padding: 0 20px; }
        ul { margin-top: 0; margin-bottom: 1em; }
        .references { margin: 20px 0; }
        .reference-list { counter-reset: reference-counter; list-style: none; padding-left: 0; }
        .reference-list li {
            display: flex;
            align-items: baseline;
            margin-bottom: 3px;
            counter-increment: reference-counter;
        }
        .reference-list li::before {
            content: counter(reference-counter) ". ";
            font-weight: bold;
            margin-right: 5px;
            flex-shrink: 0;
        }"#;

const MERMAID_SCRIPT: &str = r#"<script type="module">
        import mermaid from "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.esm.min.mjs";
        mermaid.initialize({ startOnLoad: true });
    </script>"#;

fn document(extra_css: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"utf-8\">\n    <title>Report</title>\n    <style>{}{}\n    </style>\n    {}\n</head>\n<body>\n{}\n</body>\n</html>\n",
        BASE_CSS, extra_css, MERMAID_SCRIPT, body
    )
}

/// Complete document around the executive summary body.
pub fn executive_summary_document(body: &str) -> String {
    document(EXECUTIVE_SUMMARY_CSS, body)
}

/// Complete document around the report body.
pub fn report_document(body: &str) -> String {
    document(REPORT_CSS, body)
}

pub const REFERENCES_OPEN: &str = "<div class=\"pagebreak\"></div>\n<h2>References</h2>\n<div class=\"references\">\n    <ol class=\"reference-list\">\n";
pub const REFERENCES_CLOSE: &str = "    </ol>\n</div>\n";

pub const TITLE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        html, body { height: 100%; margin: 0; }
        body {
            font-family: "Segoe UI", "Helvetica Neue", Helvetica, Arial, sans-serif;
            display: flex;
            flex-direction: column;
            justify-content: center;
            padding: 0 80px;
            color: #212121;
        }
        h1 { font-size: 40px; margin-bottom: 12px; color: #ff5757; }
        h2 { font-size: 20px; font-weight: normal; margin-top: 0; }
        .meta { margin-top: 80px; font-size: 14px; color: #555; }
    </style>
</head>
<body>
    <h1>{title}</h1>
    <h2>{subtitle}</h2>
    <div class="meta">
        <p>Prepared for {prepared_for}</p>
        <p>{date}</p>
    </div>
</body>
</html>
"#;

pub const DISCLAIMER_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Disclaimer</title>
    <style>
        body {
            font-family: "Segoe UI", "Helvetica Neue", Helvetica, Arial, sans-serif;
            font-size: 12px;
            color: #333;
            line-height: 1.6;
            padding: 60px 80px;
            text-align: justify;
        }
        h2 { color: #ff5757; }
    </style>
</head>
<body>
    <h2>Disclaimer</h2>
    <p>This report was produced automatically from a conversation with an AI assistant. Its content may be incomplete or inaccurate and has not been reviewed by a domain expert.</p>
    <p>Nothing in this report is professional, legal, financial or medical advice. Verify every figure and claim against the cited sources before relying on it.</p>
</body>
</html>
"#;

pub const END_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>End</title>
    <style>
        html, body { height: 100%; margin: 0; }
        body {
            font-family: "Segoe UI", "Helvetica Neue", Helvetica, Arial, sans-serif;
            display: flex;
            align-items: center;
            justify-content: center;
            color: #555;
        }
    </style>
</head>
<body>
    <p>End of report</p>
</body>
</html>
"#;
