use std::fmt::Write as _;

use server_api::{FormInputs, FormOutcome, ResultView};
use shared::protocol::ModelInfo;

const STYLE: &str = r#"
body { font-family: 'Segoe UI', sans-serif; background-color: #e0f2f7; margin: 0; }
.layout { display: flex; gap: 30px; max-width: 1100px; margin: 30px auto; }
.sidebar { flex: 0 0 240px; background-color: #2c3e50; color: #a7d9ed; padding: 20px; border-radius: 15px; }
.sidebar h2 { color: #e0f2f7; border-bottom: 1px solid rgba(255,255,255,0.2); }
.sidebar .loaded { background-color: #4CAF50; color: white; border-radius: 8px; padding: 8px; }
main { flex: 1; background-color: #ffffff; padding: 40px; border-radius: 15px; box-shadow: 0 10px 30px rgba(0,0,0,0.1); }
h1 { color: #0056b3; text-align: center; font-size: 2.4em; }
h2, h3 { color: #007bff; border-bottom: 2px solid #a7d9ed; padding-bottom: 8px; }
.columns { display: grid; grid-template-columns: 1fr 1fr; gap: 18px 30px; }
label { display: block; color: #212529; font-weight: 700; margin-bottom: 6px; }
input[type=number] { width: 100%; box-sizing: border-box; border: 1px solid #ced4da; border-radius: 8px; padding: 10px 15px; }
.hint { color: #6c757d; font-size: 0.85em; margin-top: 4px; }
button { width: 100%; margin-top: 30px; padding: 12px 25px; border: none; border-radius: 10px; color: white; font-weight: bold; font-size: 1.1em; background: linear-gradient(45deg, #28a745, #218838); cursor: pointer; }
.result-phishing, .result-not-phishing { padding: 25px; border-radius: 12px; font-size: 1.6em; font-weight: bold; text-align: center; margin-top: 40px; }
.result-phishing { background-color: #ffebee; color: #d32f2f; border: 2px solid #ef5350; }
.result-not-phishing { background-color: #e8f5e9; color: #388e3c; border: 2px solid #66bb6a; }
.error { background-color: #fdecea; color: #b71c1c; border-radius: 8px; padding: 15px; margin-top: 30px; }
.disclaimer { color: #6c757d; text-align: center; margin-top: 30px; font-size: 0.9em; }
"#;

pub(crate) fn render(inputs: &FormInputs, outcome: &FormOutcome, model: &ModelInfo) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Advanced Phishing Detector</title>\n<style>");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n<div class=\"layout\">\n");
    render_sidebar(&mut html, model);

    html.push_str("<main>\n<h1>Advanced Phishing Detector</h1>\n");
    html.push_str("<h2>Enter Website Feature Values</h2>\n");
    html.push_str("<p>Provide the numerical values for the 16 selected features.</p>\n");
    render_form(&mut html, inputs);
    render_outcome(&mut html, outcome);
    html.push_str(
        "<hr>\n<p class=\"disclaimer\">Disclaimer: Educational tool only. \
         Accuracy depends on the model and training data.</p>\n",
    );
    html.push_str("</main>\n</div>\n</body>\n</html>\n");
    html
}

fn render_sidebar(html: &mut String, model: &ModelInfo) {
    html.push_str("<aside class=\"sidebar\">\n");
    html.push_str("<p class=\"loaded\">Model loaded successfully!</p>\n");
    html.push_str("<h2>About This App</h2>\n");
    html.push_str("<p>This app uses a Random Forest Classifier to detect phishing sites.</p>\n<hr>\n");
    html.push_str("<p>Developed for Phishing Detection Project</p>\n");
    let _ = writeln!(html, "<p>Model Type: {}</p>", escape(&model.model_type));
    if let Some(trees) = model.tree_count {
        let _ = writeln!(html, "<p>Trees: {trees}</p>");
    }
    html.push_str("</aside>\n");
}

fn render_form(html: &mut String, inputs: &FormInputs) {
    html.push_str("<form method=\"post\" action=\"/\">\n<div class=\"columns\">\n");
    // Grid flows row by row, so even indices land left and odd ones right.
    for (spec, raw) in inputs.iter() {
        let value = if raw.trim().is_empty() { "0" } else { raw };
        let _ = writeln!(
            html,
            "<div class=\"field\">\n<label for=\"input_{name}\" title=\"{hint}\">{label}</label>\n\
             <input type=\"number\" step=\"any\" id=\"input_{name}\" name=\"{name}\" value=\"{value}\">\n\
             <div class=\"hint\">{hint}</div>\n</div>",
            name = spec.name,
            label = escape(&spec.label()),
            hint = escape(spec.hint),
            value = escape(value),
        );
    }
    html.push_str("</div>\n<hr>\n<button type=\"submit\">Predict if Phishing</button>\n</form>\n");
}

fn render_outcome(html: &mut String, outcome: &FormOutcome) {
    match outcome {
        FormOutcome::Unsubmitted => {}
        FormOutcome::Shown(view) => render_result(html, view),
        FormOutcome::Rejected(message) | FormOutcome::Failed(message) => {
            let _ = writeln!(html, "<div class=\"error\">{}</div>", escape(message));
        }
    }
}

fn render_result(html: &mut String, view: &ResultView) {
    html.push_str("<h3>Prediction Result</h3>\n");
    let _ = writeln!(
        html,
        "<div class=\"{}\">{}</div>",
        view.panel.css_class(),
        view.headline
    );
    if let Some(line) = &view.confidence_line {
        let _ = writeln!(html, "<p class=\"confidence\">{}</p>", escape(line));
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
