//! HTML document generation.
//!
//! Static exports are standalone pages that load Plotly.js from its CDN and
//! render one embedded figure. The interactive dashboard page carries the
//! selection controls and talks to the session API.

use crate::chart::Figure;
use crate::view::DashboardInfo;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Make serialized JSON safe to place inside a `<script>` element.
fn embed_json(json: &str) -> String {
    json.replace("</", "<\\/")
}

/// Render a self-contained document for one figure.
pub fn render_chart_document(figure: &Figure) -> Result<String> {
    let json = figure.to_json().context("Failed to serialize figure")?;
    let mut output = String::new();

    output.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    output.push_str("<meta charset=\"UTF-8\">\n");
    output.push_str(&format!("<title>{}</title>\n", escape_html(figure.title())));
    output.push_str(&format!("<script src=\"{}\"></script>\n", PLOTLY_CDN));
    output.push_str("<style>body { font-family: sans-serif; margin: 20px; } #chart { height: 80vh; }</style>\n");
    output.push_str("</head>\n<body>\n");
    output.push_str("<div id=\"chart\"></div>\n");
    output.push_str("<script>\n");
    output.push_str(&format!("const figure = {};\n", embed_json(&json)));
    output.push_str("Plotly.newPlot('chart', figure.data, figure.layout, { responsive: true });\n");
    output.push_str("</script>\n</body>\n</html>\n");

    Ok(output)
}

/// Render the index page linking every exported chart.
pub fn render_index(charts: &[(String, Figure)]) -> String {
    let mut output = String::new();

    output.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    output.push_str("<meta charset=\"UTF-8\">\n<title>Charts</title>\n</head>\n<body>\n");
    output.push_str("<h1>Charts</h1>\n<ul>\n");
    for (name, figure) in charts {
        output.push_str(&format!(
            "<li><a href=\"{}.html\">{}</a></li>\n",
            escape_html(name),
            escape_html(figure.title())
        ));
    }
    output.push_str("</ul>\n</body>\n</html>\n");

    output
}

/// Render the interactive dashboard page.
///
/// Each dashboard gets one `<select>` per dimension. Changes are posted to
/// the session API and the returned figure is redrawn with `Plotly.react`.
pub fn render_dashboard_page(dashboards: &[DashboardInfo]) -> String {
    let mut sections = String::new();

    for dashboard in dashboards {
        let name = escape_html(&dashboard.name);
        sections.push_str(&format!(
            "<section>\n<h2>{}</h2>\n<div class=\"controls\">\n",
            escape_html(&dashboard.title)
        ));
        for dim in &dashboard.dimensions {
            sections.push_str(&format!(
                "<label>{}<select data-chart=\"{}\" data-dimension=\"{}\">\n<option value=\"All\">All</option>\n",
                escape_html(&dim.title),
                name,
                escape_html(&dim.name)
            ));
            for option in &dim.options {
                sections.push_str(&format!(
                    "<option value=\"{}\">{}</option>\n",
                    escape_html(&option.value),
                    escape_html(&option.label)
                ));
            }
            sections.push_str("</select></label>\n");
        }
        sections.push_str(&format!(
            "</div>\n<div class=\"chart\" id=\"chart-{}\"></div>\n</section>\n",
            name
        ));
    }

    DASHBOARD_HTML
        .replace("{{PLOTLY}}", PLOTLY_CDN)
        .replace("{{SECTIONS}}", &sections)
}

/// Write one chart document to `dir/<name>.html`.
pub fn write_chart(dir: &Path, name: &str, figure: &Figure) -> Result<PathBuf> {
    let path = dir.join(format!("{}.html", name));
    let content = render_chart_document(figure)?;

    let mut file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())?;

    debug!("Wrote {} ({} marks)", path.display(), figure.mark_count());
    Ok(path)
}

/// Export every chart plus an `index.html` into `dir`.
pub fn export_charts(
    dir: &Path,
    charts: &[(String, Figure)],
    show_progress: bool,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let progress_bar = if show_progress {
        let pb = ProgressBar::new(charts.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut written = Vec::with_capacity(charts.len() + 1);
    for (name, figure) in charts {
        if let Some(pb) = &progress_bar {
            pb.set_message(name.clone());
        }
        written.push(write_chart(dir, name, figure)?);
        if let Some(pb) = &progress_bar {
            pb.inc(1);
        }
    }

    let index = dir.join("index.html");
    std::fs::write(&index, render_index(charts))
        .with_context(|| format!("Failed to write {}", index.display()))?;
    written.push(index);

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Export complete");
    }

    info!("Exported {} charts to {}", charts.len(), dir.display());
    Ok(written)
}

const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Dashboards</title>
    <script src="{{PLOTLY}}"></script>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }
        section { background: white; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); padding: 15px; margin-bottom: 20px; }
        .controls { display: flex; gap: 20px; margin-bottom: 10px; }
        label { font-weight: 600; color: #555; display: flex; flex-direction: column; gap: 4px; }
        select { padding: 6px; border: 1px solid #ddd; border-radius: 4px; font-size: 14px; }
        .chart { height: 450px; }
        #status { color: #666; font-size: 14px; }
    </style>
</head>
<body>
    <div id="status">Starting session...</div>
{{SECTIONS}}
    <script>
        let session = null;

        function draw(payload) {
            const fig = payload.figure;
            Plotly.react('chart-' + payload.name, fig.data, fig.layout, { responsive: true });
        }

        async function changed(event) {
            const select = event.target;
            const chart = select.dataset.chart;
            const response = await fetch(`/api/sessions/${session}/charts/${chart}/selection`, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ dimension: select.dataset.dimension, value: select.value })
            });
            if (!response.ok) {
                document.getElementById('status').textContent = 'Error: ' + (await response.json()).error;
                return;
            }
            const payload = await response.json();
            draw(payload);
            document.getElementById('status').textContent = `${payload.title}: ${payload.rows} marks`;
        }

        async function start() {
            try {
                const response = await fetch('/api/sessions', { method: 'POST' });
                const body = await response.json();
                session = body.session;
                Object.values(body.charts).forEach(draw);
                document.querySelectorAll('select').forEach(s => s.addEventListener('change', changed));
                document.getElementById('status').textContent = 'Session ' + session;
            } catch (err) {
                document.getElementById('status').textContent = 'Error: ' + err;
            }
        }

        start();
    </script>
</body>
</html>
"##;
