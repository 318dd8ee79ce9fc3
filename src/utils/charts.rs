//! SVG Curve Charts
//!
//! Renders ROC and precision/recall curves on a unit-square plot as
//! standalone SVG files.

use std::fs;
use std::path::Path;

const CHART_WIDTH: f64 = 640.0;
const CHART_HEIGHT: f64 = 560.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 200.0;
const MARGIN_BOTTOM: f64 = 70.0;
const MARGIN_LEFT: f64 = 70.0;

const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";
const COLOR_REFERENCE: &str = "#c0392b";

/// Line colors cycled over the series
pub const PALETTE: [&str; 7] = [
    "#3498db", "#2ecc71", "#e74c3c", "#9b59b6", "#f39c12", "#1abc9c", "#34495e",
];

/// One curve on a unit-square chart
#[derive(Debug, Clone)]
pub struct Curve {
    pub name: String,
    /// (x, y) points, both expected in [0, 1]
    pub points: Vec<(f64, f64)>,
}

impl Curve {
    pub fn new(name: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// Build the SVG document for a set of curves
pub fn render_curve_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    curves: &[Curve],
    diagonal: bool,
) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let px = |x: f64| MARGIN_LEFT + x.clamp(0.0, 1.0) * plot_width;
    let py = |y: f64| MARGIN_TOP + plot_height - y.clamp(0.0, 1.0) * plot_height;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        COLOR_TEXT,
        escape_xml(title)
    ));

    // Grid and tick labels on both axes
    for i in 0..=5 {
        let t = i as f64 / 5.0;
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            px(0.0),
            py(t),
            px(1.0),
            py(t),
            COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            px(t),
            py(0.0),
            px(t),
            py(1.0),
            COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.1}</text>"#,
            px(0.0) - 8.0,
            py(t) + 4.0,
            COLOR_TEXT,
            t
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.1}</text>"#,
            px(t),
            py(0.0) + 20.0,
            COLOR_TEXT,
            t
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        px(0.0),
        py(0.0),
        px(1.0),
        py(0.0),
        COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        px(0.0),
        py(0.0),
        px(0.0),
        py(1.0),
        COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        CHART_HEIGHT - 20.0,
        COLOR_TEXT,
        escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        MARGIN_TOP + plot_height / 2.0,
        COLOR_TEXT,
        MARGIN_TOP + plot_height / 2.0,
        escape_xml(y_label)
    ));

    if diagonal {
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1" stroke-dasharray="6 4"/>"#,
            px(0.0),
            py(0.0),
            px(1.0),
            py(1.0),
            COLOR_REFERENCE
        ));
    }

    for (idx, curve) in curves.iter().enumerate() {
        if curve.points.is_empty() {
            continue;
        }
        let color = PALETTE[idx % PALETTE.len()];

        let mut path = String::new();
        for (i, &(x, y)) in curve.points.iter().enumerate() {
            let cmd = if i == 0 { "M" } else { " L" };
            path.push_str(&format!("{} {:.2} {:.2}", cmd, px(x), py(y)));
        }
        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
            path, color
        ));

        let legend_y = MARGIN_TOP + 10.0 + idx as f64 * 22.0;
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="14" height="14" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT + 20.0,
            legend_y,
            color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT + 40.0,
            legend_y + 11.0,
            COLOR_TEXT,
            escape_xml(&curve.name)
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Render and write a curve chart to `output_path`
pub fn write_curve_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    curves: &[Curve],
    diagonal: bool,
    output_path: &Path,
) -> std::io::Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(
        output_path,
        render_curve_chart(title, x_label, y_label, curves, diagonal),
    )
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
