use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    chart::{render, ChartSpec, RegionFilter, ALL_REGIONS},
    config::ServerConfig,
    dataset::Dataset,
};

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>__TITLE__</title>
<script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
<style>
  body { font-family: system-ui, sans-serif; margin: 0; background: #f8fbff; color: #0c1625; }
  .app-container { max-width: 1100px; margin: 0 auto; padding: 24px; }
  h1 { text-align: center; font-weight: 600; }
  .radio-group { display: flex; justify-content: center; gap: 16px; margin-bottom: 16px; }
  .radio-group label { cursor: pointer; }
  #sales-line-chart { background: #ffffff; border-radius: 10px; min-height: 480px; }
</style>
</head>
<body>
<div class="app-container">
  <h1>__HEADING__</h1>
  <div id="region-filter" class="radio-group">
__OPTIONS__
  </div>
  <div id="sales-line-chart"></div>
</div>
<script>
  const chart = document.getElementById("sales-line-chart");
  const initial = __FIGURE__;
  Plotly.newPlot(chart, initial.data, initial.layout);
  document.querySelectorAll('input[name="region-filter"]').forEach((input) => {
    input.addEventListener("change", async () => {
      const res = await fetch("/api/figure?region=" + encodeURIComponent(input.value));
      if (!res.ok) return;
      const figure = await res.json();
      Plotly.react(chart, figure.data, figure.layout);
    });
  });
</script>
</body>
</html>
"#;

/// One entry of the region selector.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorOption {
    pub label: String,
    pub value: String,
}

/// `All` followed by the configured regions, labelled with a leading capital.
pub fn selector_options(regions: &[String]) -> Vec<SelectorOption> {
    std::iter::once(ALL_REGIONS)
        .chain(regions.iter().map(String::as_str))
        .map(|value| {
            let value = value.to_lowercase();
            let mut chars = value.chars();
            let label = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
            SelectorOption { label, value }
        })
        .collect()
}

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    dataset: Dataset,
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(dataset: Dataset, config: ServerConfig) -> Self {
        Self {
            dataset,
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FigureQuery {
    pub region: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/figure", get(figure))
        .with_state(state)
}

/// Loads the dataset, then serves the dashboard until the process is stopped.
///
/// A missing or malformed dataset fails here, before anything is bound.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let dataset = Dataset::load(&config.dataset_path).context("failed to load sales dataset")?;
    if dataset.is_empty() {
        warn!(path = %config.dataset_path.display(), "dataset has no rows, charts will be empty");
    }

    for region in dataset.regions() {
        if !config.regions.iter().any(|r| r.eq_ignore_ascii_case(&region)) {
            warn!(region = %region, "region present in dataset has no selector option");
        }
    }

    let addr = config.bind_addr;
    let dataset_rows = dataset.len();
    let app = router(AppState::new(dataset, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind chart server")?;

    info!(addr = %addr, rows = dataset_rows, "chart server listening");

    axum::serve(listener, app)
        .await
        .context("chart server error")?;

    Ok(())
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, String)> {
    let chart = render(&state.dataset, &RegionFilter::All);
    debug!(region = ALL_REGIONS, lines = chart.data.len(), "rendered chart");
    let figure = serde_json::to_string(&chart).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode figure: {e}"),
        )
    })?;

    Ok(Html(render_page(&state.config, &figure)))
}

async fn figure(
    State(state): State<AppState>,
    Query(query): Query<FigureQuery>,
) -> Result<Json<ChartSpec>, (StatusCode, String)> {
    let value = query.region.as_deref().unwrap_or(ALL_REGIONS);
    let filter = RegionFilter::parse(value, &state.config.regions).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("unknown region '{value}'"),
        )
    })?;

    let chart = render(&state.dataset, &filter);
    debug!(region = filter.value(), lines = chart.data.len(), "rendered chart");

    Ok(Json(chart))
}

fn render_page(config: &ServerConfig, figure_json: &str) -> String {
    let options: String = selector_options(&config.regions)
        .iter()
        .map(|o| {
            let checked = if o.value == ALL_REGIONS { " checked" } else { "" };
            format!(
                "    <label><input type=\"radio\" name=\"region-filter\" value=\"{}\"{}> {}</label>\n",
                escape_html(&o.value),
                checked,
                escape_html(&o.label)
            )
        })
        .collect();

    PAGE_TEMPLATE
        .replace("__TITLE__", &escape_html(&config.title))
        .replace("__HEADING__", &escape_html(&config.heading))
        .replace("__OPTIONS__", options.trim_end())
        // Region names end up inside the script block.
        .replace("__FIGURE__", &figure_json.replace("</", "<\\/"))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
