use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{dataset::Dataset, records::SalesRecord};

pub const CHART_TITLE: &str = "Pink Morsels Sales Over Time";
pub const ALL_REGIONS: &str = "all";

/// Current value of the region selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionFilter {
    All,
    /// Lower-cased region name.
    Region(String),
}

impl RegionFilter {
    /// Accepts `all` or one of `options`, ignoring case. Anything else is not a
    /// selectable value.
    pub fn parse(value: &str, options: &[String]) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case(ALL_REGIONS) {
            return Some(RegionFilter::All);
        }
        options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(value))
            .map(|o| RegionFilter::Region(o.to_lowercase()))
    }

    pub fn value(&self) -> &str {
        match self {
            RegionFilter::All => ALL_REGIONS,
            RegionFilter::Region(region) => region.as_str(),
        }
    }

    // `region` is expected lower-cased.
    fn matches(&self, region: &str) -> bool {
        match self {
            RegionFilter::All => true,
            RegionFilter::Region(selected) => region == selected,
        }
    }
}

/// A line chart in the figure layout plotly.js consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub mode: &'static str,
    pub name: String,
    pub x: Vec<NaiveDate>,
    pub y: Vec<f64>,
}

impl Trace {
    fn line(name: &str, points: &[&SalesRecord]) -> Self {
        Trace {
            kind: "scatter",
            mode: "lines",
            name: name.to_string(),
            x: points.iter().map(|p| p.date).collect(),
            y: points.iter().map(|p| p.sales).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub title: Title,
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub legend: Legend,
    pub paper_bgcolor: &'static str,
    pub plot_bgcolor: &'static str,
    pub margin: Margin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Title {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub title: Title,
    pub gridcolor: &'static str,
    pub zerolinecolor: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub title: Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Margin {
    pub l: u32,
    pub r: u32,
    pub t: u32,
    pub b: u32,
}

impl Axis {
    fn titled(text: &str) -> Self {
        Axis {
            title: Title {
                text: text.to_string(),
            },
            gridcolor: "#EBF0F8",
            zerolinecolor: "#EBF0F8",
        }
    }
}

impl Default for Layout {
    // White background with light grid lines.
    fn default() -> Self {
        Layout {
            title: Title {
                text: CHART_TITLE.to_string(),
            },
            xaxis: Axis::titled("Date"),
            yaxis: Axis::titled("Sales"),
            legend: Legend {
                title: Title {
                    text: "Region".to_string(),
                },
            },
            paper_bgcolor: "white",
            plot_bgcolor: "white",
            margin: Margin {
                l: 40,
                r: 40,
                t: 60,
                b: 40,
            },
        }
    }
}

/// Builds the chart for `filter`: one line per distinct region (compared
/// without case) left after filtering, ordered by region name, points in date
/// order.
///
/// Pure: the dataset is only read, and an empty selection gives a chart with no
/// lines.
pub fn render(dataset: &Dataset, filter: &RegionFilter) -> ChartSpec {
    let mut lines: BTreeMap<String, Vec<&SalesRecord>> = BTreeMap::new();
    for record in dataset.records() {
        let region = record.region.to_lowercase();
        if filter.matches(&region) {
            lines.entry(region).or_default().push(record);
        }
    }

    let data = lines
        .into_iter()
        .map(|(region, mut points)| {
            points.sort_by_key(|p| p.date);
            Trace::line(&region, &points)
        })
        .collect();

    ChartSpec {
        data,
        layout: Layout::default(),
    }
}
