use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::PathBuf,
};

pub const DEFAULT_INPUT_DIR: &str = "data";
pub const DEFAULT_OUTPUT_FILE: &str = "output/processed_sales.csv";
pub const DEFAULT_TARGET_PRODUCT: &str = "pink morsel";
pub const DEFAULT_REGIONS: [&str; 4] = ["north", "east", "south", "west"];

/// Settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory scanned for `*.csv` extracts.
    pub input_dir: PathBuf,
    /// Destination of the `Sales,Date,Region` file. Overwritten on success.
    pub output_file: PathBuf,
    /// Normalized (trimmed, lower-cased) product name rows are filtered on.
    pub target_product: String,
    /// Prefix stripped from price cells before parsing.
    pub currency_symbol: char,
}

impl PipelineConfig {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_file: impl Into<PathBuf>,
        target_product: &str,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_file: output_file.into(),
            target_product: target_product.trim().to_lowercase(),
            currency_symbol: '$',
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_FILE, DEFAULT_TARGET_PRODUCT)
    }
}

/// Settings for the chart server, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub dataset_path: PathBuf,
    pub bind_addr: SocketAddr,
    /// Browser tab title.
    pub title: String,
    /// Page heading above the region selector.
    pub heading: String,
    /// Selectable regions, lower-case, in display order. `all` is always offered first.
    pub regions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DEFAULT_OUTPUT_FILE),
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8050)),
            title: "Pink Morsels Sales Visualiser".to_string(),
            heading: "Pink Morsels Sales Dashboard".to_string(),
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
        }
    }
}
