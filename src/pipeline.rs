use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use tracing::{debug, info, trace};

use crate::{
    config::PipelineConfig,
    error::PipelineError,
    records::{
        normalize_product, parse_date, parse_price, parse_quantity, read_csv, RawRecord,
        RawTable, SalesRecord, REQUIRED_COLUMNS, SALES_COLUMNS,
    },
};

const CSV_EXTENSION: &str = "csv";

/// Every extract concatenated in file order, with the union of their columns.
#[derive(Debug)]
pub struct CombinedDataset {
    pub columns: BTreeSet<String>,
    pub tables: Vec<RawTable>,
}

impl CombinedDataset {
    pub fn rows(&self) -> impl Iterator<Item = (&Path, &RawRecord)> {
        self.tables
            .iter()
            .flat_map(|t| t.records.iter().map(move |r| (t.path.as_path(), r)))
    }

    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.records.len()).sum()
    }
}

/// A target-product row with every field coerced and `sales` derived.
#[derive(Debug, PartialEq, Clone)]
pub struct CleanedRecord {
    pub product: String,
    pub quantity: f64,
    pub price: f64,
    pub sales: f64,
    pub date: NaiveDate,
    pub region: String,
}

impl CleanedRecord {
    pub fn from_raw(
        file: &Path,
        raw: &RawRecord,
        currency_symbol: char,
    ) -> Result<Self, PipelineError> {
        let coercion = |column: &'static str, value: &str, reason: String| {
            PipelineError::TypeCoercion {
                file: file.to_path_buf(),
                line: raw.line,
                column,
                value: value.to_string(),
                reason,
            }
        };

        let price_raw = raw.price.as_deref().unwrap_or_default();
        let price =
            parse_price(price_raw, currency_symbol).map_err(|e| coercion("price", price_raw, e))?;

        let quantity_raw = raw.quantity.as_deref().unwrap_or_default();
        let quantity =
            parse_quantity(quantity_raw).map_err(|e| coercion("quantity", quantity_raw, e))?;

        let date_raw = raw.date.as_deref().unwrap_or_default();
        let date = parse_date(date_raw).map_err(|e| coercion("date", date_raw, e))?;

        let region = raw.region.as_deref().unwrap_or_default().trim();
        if region.is_empty() {
            return Err(coercion("region", region, "region is empty".to_string()));
        }

        let sales = quantity * price;
        if !sales.is_finite() {
            return Err(coercion(
                "sales",
                &format!("{quantity_raw} x {price_raw}"),
                "sales is not a finite number".to_string(),
            ));
        }

        Ok(CleanedRecord {
            product: normalize_product(raw.product.as_deref().unwrap_or_default()),
            quantity,
            price,
            sales,
            date,
            region: region.to_string(),
        })
    }
}

impl From<&CleanedRecord> for SalesRecord {
    fn from(record: &CleanedRecord) -> Self {
        SalesRecord {
            sales: record.sales,
            date: record.date,
            region: record.region.clone(),
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, PartialEq)]
pub struct PipelineReport {
    pub files: usize,
    pub combined_rows: usize,
    pub matched_rows: usize,
    pub output: PathBuf,
}

/// Runs every stage in order. Nothing is written unless all stages succeed.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let files = discover_inputs(&config.input_dir)?;
    info!(count = files.len(), dir = %config.input_dir.display(), "found CSV files");

    let combined = load_and_concat(&files)?;
    info!(rows = combined.len(), columns = combined.columns.len(), "combined extracts");

    validate_schema(&combined.columns)?;

    let matched = filter_product(&combined, &config.target_product)?;
    info!(rows = matched.len(), product = %config.target_product, "matched target product");

    let cleaned = clean(&matched, config.currency_symbol)?;
    let output: Vec<SalesRecord> = cleaned.iter().map(SalesRecord::from).collect();

    persist(&config.output_file, &output)?;
    info!(path = %config.output_file.display(), rows = output.len(), "output saved");

    Ok(PipelineReport {
        files: files.len(),
        combined_rows: combined.len(),
        matched_rows: output.len(),
        output: config.output_file.clone(),
    })
}

/// Lists `*.csv` files in `dir`, sorted by name. A missing directory counts as no input.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let io_err = |source: io::Error| PipelineError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PipelineError::NoInputData {
                dir: dir.to_path_buf(),
            })
        }
        Err(e) => return Err(io_err(e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_err)?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CSV_EXTENSION));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(PipelineError::NoInputData {
            dir: dir.to_path_buf(),
        });
    }

    files.sort();
    Ok(files)
}

pub fn load_and_concat(files: &[PathBuf]) -> Result<CombinedDataset, PipelineError> {
    let mut columns = BTreeSet::new();
    let mut tables = Vec::with_capacity(files.len());

    for file in files {
        let table = read_csv(file)?;
        info!(
            file = %file.display(),
            rows = table.records.len(),
            columns = ?table.columns,
            "loaded extract"
        );
        columns.extend(table.columns.iter().cloned());
        tables.push(table);
    }

    Ok(CombinedDataset { columns, tables })
}

/// Fails with the required columns absent from `columns`, in canonical order.
pub fn validate_schema(columns: &BTreeSet<String>) -> Result<(), PipelineError> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !columns.contains(**c))
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingColumns { columns: missing })
    }
}

pub fn filter_product<'a>(
    combined: &'a CombinedDataset,
    target: &str,
) -> Result<Vec<(&'a Path, &'a RawRecord)>, PipelineError> {
    let products: BTreeSet<String> = combined
        .rows()
        .filter_map(|(_, r)| r.product.as_deref().map(normalize_product))
        .collect();
    debug!(?products, "distinct products");

    let matched: Vec<_> = combined
        .rows()
        .filter(|(_, r)| {
            r.product
                .as_deref()
                .is_some_and(|p| normalize_product(p) == target)
        })
        .collect();

    if matched.is_empty() {
        return Err(PipelineError::NoMatchingProduct {
            product: target.to_string(),
        });
    }

    Ok(matched)
}

/// Coerces every matched row. The first failure aborts the whole run.
pub fn clean(
    rows: &[(&Path, &RawRecord)],
    currency_symbol: char,
) -> Result<Vec<CleanedRecord>, PipelineError> {
    rows.iter()
        .map(|(file, raw)| -> Result<CleanedRecord, PipelineError> {
            let record = CleanedRecord::from_raw(file, raw, currency_symbol)?;
            trace!(
                product = %record.product,
                quantity = record.quantity,
                price = record.price,
                sales = record.sales,
                "cleaned row"
            );
            Ok(record)
        })
        .collect()
}

/// Writes `records` through a temporary sibling file renamed over `path`.
pub fn persist(path: &Path, records: &[SalesRecord]) -> Result<(), PipelineError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let io_err = |source: io::Error| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(parent).map_err(io_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut tmp);
        wtr.write_record(SALES_COLUMNS).map_err(csv_err)?;
        for record in records {
            wtr.serialize(record).map_err(csv_err)?;
        }
        wtr.flush().map_err(io_err)?;
    }
    tmp.as_file_mut().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_input(dir: &TempDir, name: &str, contents: &str) {
        let mut file = fs::File::create(dir.path().join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    fn config_for(dir: &TempDir) -> PipelineConfig {
        PipelineConfig::new(
            dir.path(),
            dir.path().join("output").join("processed_sales.csv"),
            "Pink Morsel",
        )
    }

    fn read_output(path: &Path) -> Vec<SalesRecord> {
        csv::Reader::from_path(path)
            .unwrap()
            .deserialize()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn single_matching_row_scenario() {
        let dir = tempfile::tempdir().unwrap();
        write_input(
            &dir,
            "sales.csv",
            "product,quantity,price,date,region\n\
             Pink Morsel,2,$3.00,2021-01-01,north\n\
             Other,5,$1.00,2021-01-01,north\n",
        );
        let config = config_for(&dir);

        let report = run(&config).unwrap();

        assert_eq!(report.matched_rows, 1);
        assert_eq!(
            fs::read_to_string(&config.output_file).unwrap(),
            "Sales,Date,Region\n6.0,2021-01-01,north\n"
        );
    }

    #[test]
    fn test_process_fixture_directory() {
        let out = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(
            "test-inputs/data",
            out.path().join("processed_sales.csv"),
            "pink morsel",
        );

        let report = run(&config).unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.combined_rows, 7);
        assert_eq!(report.matched_rows, 5);
        assert_eq!(
            fs::read_to_string(&config.output_file).unwrap(),
            fs::read_to_string("test-inputs/processed_sales.csv").unwrap()
        );
    }

    #[test]
    fn rerun_produces_identical_bytes() {
        let out = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(
            "test-inputs/data",
            out.path().join("nested").join("processed_sales.csv"),
            "pink morsel",
        );

        run(&config).unwrap();
        let first = fs::read(&config.output_file).unwrap();
        run(&config).unwrap();
        let second = fs::read(&config.output_file).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn sales_is_quantity_times_price() {
        let dir = tempfile::tempdir().unwrap();
        write_input(
            &dir,
            "a.csv",
            "product,quantity,price,date,region\n\
             pink morsel,3,$0.10,2021-01-01,east\n\
             pink morsel,1.5,$0.33,2021-01-02,east\n\
             pink morsel,7,2.25,2021-01-03,west\n",
        );
        let config = config_for(&dir);

        run(&config).unwrap();
        let rows = read_output(&config.output_file);

        let expected = [3.0 * 0.10, 1.5 * 0.33, 7.0 * 2.25];
        assert_eq!(rows.len(), expected.len());
        for (row, sales) in rows.iter().zip(expected) {
            assert!((row.sales - sales).abs() < 1e-12);
        }
    }

    #[test]
    fn header_casing_unifies_across_files() {
        let dir = tempfile::tempdir().unwrap();
        write_input(
            &dir,
            "a.csv",
            "Product,Quantity,Price,Date,Region\npink morsel,1,$1.00,2021-01-01,north\n",
        );
        write_input(
            &dir,
            "b.csv",
            "PRODUCT,QUANTITY,PRICE,DATE,REGION\npink morsel,2,$1.00,2021-01-02,south\n",
        );
        let config = config_for(&dir);

        run(&config).unwrap();
        let rows = read_output(&config.output_file);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].region, "north");
        assert_eq!(rows[1].region, "south");
    }

    #[test]
    fn empty_directory_is_no_input() {
        let dir = tempfile::tempdir().unwrap();
        write_input(&dir, "notes.txt", "not a csv");
        let config = config_for(&dir);

        let result = run(&config);

        assert!(matches!(result, Err(PipelineError::NoInputData { .. })));
        assert!(!config.output_file.exists());
    }

    #[test]
    fn missing_directory_is_no_input() {
        let result = discover_inputs(Path::new("test-inputs/no_such_dir"));
        assert!(matches!(result, Err(PipelineError::NoInputData { .. })));
    }

    #[test]
    fn each_missing_column_is_named() {
        for dropped in REQUIRED_COLUMNS {
            let dir = tempfile::tempdir().unwrap();
            let header: Vec<&str> = REQUIRED_COLUMNS
                .iter()
                .copied()
                .filter(|c| *c != dropped)
                .collect();
            write_input(&dir, "a.csv", &format!("{}\n", header.join(",")));
            let config = config_for(&dir);

            match run(&config) {
                Err(PipelineError::MissingColumns { columns }) => {
                    assert_eq!(columns, vec![dropped.to_string()])
                }
                other => panic!("expected MissingColumns for {dropped}, got {other:?}"),
            }
            assert!(!config.output_file.exists());
        }
    }

    #[test]
    fn no_target_rows_is_an_error_not_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        write_input(
            &dir,
            "a.csv",
            "product,quantity,price,date,region\ngold morsel,1,$1.00,2021-01-01,north\n",
        );
        let config = config_for(&dir);

        let result = run(&config);

        assert!(matches!(
            result,
            Err(PipelineError::NoMatchingProduct { ref product }) if product == "pink morsel"
        ));
        assert!(!config.output_file.exists());
    }

    #[test]
    fn bad_price_aborts_and_names_the_row() {
        let dir = tempfile::tempdir().unwrap();
        write_input(
            &dir,
            "a.csv",
            "product,quantity,price,date,region\n\
             pink morsel,1,$1.00,2021-01-01,north\n\
             pink morsel,1,$abc,2021-01-01,north\n",
        );
        let config = config_for(&dir);

        match run(&config) {
            Err(PipelineError::TypeCoercion {
                file,
                line,
                column,
                value,
                ..
            }) => {
                assert_eq!(file, dir.path().join("a.csv"));
                assert_eq!(line, 3);
                assert_eq!(column, "price");
                assert_eq!(value, "$abc");
            }
            other => panic!("expected TypeCoercion, got {other:?}"),
        }
        assert!(!config.output_file.exists());
    }

    #[test]
    fn bad_quantity_aborts() {
        let dir = tempfile::tempdir().unwrap();
        write_input(
            &dir,
            "a.csv",
            "product,quantity,price,date,region\npink morsel,lots,$1.00,2021-01-01,north\n",
        );

        let result = run(&config_for(&dir));

        assert!(matches!(
            result,
            Err(PipelineError::TypeCoercion { column: "quantity", .. })
        ));
    }

    #[test]
    fn overflowing_sales_aborts_without_output() {
        let dir = tempfile::tempdir().unwrap();
        write_input(
            &dir,
            "a.csv",
            "product,quantity,price,date,region\npink morsel,1e300,$1e10,2021-01-01,north\n",
        );
        let config = config_for(&dir);

        match run(&config) {
            Err(PipelineError::TypeCoercion {
                column, line, value, ..
            }) => {
                assert_eq!(column, "sales");
                assert_eq!(line, 2);
                assert_eq!(value, "1e300 x $1e10");
            }
            other => panic!("expected TypeCoercion, got {other:?}"),
        }
        assert!(!config.output_file.exists());
    }

    #[test]
    fn missing_columns_follow_required_order() {
        let columns: BTreeSet<String> = ["region", "quantity", "price"]
            .iter()
            .map(|c| c.to_string())
            .collect();

        match validate_schema(&columns) {
            Err(PipelineError::MissingColumns { columns }) => {
                assert_eq!(columns, vec!["product".to_string(), "date".to_string()])
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn malformed_non_target_rows_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_input(
            &dir,
            "a.csv",
            "product,quantity,price,date,region\n\
             gold morsel,lots,$abc,someday,north\n\
             pink morsel,1,$2.00,2021-01-01,north\n",
        );
        let config = config_for(&dir);

        let report = run(&config).unwrap();

        assert_eq!(report.matched_rows, 1);
    }

    #[test]
    fn failed_run_keeps_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir);
        fs::create_dir_all(config.output_file.parent().unwrap()).unwrap();
        fs::write(&config.output_file, "previous").unwrap();
        write_input(
            &dir,
            "a.csv",
            "product,quantity,price,date,region\npink morsel,1,$x,2021-01-01,north\n",
        );

        assert!(run(&config).is_err());
        assert_eq!(fs::read_to_string(&config.output_file).unwrap(), "previous");
    }

    #[test]
    fn persist_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale").unwrap();
        let record = SalesRecord {
            sales: 1.5,
            date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            region: "west".to_string(),
        };

        persist(&path, &[record]).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Sales,Date,Region\n1.5,2020-05-01,west\n"
        );
    }
}
