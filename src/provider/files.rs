//! CSV tables on the local filesystem
//!
//! Reads the persisted market data tables from one directory and writes the
//! prediction table back out. Columns are located by header name.

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::MarketDataProvider;
use crate::config::InputConfig;
use crate::domain::{
    ForecastProduct, ForecastTables, HistoricalTables, PredictionRow, RawGenerationReading,
    RawHourlyForecast, RawHourlyLoad, RawSettlementPrice,
};
use crate::error::{ForecastError, Result};

const GENERATION_SYSTEM_WIDE: &str = "genSystemWide";
const GENERATION_ZONE_PREFIX: &str = "gen";
const FORECAST_DATE_COLUMNS: [&str; 2] = ["DeliveryDate", "DELIVERY_DATE"];
const FORECAST_HOUR_COLUMNS: [&str; 2] = ["HourEnding", "HOUR_ENDING"];
const MISSING_MARKERS: [&str; 4] = ["NA", "N/A", "null", "NaN"];

/// Accepted spellings of each product's system-wide value column
fn forecast_value_columns(product: ForecastProduct) -> &'static [&'static str] {
    match product {
        ForecastProduct::Load => &["SystemTotal"],
        ForecastProduct::Wind => &["COP_HSL_SYSTEMWIDE", "COP_HSL_SYSTEM_WIDE"],
        ForecastProduct::Solar => &["COP_HSL_SYSTEM_WIDE", "COP_HSL_SYSTEMWIDE"],
    }
}

/// A parsed CSV file with header lookup
struct Table {
    name: String,
    headers: StringRecord,
    records: Vec<StringRecord>,
}

impl Table {
    fn parse(name: &str, bytes: &[u8]) -> Result<Self> {
        let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(bytes);
        let headers = reader.headers()?.clone();
        let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            headers,
            records,
        })
    }

    /// No header and no rows: an empty upload
    fn is_blank(&self) -> bool {
        self.records.is_empty() && self.headers.iter().all(str::is_empty)
    }

    fn find(&self, candidates: &[&str]) -> Option<usize> {
        candidates
            .iter()
            .find_map(|c| self.headers.iter().position(|h| h == *c))
    }

    fn column(&self, column: &str) -> Result<usize> {
        self.find(&[column]).ok_or_else(|| ForecastError::MissingColumn {
            table: self.name.clone(),
            column: column.to_string(),
        })
    }

    fn text<'a>(&self, record: &'a StringRecord, col: usize) -> &'a str {
        record.get(col).unwrap_or("")
    }

    /// Numeric cell; blank and `NA`-style cells read as NaN (missing)
    fn float(&self, row: usize, record: &StringRecord, col: usize) -> Result<f64> {
        let raw = self.text(record, col);
        if raw.is_empty() || MISSING_MARKERS.iter().any(|m| raw.eq_ignore_ascii_case(m)) {
            return Ok(f64::NAN);
        }
        raw.parse::<f64>().map_err(|_| {
            ForecastError::invalid_record(
                &self.name,
                row,
                format!("column '{}' is not a number: '{raw}'", &self.headers[col]),
            )
        })
    }

    fn int(&self, row: usize, record: &StringRecord, col: usize) -> Result<i64> {
        let raw = self.text(record, col);
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0)
            .map(|v| v as i64)
            .ok_or_else(|| {
                ForecastError::invalid_record(
                    &self.name,
                    row,
                    format!("column '{}' is not an integer: '{raw}'", &self.headers[col]),
                )
            })
    }
}

fn parse_settlement(table: &Table) -> Result<Vec<RawSettlementPrice>> {
    if table.is_blank() {
        return Ok(Vec::new());
    }
    let date = table.column("deliveryDate")?;
    let hour = table.column("deliveryHour")?;
    let interval = table.column("deliveryInterval")?;
    let point = table.column("settlementPoint")?;
    let price = table.column("settlementPointPrice")?;

    table
        .records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            Ok(RawSettlementPrice {
                delivery_date: table.text(r, date).to_string(),
                delivery_hour: table.int(i, r, hour)?,
                delivery_interval: table.int(i, r, interval)?,
                settlement_point: table.text(r, point).to_string(),
                settlement_point_price: table.float(i, r, price)?,
            })
        })
        .collect()
}

fn parse_generation(table: &Table) -> Result<Vec<RawGenerationReading>> {
    if table.is_blank() {
        return Ok(Vec::new());
    }
    let ending = table.column("intervalEnding")?;
    let system_wide = table.column(GENERATION_SYSTEM_WIDE)?;
    let zones: Vec<(usize, String)> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with(GENERATION_ZONE_PREFIX) && *h != GENERATION_SYSTEM_WIDE)
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    table
        .records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let zone_values = zones
                .iter()
                .map(|(col, name)| Ok((name.clone(), table.float(i, r, *col)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            Ok(RawGenerationReading {
                interval_ending: table.text(r, ending).to_string(),
                system_wide: table.float(i, r, system_wide)?,
                zones: zone_values,
            })
        })
        .collect()
}

fn parse_load(table: &Table) -> Result<Vec<RawHourlyLoad>> {
    if table.is_blank() {
        return Ok(Vec::new());
    }
    let day = table.column("OperDay")?;
    let hour = table.column("HourEnding")?;
    let total = table.column("TOTAL")?;

    table
        .records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            Ok(RawHourlyLoad {
                oper_day: table.text(r, day).to_string(),
                hour_ending: table.text(r, hour).to_string(),
                total: table.float(i, r, total)?,
            })
        })
        .collect()
}

fn parse_forecast(product: ForecastProduct, table: &Table) -> Result<Vec<RawHourlyForecast>> {
    if table.is_blank() {
        return Ok(Vec::new());
    }
    let lookup = |candidates: &[&str]| {
        table.find(candidates).ok_or_else(|| ForecastError::SchemaMismatch {
            product,
            expected: candidates.join(", "),
        })
    };
    let date = lookup(&FORECAST_DATE_COLUMNS)?;
    let hour = lookup(&FORECAST_HOUR_COLUMNS)?;
    let value = lookup(forecast_value_columns(product))?;

    table
        .records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            Ok(RawHourlyForecast {
                delivery_date: table.text(r, date).to_string(),
                hour_ending: table.text(r, hour).to_string(),
                value: table.float(i, r, value)?,
            })
        })
        .collect()
}

/// Reads every input table from one directory
#[derive(Debug, Clone)]
pub struct CsvDirectoryProvider {
    config: InputConfig,
}

impl CsvDirectoryProvider {
    pub fn new(config: InputConfig) -> Self {
        Self { config }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.config.data_dir.join(file)
    }

    async fn load(&self, name: &str, file: &str) -> Result<Table> {
        let path = self.path(file);
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ForecastError::MissingTable(path.display().to_string()),
            _ => ForecastError::Io(e),
        })?;
        let table = Table::parse(name, &bytes)?;
        debug!(table = name, path = %path.display(), rows = table.records.len(), "read table");
        Ok(table)
    }
}

#[async_trait]
impl MarketDataProvider for CsvDirectoryProvider {
    async fn historical(&self) -> Result<HistoricalTables> {
        let cfg = &self.config;
        let tables = HistoricalTables {
            settlement_hubs: parse_settlement(&self.load("settlement_hubs", &cfg.settlement_hubs).await?)?,
            settlement_load_zones: parse_settlement(
                &self.load("settlement_load_zones", &cfg.settlement_load_zones).await?,
            )?,
            wind: parse_generation(&self.load("wind", &cfg.wind).await?)?,
            solar: parse_generation(&self.load("solar", &cfg.solar).await?)?,
            load: parse_load(&self.load("load", &cfg.load).await?)?,
        };
        info!(
            hubs = tables.settlement_hubs.len(),
            load_zones = tables.settlement_load_zones.len(),
            wind = tables.wind.len(),
            solar = tables.solar.len(),
            load = tables.load.len(),
            "loaded historical tables"
        );
        Ok(tables)
    }

    async fn forecasts(&self) -> Result<ForecastTables> {
        let cfg = &self.config;
        let mut tables = ForecastTables::default();
        for (product, file) in [
            (ForecastProduct::Load, &cfg.load_forecast),
            (ForecastProduct::Wind, &cfg.wind_forecast),
            (ForecastProduct::Solar, &cfg.solar_forecast),
        ] {
            let name = format!("{product}_forecast");
            let rows = parse_forecast(product, &self.load(&name, file).await?)?;
            match product {
                ForecastProduct::Load => tables.load = rows,
                ForecastProduct::Wind => tables.wind = rows,
                ForecastProduct::Solar => tables.solar = rows,
            }
        }
        info!(
            load = tables.load.len(),
            wind = tables.wind.len(),
            solar = tables.solar.len(),
            "loaded forecast tables"
        );
        Ok(tables)
    }
}

#[derive(Serialize)]
struct PredictionCsvRow<'a> {
    #[serde(rename = "settlementPoint")]
    settlement_point: &'a str,
    #[serde(rename = "deliveryDate")]
    delivery_date: String,
    #[serde(rename = "deliveryHour")]
    delivery_hour: u8,
    #[serde(rename = "deliveryInterval")]
    delivery_interval: u8,
    #[serde(rename = "settlementPointPrice")]
    settlement_point_price: f64,
}

/// Render predictions as CSV with a header row
pub fn predictions_csv(rows: &[PredictionRow]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    for row in rows {
        writer.serialize(PredictionCsvRow {
            settlement_point: &row.node,
            delivery_date: row.key.delivery_date.format("%Y-%m-%d").to_string(),
            delivery_hour: row.key.delivery_hour,
            delivery_interval: row.key.delivery_interval,
            settlement_point_price: row.settlement_point_price,
        })?;
    }
    if rows.is_empty() {
        writer.write_record([
            "settlementPoint",
            "deliveryDate",
            "deliveryHour",
            "deliveryInterval",
            "settlementPointPrice",
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| ForecastError::Io(e.into_error()))
}

pub async fn write_predictions(path: &Path, rows: &[PredictionRow]) -> Result<()> {
    let bytes = predictions_csv(rows)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    info!(path = %path.display(), rows = rows.len(), "wrote predictions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IntervalKey;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn write(dir: &TempDir, file: &str, contents: &str) {
        std::fs::write(dir.path().join(file), contents).unwrap();
    }

    fn provider(dir: &TempDir) -> CsvDirectoryProvider {
        CsvDirectoryProvider::new(InputConfig {
            data_dir: dir.path().to_path_buf(),
            ..InputConfig::default()
        })
    }

    fn seed_historical(dir: &TempDir) {
        write(
            dir,
            "spp_data_HU.csv",
            "deliveryDate,deliveryHour,deliveryInterval,settlementPoint,settlementPointPrice\n\
             2024-01-01,1,1,HB_NORTH,21.5\n\
             2024-01-01,1,2,HB_NORTH,22.0\n",
        );
        write(
            dir,
            "spp_data_LZ.csv",
            "deliveryDate,deliveryHour,deliveryInterval,settlementPoint,settlementPointPrice\n",
        );
        write(
            dir,
            "wind_data.csv",
            "intervalEnding,genSystemWide,genFarWest,genNorthWest,HSLSystemWide\n\
             2024-01-01T00:05:00,100.0,40.0,60.0,999\n",
        );
        write(dir, "solar_data.csv", "");
        write(
            dir,
            "load_data.csv",
            "OperDay,HourEnding,TOTAL\n01/01/2024,01:00,40000\n",
        );
    }

    #[tokio::test]
    async fn test_reads_historical_tables() {
        let dir = TempDir::new().unwrap();
        seed_historical(&dir);

        let tables = provider(&dir).historical().await.unwrap();
        assert_eq!(tables.settlement_hubs.len(), 2);
        assert!(tables.settlement_load_zones.is_empty());
        assert_eq!(tables.settlement_hubs[1].settlement_point_price, 22.0);
        assert_eq!(tables.wind[0].system_wide, 100.0);
        assert_eq!(
            tables.wind[0].zones.keys().collect::<Vec<_>>(),
            vec!["genFarWest", "genNorthWest"]
        );
        assert!(tables.solar.is_empty());
        assert_eq!(tables.load[0].hour_ending, "01:00");
    }

    #[tokio::test]
    async fn test_missing_file_is_missing_table() {
        let dir = TempDir::new().unwrap();
        let err = provider(&dir).historical().await.unwrap_err();
        assert!(matches!(err, ForecastError::MissingTable(_)));
    }

    #[tokio::test]
    async fn test_missing_column_fails_fast() {
        let dir = TempDir::new().unwrap();
        seed_historical(&dir);
        write(&dir, "load_data.csv", "OperDay,HourEnding\n01/01/2024,01:00\n");

        let err = provider(&dir).historical().await.unwrap_err();
        match err {
            ForecastError::MissingColumn { table, column } => {
                assert_eq!(table, "load");
                assert_eq!(column, "TOTAL");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_bad_number_is_invalid_record() {
        let dir = TempDir::new().unwrap();
        seed_historical(&dir);
        write(&dir, "load_data.csv", "OperDay,HourEnding,TOTAL\n01/01/2024,01:00,abc\n");

        let err = provider(&dir).historical().await.unwrap_err();
        assert!(matches!(err, ForecastError::InvalidRecord { row: 0, .. }));
    }

    #[tokio::test]
    async fn test_blank_and_na_cells_read_as_missing() {
        let dir = TempDir::new().unwrap();
        seed_historical(&dir);
        write(
            &dir,
            "load_data.csv",
            "OperDay,HourEnding,TOTAL\n01/01/2024,01:00,\n01/01/2024,02:00,N/A\n01/01/2024,03:00,NaN\n01/01/2024,04:00,41000\n",
        );
        write(
            &dir,
            "wind_data.csv",
            "intervalEnding,genSystemWide,genPanhandle\n2024-01-01 00:05:00,,3\n2024-01-01 00:10:00,12,null\n",
        );

        let tables = provider(&dir).historical().await.unwrap();
        let totals: Vec<f64> = tables.load.iter().map(|r| r.total).collect();
        assert_eq!(totals.len(), 4);
        assert!(totals[..3].iter().all(|v| v.is_nan()));
        assert_eq!(totals[3], 41_000.0);

        assert!(tables.wind[0].system_wide.is_nan());
        assert_eq!(tables.wind[0].zones["genPanhandle"], 3.0);
        assert_eq!(tables.wind[1].system_wide, 12.0);
        assert!(tables.wind[1].zones["genPanhandle"].is_nan());
    }

    #[tokio::test]
    async fn test_forecast_column_aliases() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "load_forecast.csv",
            "DeliveryDate,HourEnding,SystemTotal\n01/02/2024,1:00,41000\n",
        );
        write(
            &dir,
            "wind_forecast.csv",
            "DELIVERY_DATE,HOUR_ENDING,COP_HSL_SYSTEM_WIDE\n2024-01-02,1,9000\n",
        );
        write(
            &dir,
            "solar_forecast.csv",
            "DELIVERY_DATE,HOUR_ENDING,COP_HSL_SYSTEM_WIDE\n2024-01-02,13,5000\n",
        );

        let tables = provider(&dir).forecasts().await.unwrap();
        assert_eq!(tables.load[0].value, 41000.0);
        assert_eq!(tables.wind[0].value, 9000.0);
        assert_eq!(tables.solar[0].hour_ending, "13");
    }

    #[tokio::test]
    async fn test_forecast_without_value_column_is_schema_mismatch() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "load_forecast.csv",
            "DeliveryDate,HourEnding,SystemTotal\n01/02/2024,1:00,41000\n",
        );
        write(
            &dir,
            "wind_forecast.csv",
            "DELIVERY_DATE,HOUR_ENDING,STWPF_SYSTEM_WIDE\n2024-01-02,1,9000\n",
        );
        write(
            &dir,
            "solar_forecast.csv",
            "DELIVERY_DATE,HOUR_ENDING,COP_HSL_SYSTEM_WIDE\n2024-01-02,13,5000\n",
        );

        let err = provider(&dir).forecasts().await.unwrap_err();
        match err {
            ForecastError::SchemaMismatch { product, expected } => {
                assert_eq!(product, ForecastProduct::Wind);
                assert!(expected.contains("COP_HSL_SYSTEMWIDE"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_write_predictions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("predictions.csv");
        let key = IntervalKey::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 13, 3).unwrap();
        let rows = vec![PredictionRow {
            node: "HB_NORTH".into(),
            key,
            settlement_point_price: 31.25,
        }];

        write_predictions(&path, &rows).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some("settlementPoint,deliveryDate,deliveryHour,deliveryInterval,settlementPointPrice")
        );
        assert_eq!(lines.next(), Some("HB_NORTH,2024-01-02,13,3,31.25"));
    }

    #[test]
    fn test_empty_predictions_still_have_header() {
        let bytes = predictions_csv(&[]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap().trim_end(),
            "settlementPoint,deliveryDate,deliveryHour,deliveryInterval,settlementPointPrice"
        );
    }
}
