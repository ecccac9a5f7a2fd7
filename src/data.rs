use std::{fs::File, path::Path};

use polars::{
    frame::DataFrame,
    io::SerReader,
    prelude::{CsvReader, DataType, IntoLazy, col, lit},
};
use serde::{Deserialize, Serialize};

use crate::{
    config::ZeroSalesPolicy,
    error::{PricingError, Result},
    state::StateIndex,
};

pub const PRODUCT_ID: &str = "product_id";
pub const DAILY_SALES: &str = "daily_sales";
pub const STOCK_AVAILABLE: &str = "stock_available";
pub const DAYS_TO_EXPIRY: &str = "days_to_expiry";

/// One catalog row as seen by the reward model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributes {
    pub product_id: String,
    pub daily_sales: f64,
    pub stock_available: f64,
    pub days_to_expiry: f64,
}

impl ItemAttributes {
    pub fn new(
        product_id: impl Into<String>,
        daily_sales: f64,
        stock_available: f64,
        days_to_expiry: f64,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            daily_sales,
            stock_available,
            days_to_expiry,
        }
    }

    /// Reason this row cannot be fed to the reward model, if any.
    fn defect(&self) -> Option<String> {
        if !(self.daily_sales.is_finite() && self.daily_sales > 0.0) {
            return Some(format!(
                "daily_sales must be positive, got {}",
                self.daily_sales
            ));
        }
        if !self.stock_available.is_finite() {
            return Some(format!(
                "stock_available must be finite, got {}",
                self.stock_available
            ));
        }
        if !self.days_to_expiry.is_finite() {
            return Some(format!(
                "days_to_expiry must be finite, got {}",
                self.days_to_expiry
            ));
        }
        None
    }
}

/// Ordered catalog snapshot. The position of an item is its state index, so
/// training and serving must build the catalog from the same snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    items: Vec<ItemAttributes>,
}

impl Catalog {
    pub fn from_items(items: Vec<ItemAttributes>, policy: ZeroSalesPolicy) -> Result<Self> {
        let mut kept = Vec::with_capacity(items.len());
        for (row, item) in items.into_iter().enumerate() {
            match (item.defect(), policy) {
                (None, _) => kept.push(item),
                (Some(reason), ZeroSalesPolicy::Abort) => {
                    return Err(PricingError::DataQuality { row, reason });
                }
                (Some(reason), ZeroSalesPolicy::Skip) => {
                    tracing::warn!(row, product_id = %item.product_id, %reason, "skipping catalog row");
                }
            }
        }
        if kept.is_empty() {
            return Err(PricingError::EmptyCatalog);
        }
        Ok(Self { items: kept })
    }

    pub fn from_csv<P: AsRef<Path>>(path: P, policy: ZeroSalesPolicy) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let frame = CsvReader::new(file).finish()?;
        let catalog = Self::from_frame(frame, policy)?;
        tracing::info!(path = %path.display(), items = catalog.len(), "loaded catalog snapshot");
        Ok(catalog)
    }

    pub fn from_frame(mut frame: DataFrame, policy: ZeroSalesPolicy) -> Result<Self> {
        for name in [DAILY_SALES, STOCK_AVAILABLE, DAYS_TO_EXPIRY] {
            let is_float = frame
                .column(name)
                .map_err(|_| PricingError::MissingColumn(name.into()))?
                .dtype()
                .is_float();
            if is_float {
                frame = frame
                    .lazy()
                    .with_column(col(name).fill_nan(lit(0.0)))
                    .collect()?;
            }
        }

        let ids = string_column(&frame, PRODUCT_ID)?;
        let sales = numeric_column(&frame, DAILY_SALES)?;
        let stock = numeric_column(&frame, STOCK_AVAILABLE)?;
        let expiry = numeric_column(&frame, DAYS_TO_EXPIRY)?;

        let mut items = Vec::with_capacity(frame.height());
        for row in 0..frame.height() {
            let null = |name: &str| PricingError::DataQuality {
                row,
                reason: format!("{name} is null"),
            };
            // Empty numeric cells become NaN so the row policy decides their fate.
            items.push(ItemAttributes {
                product_id: ids[row].clone().ok_or_else(|| null(PRODUCT_ID))?,
                daily_sales: sales[row].unwrap_or(f64::NAN),
                stock_available: stock[row].unwrap_or(f64::NAN),
                days_to_expiry: expiry[row].unwrap_or(f64::NAN),
            });
        }
        Self::from_items(items, policy)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, state: StateIndex) -> Option<&ItemAttributes> {
        self.items.get(state)
    }

    /// State index of the first row carrying `product_id`.
    pub fn state_of(&self, product_id: &str) -> Option<StateIndex> {
        self.items
            .iter()
            .position(|item| item.product_id == product_id)
    }
}

fn numeric_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = frame
        .column(name)
        .map_err(|_| PricingError::MissingColumn(name.into()))?
        .cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

fn string_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = frame
        .column(name)
        .map_err(|_| PricingError::MissingColumn(name.into()))?
        .cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_owned))
        .collect())
}
