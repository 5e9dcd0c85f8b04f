//! Inventory spreadsheet reader.
//!
//! The inventory is a single-sheet xlsx file. The first row is a header;
//! every other row holds, by column:
//!
//! | 0         | 1                  | 2          | 3        | 4     |
//! |-----------|--------------------|------------|----------|-------|
//! | item code | store id (ignored) | store name | quantity | price |
use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, Result};

const ITEM_NO: usize = 0;
const OFFLINE_NAME: usize = 2;
const QUANTITY: usize = 3;
const PRICE: usize = 4;

static EMPTY: Data = Data::Empty;

/// One row of the inventory sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRow {
    /// External item code, joined against the catalog
    pub item_no: String,
    /// Store name, resolved through the store directory
    pub offline_name: String,
    /// Target stock
    pub quantity: f64,
    /// Target price
    pub price: f64,
}

/// Inventory rows grouped by item code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    by_item_no: HashMap<String, Vec<InventoryRow>>,
    rows: usize,
}

impl Inventory {
    /// Read the inventory from the bytes of an xlsx file
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a readable xlsx workbook or the
    /// workbook does not have exactly one sheet
    pub fn from_xlsx(bytes: Vec<u8>) -> Result<Self> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
        let sheets = workbook.sheet_names();
        let [sheet] = sheets.as_slice() else {
            return Err(ErrorKind::SheetCount(sheets.len()));
        };
        let range = workbook.worksheet_range(sheet)?;
        Ok(Self::from_range(&range))
    }

    /// Build the inventory from a sheet's cells, skipping the header row
    #[must_use]
    pub fn from_range(range: &Range<Data>) -> Self {
        let mut inventory = Self::default();
        for (index, cells) in range.rows().enumerate().skip(1) {
            match parse_row(cells) {
                Ok(row) => inventory.push(row),
                Err(reason) => warn!("Skipping inventory row {}: {reason}", index + 1),
            }
        }
        debug!(
            "Inventory has {} rows for {} items",
            inventory.rows,
            inventory.by_item_no.len()
        );
        inventory
    }

    fn push(&mut self, row: InventoryRow) {
        self.by_item_no
            .entry(row.item_no.clone())
            .or_default()
            .push(row);
        self.rows += 1;
    }

    /// All rows for an item code, in sheet order
    #[must_use]
    pub fn rows_for(&self, item_no: &str) -> &[InventoryRow] {
        self.by_item_no.get(item_no).map_or(&[], Vec::as_slice)
    }

    /// Number of rows
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows
    }

    /// Returns `true` if the sheet had no usable rows
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of distinct item codes
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.by_item_no.len()
    }
}

impl FromIterator<InventoryRow> for Inventory {
    fn from_iter<I: IntoIterator<Item = InventoryRow>>(rows: I) -> Self {
        let mut inventory = Self::default();
        for row in rows {
            inventory.push(row);
        }
        inventory
    }
}

fn parse_row(cells: &[Data]) -> std::result::Result<InventoryRow, String> {
    let cell = |column: usize| cells.get(column).unwrap_or(&EMPTY);
    let item_no = text(cell(ITEM_NO)).ok_or("missing item code")?;
    let offline_name = text(cell(OFFLINE_NAME)).ok_or("missing store name")?;
    let quantity = number(cell(QUANTITY))
        .ok_or_else(|| format!("quantity `{}` is not a number", cell(QUANTITY)))?;
    let price =
        number(cell(PRICE)).ok_or_else(|| format!("price `{}` is not a number", cell(PRICE)))?;

    Ok(InventoryRow {
        item_no,
        offline_name,
        quantity,
        price,
    })
}

/// Render a cell as text. Whole numbers lose their fractional part, so an
/// item code typed as `1001` does not become `1001.0`.
fn text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{f:.0}"),
        Data::Float(f) => f.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        #[allow(clippy::cast_precision_loss)]
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
