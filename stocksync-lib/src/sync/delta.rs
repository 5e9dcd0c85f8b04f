//! Comparison of platform product details against the inventory sheet.
use log::{debug, error};
use serde::Serialize;
use thiserror::Error;

use super::plan::SkuContext;
use crate::spreadsheet::InventoryRow;
use crate::youzan::{parse_goods_detail, GoodsDetail};
use crate::{ErrorKind, Task, TaskId};

/// A product whose first SKU cannot be compared with the sheet
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SkuMismatch {
    /// The product has no SKU at this store
    #[error("Product `{0}` has no SKU")]
    NoSku(String),

    /// The first SKU's code differs from the product's code
    #[error("First SKU of product `{0}` does not carry the product code")]
    FirstSkuCode(String),
}

/// Decide whether the platform needs the sheet's price and quantity.
///
/// Only the first SKU is compared, and it must carry the product code.
///
/// # Errors
///
/// Returns an error if the product has no SKU or its first SKU carries a
/// different code
#[allow(clippy::float_cmp)]
pub fn needs_update(row: &InventoryRow, detail: &GoodsDetail) -> Result<bool, SkuMismatch> {
    let Some(sku) = detail.skus.first() else {
        return Err(SkuMismatch::NoSku(detail.title.clone()));
    };
    if sku.outer_id != detail.outer_id {
        return Err(SkuMismatch::FirstSkuCode(detail.title.clone()));
    }
    Ok(sku.price != row.price || sku.quantity != row.quantity)
}

/// One SKU of a [`GoodUpdated`] record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoodUpdatedSku {
    pub id: i64,
    pub k: String,
    pub v: String,
    pub price: f64,
    pub quantity: f64,
    pub to_price: f64,
    pub to_quantity: f64,
}

/// A product at a store whose price or quantity differ from the sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoodUpdated {
    pub offline_id: i64,
    pub offline_name: String,
    pub item_id: i64,
    pub item_title: String,
    pub item_no: String,
    pub skus: Vec<GoodUpdatedSku>,
}

impl GoodUpdated {
    fn new(context: &SkuContext, detail: &GoodsDetail) -> Self {
        let row = &context.row;
        let skus = detail
            .skus
            .iter()
            .filter_map(|sku| {
                let properties = match sku.properties() {
                    Ok(properties) => properties,
                    Err(e) => {
                        error!("Cannot decode properties of SKU {}: {e}", sku.sku_id);
                        return None;
                    }
                };
                let [property] = properties.as_slice() else {
                    error!(
                        "SKU {} of product {} ({}) has {} properties, expected one",
                        sku.sku_id,
                        detail.num_iid,
                        detail.title,
                        properties.len()
                    );
                    return None;
                };
                Some(GoodUpdatedSku {
                    id: sku.sku_id,
                    k: property.k.clone(),
                    v: property.v.clone(),
                    price: sku.price,
                    quantity: sku.quantity,
                    to_price: row.price,
                    to_quantity: row.quantity,
                })
            })
            .collect();

        Self {
            offline_id: context.offline_id,
            offline_name: row.offline_name.clone(),
            item_id: detail.num_iid,
            item_title: detail.title.clone(),
            item_no: detail.outer_id.clone(),
            skus,
        }
    }
}

/// A task that produced no usable product detail
#[derive(Debug, PartialEq, Serialize)]
pub struct FailedTask {
    pub task_id: TaskId,
    pub item_no: String,
    pub offline_name: String,
    pub error: ErrorKind,
}

/// A record of the sync stream
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SyncRecord {
    /// Price or quantity must be updated
    Updated(GoodUpdated),
    /// The detail could not be fetched or decoded
    Failed(FailedTask),
}

/// Turn a completed detail task into a stream record.
///
/// Products that are up to date, and products whose SKUs cannot be
/// compared, yield no record.
pub fn transform(task: Task<SkuContext>) -> Option<SyncRecord> {
    let (task_id, context, outcome) = task.into_outcome();
    let detail = match outcome.and_then(|body| parse_goods_detail(&body)) {
        Ok(detail) => detail,
        Err(error) => {
            error!("No product detail for task {task_id}: {error}");
            return Some(SyncRecord::Failed(FailedTask {
                task_id,
                item_no: context.row.item_no,
                offline_name: context.row.offline_name,
                error,
            }));
        }
    };

    match needs_update(&context.row, &detail) {
        Ok(true) => Some(SyncRecord::Updated(GoodUpdated::new(&context, &detail))),
        Ok(false) => {
            debug!("Task {task_id} is up to date");
            None
        }
        Err(e) => {
            error!("Cannot compare task {task_id}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::test_utils::fake_task;
    use crate::youzan::GoodsSku;

    fn row(quantity: f64, price: f64) -> InventoryRow {
        InventoryRow {
            item_no: "A-1".to_string(),
            offline_name: "North".to_string(),
            quantity,
            price,
        }
    }

    fn sku(outer_id: &str, properties: &str) -> GoodsSku {
        GoodsSku {
            sku_id: 5,
            outer_id: outer_id.to_string(),
            price: 12.5,
            quantity: 3.0,
            properties_name_json: properties.to_string(),
        }
    }

    fn detail(skus: Vec<GoodsSku>) -> GoodsDetail {
        GoodsDetail {
            num_iid: 42,
            title: "Tea".to_string(),
            outer_id: "A-1".to_string(),
            skus,
        }
    }

    const ONE_PROPERTY: &str = r#"[{"k":"size","v":"L"}]"#;

    #[rstest]
    #[case(3.0, 12.5, false)]
    #[case(4.0, 12.5, true)]
    #[case(3.0, 10.0, true)]
    fn test_needs_update(#[case] quantity: f64, #[case] price: f64, #[case] expected: bool) {
        let detail = detail(vec![sku("A-1", ONE_PROPERTY)]);
        assert_eq!(needs_update(&row(quantity, price), &detail), Ok(expected));
    }

    #[test]
    fn test_uncomparable_products() {
        assert_eq!(
            needs_update(&row(1.0, 1.0), &detail(vec![])),
            Err(SkuMismatch::NoSku("Tea".to_string()))
        );
        assert_eq!(
            needs_update(&row(1.0, 1.0), &detail(vec![sku("B-2", ONE_PROPERTY)])),
            Err(SkuMismatch::FirstSkuCode("Tea".to_string()))
        );
    }

    fn completed(body: serde_json::Value) -> Task<SkuContext> {
        let mut task = fake_task(
            "42-7",
            SkuContext {
                item_id: 42,
                offline_id: 7,
                row: row(8.0, 9.5),
            },
        );
        task.complete(Ok(Bytes::from(body.to_string())));
        task
    }

    #[test]
    fn test_transform_emits_update_record() {
        let task = completed(json!({"response": {"item": {
            "num_iid": 42, "title": "Tea", "outer_id": "A-1",
            "skus": [
                {"sku_id": 5, "outer_id": "A-1", "price": "12.50", "quantity": "3",
                 "properties_name_json": ONE_PROPERTY},
                {"sku_id": 6, "outer_id": "A-1", "price": "12.50", "quantity": "3",
                 "properties_name_json": r#"[{"k":"size","v":"L"},{"k":"color","v":"red"}]"#}
            ]
        }}}));

        let record = transform(task).unwrap();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "offline_id": 7,
                "offline_name": "North",
                "item_id": 42,
                "item_title": "Tea",
                "item_no": "A-1",
                "skus": [{
                    "id": 5, "k": "size", "v": "L",
                    "price": 12.5, "quantity": 3.0,
                    "to_price": 9.5, "to_quantity": 8.0
                }]
            })
        );
    }

    #[test]
    fn test_transform_skips_up_to_date_products() {
        let task = completed(json!({"response": {"item": {
            "num_iid": 42, "title": "Tea", "outer_id": "A-1",
            "skus": [{"sku_id": 5, "outer_id": "A-1", "price": 9.5, "quantity": 8,
                      "properties_name_json": ONE_PROPERTY}]
        }}}));
        assert_eq!(transform(task), None);
    }

    #[test]
    fn test_transform_reports_failures() {
        let upstream = completed(json!({"error_response": {"code": 40010, "msg": "bad token"}}));
        let Some(SyncRecord::Failed(failed)) = transform(upstream) else {
            panic!("expected a failed record");
        };
        assert_eq!(failed.task_id.as_str(), "42-7");
        assert_eq!(failed.item_no, "A-1");

        let mut rejected = fake_task(
            "42-7",
            SkuContext {
                item_id: 42,
                offline_id: 7,
                row: row(8.0, 9.5),
            },
        );
        rejected.complete(Err(ErrorKind::RejectedStatus(StatusCode::TOO_MANY_REQUESTS)));
        assert_eq!(
            serde_json::to_value(transform(rejected).unwrap()).unwrap(),
            json!({
                "task_id": "42-7",
                "item_no": "A-1",
                "offline_name": "North",
                "error": "Request rejected by remote service with status 429 Too Many Requests"
            })
        );
    }
}
