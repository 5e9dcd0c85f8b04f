use log::{debug, info, warn};
use serde::Serialize;

use crate::spreadsheet::{Inventory, InventoryRow};
use crate::youzan::{Item, Offlines, YouzanClient};
use crate::{Result, Task};

/// What a product detail task was created for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkuContext {
    /// Catalog item
    pub item_id: i64,
    /// Store the detail is fetched for
    pub offline_id: i64,
    /// Spreadsheet row holding the target price and quantity
    pub row: InventoryRow,
}

/// Cross-reference catalog, store directory and inventory into one product
/// detail task per (item, store) pair.
///
/// Items without a code, codes the sheet does not list and store names the
/// directory does not know are skipped.
///
/// # Errors
///
/// Returns an error if a detail endpoint cannot be built
pub fn plan(
    client: &YouzanClient,
    items: &[Item],
    offlines: &Offlines,
    inventory: &Inventory,
) -> Result<Vec<Task<SkuContext>>> {
    let mut tasks = Vec::new();
    for item in items {
        if item.item_no.is_empty() {
            debug!("Item {} ({}) has no item code", item.item_id, item.title);
            continue;
        }
        let rows = inventory.rows_for(&item.item_no);
        if rows.is_empty() {
            debug!("Item code {} ({}) is not in the inventory", item.item_no, item.title);
            continue;
        }
        for row in rows {
            let Some(offline_id) = offlines.id_by_name(&row.offline_name) else {
                warn!("Unknown store `{}` for item code {}", row.offline_name, row.item_no);
                continue;
            };
            tasks.push(Task::new(
                format!("{}-{offline_id}", item.item_id),
                client.sku_endpoint(item.item_id, offline_id)?,
                SkuContext {
                    item_id: item.item_id,
                    offline_id,
                    row: row.clone(),
                },
            ));
        }
    }
    info!(
        "Planned {} detail requests for {} catalog items",
        tasks.len(),
        items.len()
    );
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::youzan::{Offline, YouzanConfig};

    fn item(item_id: i64, item_no: &str) -> Item {
        Item {
            item_id,
            title: format!("item {item_id}"),
            item_no: item_no.to_string(),
        }
    }

    fn row(item_no: &str, offline_name: &str) -> InventoryRow {
        InventoryRow {
            item_no: item_no.to_string(),
            offline_name: offline_name.to_string(),
            quantity: 1.0,
            price: 2.0,
        }
    }

    #[test]
    fn test_plan_cross_references_items_rows_and_stores() {
        let client =
            YouzanClient::new(YouzanConfig::builder().access_token("t".to_string()).build())
                .unwrap();
        let items = vec![
            item(1, "A-1"),
            item(2, ""),
            item(3, "NOT-IN-SHEET"),
            item(4, "A-4"),
        ];
        let offlines = Offlines::from(vec![
            Offline {
                id: 7,
                name: "North".to_string(),
            },
            Offline {
                id: 9,
                name: "South".to_string(),
            },
        ]);
        let inventory: Inventory = vec![
            row("A-1", "North"),
            row("A-1", " south "),
            row("A-1", "Atlantis"),
            row("A-4", "North"),
        ]
        .into_iter()
        .collect();

        let tasks = plan(&client, &items, &offlines, &inventory).unwrap();
        let ids: Vec<_> = tasks.iter().map(|task| task.id().as_str()).collect();
        assert_eq!(ids, vec!["1-7", "1-9", "4-7"]);

        let second = &tasks[1];
        assert_eq!(second.context().offline_id, 9);
        assert_eq!(second.context().row.offline_name, " south ");
        assert_eq!(second.endpoint().params()["num_iid"], "1");
        assert_eq!(second.endpoint().params()["offline_id"], "9");
    }
}
