use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::{ErrorKind, Result};

/// A catalog item, on sale or in the warehouse
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Item {
    /// Platform item identifier
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub item_id: i64,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// External item code, the join key against the spreadsheet.
    /// Empty for items that were never given one.
    #[serde(default)]
    pub item_no: String,
}

/// A physical store
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Offline {
    /// Store identifier
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: i64,
    /// Store name as shown to operators
    #[serde(default)]
    pub name: String,
}

/// The store directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Offlines(Vec<Offline>);

impl Offlines {
    /// Resolve a store name to its identifier.
    ///
    /// Names match regardless of letter case and whitespace, so
    /// `" North  Store"` finds `"north store"`.
    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<i64> {
        let wanted = normalize(name);
        self.0
            .iter()
            .find(|offline| normalize(&offline.name) == wanted)
            .map(|offline| offline.id)
    }

    /// Number of known stores
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no store is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Offline>> for Offlines {
    fn from(offlines: Vec<Offline>) -> Self {
        Self(offlines)
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Per-store product detail
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoodsDetail {
    /// Item identifier
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub num_iid: i64,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// External item code
    #[serde(default)]
    pub outer_id: String,
    /// Stock keeping units of the item at this store
    #[serde(default)]
    pub skus: Vec<GoodsSku>,
}

/// One stock keeping unit of a [`GoodsDetail`]
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoodsSku {
    /// SKU identifier
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub sku_id: i64,
    /// External code of the SKU
    #[serde(default)]
    pub outer_id: String,
    /// Price at this store
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub price: f64,
    /// Stock at this store
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub quantity: f64,
    /// JSON-encoded list of [`SkuProperty`]
    #[serde(default)]
    pub properties_name_json: String,
}

impl GoodsSku {
    /// Decode the SKU's property list
    ///
    /// # Errors
    ///
    /// Returns an error if `properties_name_json` is not a JSON list of
    /// properties
    pub fn properties(&self) -> Result<Vec<SkuProperty>> {
        if self.properties_name_json.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&self.properties_name_json)?)
    }
}

/// A named SKU property, e.g. `k = "color"`, `v = "red"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SkuProperty {
    /// Property name
    pub k: String,
    /// Property value
    pub v: String,
}

/// One page of a catalog listing
#[derive(Debug, Deserialize)]
pub(crate) struct ItemsPage {
    #[serde(default)]
    pub(crate) items: Vec<Item>,
}

/// One page of the store directory
#[derive(Debug, Deserialize)]
pub(crate) struct OfflinesPage {
    #[serde(default)]
    pub(crate) list: Vec<Offline>,
}

/// Payload of the per-store product detail call
#[derive(Debug, Deserialize)]
pub(crate) struct GoodsDetailPage {
    pub(crate) item: Option<GoodsDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Every platform answer is either `{"response": ..}` or
/// `{"error_response": {"code": .., "msg": ..}}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error_response: Option<ErrorResponse>,
}

/// Decode a platform response body
///
/// # Errors
///
/// Returns [`ErrorKind::Upstream`] for error payloads,
/// [`ErrorKind::MissingPayload`] if there is no `response`, and
/// [`ErrorKind::ParseJson`] if the body has an unexpected shape
pub(crate) fn parse_response<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(body)?;
    if let Some(e) = envelope.error_response {
        return Err(ErrorKind::Upstream {
            code: e.code,
            message: e.msg,
        });
    }
    envelope.response.ok_or(ErrorKind::MissingPayload)
}

/// Decode a per-store product detail body
///
/// # Errors
///
/// Fails like [`parse_response`], and with [`ErrorKind::MissingPayload`]
/// if the response has no item
pub fn parse_goods_detail(body: &[u8]) -> Result<GoodsDetail> {
    parse_response::<GoodsDetailPage>(body)?
        .item
        .ok_or(ErrorKind::MissingPayload)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn offlines() -> Offlines {
        Offlines::from(vec![
            Offline {
                id: 7,
                name: "North Store".to_string(),
            },
            Offline {
                id: 9,
                name: "南京 西路店".to_string(),
            },
        ])
    }

    #[rstest]
    #[case("North Store", Some(7))]
    #[case("  north   store ", Some(7))]
    #[case("NORTHSTORE", Some(7))]
    #[case("南京西路店", Some(9))]
    #[case("South Store", None)]
    #[case("", None)]
    fn test_id_by_name(#[case] name: &str, #[case] expected: Option<i64>) {
        assert_eq!(offlines().id_by_name(name), expected);
    }

    #[test]
    fn test_goods_detail_accepts_strings_and_numbers() {
        let body = br#"{"response":{"item":{
            "num_iid":"42","title":"Tea","outer_id":"A-1",
            "skus":[{"sku_id":5,"outer_id":"A-1","price":"12.50","quantity":3,
                     "properties_name_json":"[{\"k\":\"size\",\"v\":\"L\",\"kid\":1}]"}]
        }}}"#;
        let detail = parse_goods_detail(body).unwrap();

        assert_eq!(detail.num_iid, 42);
        assert_eq!(detail.skus[0].price, 12.5);
        assert_eq!(detail.skus[0].quantity, 3.0);
        assert_eq!(
            detail.skus[0].properties().unwrap(),
            vec![SkuProperty {
                k: "size".to_string(),
                v: "L".to_string()
            }]
        );
    }

    #[test]
    fn test_error_envelope_is_upstream_error() {
        let body = br#"{"error_response":{"code":40010,"msg":"invalid token"}}"#;
        assert_eq!(
            parse_goods_detail(body).unwrap_err(),
            ErrorKind::Upstream {
                code: 40010,
                message: "invalid token".to_string()
            }
        );
    }

    #[rstest]
    #[case(br#"{"response":{}}"#)]
    #[case(br#"{}"#)]
    fn test_missing_payload(#[case] body: &[u8]) {
        assert_eq!(
            parse_goods_detail(body).unwrap_err(),
            ErrorKind::MissingPayload
        );
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            parse_goods_detail(b"<html>").unwrap_err(),
            ErrorKind::ParseJson(_)
        ));
    }
}
