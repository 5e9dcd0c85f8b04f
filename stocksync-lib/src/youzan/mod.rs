//! Client for the Youzan commerce platform: catalog, store directory and
//! per-store product detail.
mod client;
mod types;

pub use client::{YouzanClient, YouzanConfig, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
pub use types::{parse_goods_detail, GoodsDetail, GoodsSku, Item, Offline, Offlines, SkuProperty};
