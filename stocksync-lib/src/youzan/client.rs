use std::time::Duration;

use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use typed_builder::TypedBuilder;
use url::Url;

use super::types::{parse_response, Item, ItemsPage, Offline, Offlines, OfflinesPage};
use crate::transport::{build_client, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::{Endpoint, ErrorKind, HttpTransport, Result, Transport};

/// Default address of the platform's OAuth entry point
pub const DEFAULT_BASE_URL: &str = "https://open.youzan.com/api/oauthentry";

/// Default number of records requested per listing page
pub const DEFAULT_PAGE_SIZE: usize = 100;

const API_VERSION: &str = "3.0.0";
const ITEMS_ON_SALE: &str = "youzan.items.onsale";
const ITEMS_IN_WAREHOUSE: &str = "youzan.items.inventory";
const OFFLINES: &str = "youzan.multistore.offline.search";
const GOODS_SKU: &str = "youzan.multistore.goods.sku";

/// Connection settings for the commerce platform
#[derive(Debug, Clone, Deserialize, TypedBuilder)]
#[serde(deny_unknown_fields)]
pub struct YouzanConfig {
    /// Base address; API names are appended as path segments
    #[serde(default = "default_base_url")]
    #[builder(default = default_base_url())]
    pub base_url: Url,

    /// OAuth access token sent with every call
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub access_token: Option<SecretString>,

    /// Records per page when listing items or stores
    #[serde(default = "default_page_size")]
    #[builder(default = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Timeout of a single listing call
    #[serde(default = "default_timeout", with = "humantime_serde")]
    #[builder(default = default_timeout())]
    pub timeout: Duration,
}

impl Default for YouzanConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("DEFAULT_BASE_URL is a valid URL")
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

const fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

/// Client for the catalog, store directory and product detail calls
#[derive(Debug, Clone)]
pub struct YouzanClient {
    transport: HttpTransport,
    base_url: Url,
    access_token: SecretString,
    page_size: usize,
}

impl YouzanClient {
    /// Create a client from its configuration
    ///
    /// # Errors
    ///
    /// Returns an error if no access token is configured or the HTTP client
    /// cannot be built
    pub fn new(config: YouzanConfig) -> Result<Self> {
        let client = build_client(config.timeout, DEFAULT_USER_AGENT)?;
        Self::with_client(config, client)
    }

    /// Create a client on top of an existing `reqwest` client
    ///
    /// # Errors
    ///
    /// Returns an error if no access token is configured
    pub fn with_client(config: YouzanConfig, client: reqwest::Client) -> Result<Self> {
        let access_token = match config.access_token {
            Some(token) if !token.expose_secret().trim().is_empty() => token,
            _ => return Err(ErrorKind::MissingAccessToken),
        };
        if config.page_size == 0 {
            return Err(ErrorKind::InvalidCapacity { name: "page_size" });
        }
        Ok(Self {
            transport: HttpTransport::with_client(client),
            base_url: config.base_url,
            access_token,
            page_size: config.page_size,
        })
    }

    /// A transport sharing this client's connection pool
    #[must_use]
    pub fn transport(&self) -> HttpTransport {
        self.transport.clone()
    }

    /// Authenticated `GET` endpoint for the given API
    fn endpoint(&self, api: &str) -> Result<Endpoint> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ErrorKind::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend([api, API_VERSION, "get"]);
        Ok(Endpoint::get(url).param("access_token", self.access_token.expose_secret()))
    }

    /// The per-(item, store) product detail call, performed by a task
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot carry a path
    pub fn sku_endpoint(&self, item_id: i64, offline_id: i64) -> Result<Endpoint> {
        Ok(self
            .endpoint(GOODS_SKU)?
            .param("num_iid", item_id.to_string())
            .param("offline_id", offline_id.to_string()))
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T> {
        let body = self.transport.call(endpoint).await?;
        parse_response(&body)
    }

    /// Fetch all pages of a listing. A page shorter than the page size is
    /// the last one.
    async fn paginate<P, T>(&self, api: &str, records: fn(P) -> Vec<T>) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
    {
        let mut all = Vec::new();
        for page_no in 1.. {
            let endpoint = self
                .endpoint(api)?
                .param("page_no", page_no.to_string())
                .param("page_size", self.page_size.to_string());
            let page = records(self.fetch::<P>(&endpoint).await?);
            let len = page.len();
            debug!("{api}: page {page_no} has {len} records");
            all.extend(page);
            if len < self.page_size {
                break;
            }
        }
        Ok(all)
    }

    /// List all items, on sale and in the warehouse.
    /// Both categories are paged through concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first error of either listing
    pub async fn list_items(&self) -> Result<Vec<Item>> {
        let (mut on_sale, in_warehouse) = futures::try_join!(
            self.paginate(ITEMS_ON_SALE, |page: ItemsPage| page.items),
            self.paginate(ITEMS_IN_WAREHOUSE, |page: ItemsPage| page.items),
        )?;
        debug!(
            "Catalog has {} items on sale and {} in the warehouse",
            on_sale.len(),
            in_warehouse.len()
        );
        on_sale.extend(in_warehouse);
        Ok(on_sale)
    }

    /// List all stores
    ///
    /// # Errors
    ///
    /// Returns an error if any page cannot be fetched or decoded
    pub async fn list_offlines(&self) -> Result<Offlines> {
        let list: Vec<Offline> = self
            .paginate(OFFLINES, |page: OfflinesPage| page.list)
            .await?;
        debug!("Store directory has {} stores", list.len());
        Ok(Offlines::from(list))
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer, page_size: usize) -> YouzanClient {
        let config = YouzanConfig::builder()
            .base_url(Url::parse(&format!("{}/api/oauthentry", server.uri())).unwrap())
            .access_token("secret-token".to_string())
            .page_size(page_size)
            .build();
        YouzanClient::new(config).unwrap()
    }

    fn items(range: std::ops::Range<i64>) -> serde_json::Value {
        let items: Vec<_> = range
            .map(|id| json!({"item_id": id, "title": format!("item {id}"), "item_no": format!("NO-{id}")}))
            .collect();
        json!({"response": {"count": items.len(), "items": items}})
    }

    async fn mount_page(server: &MockServer, api: &str, page_no: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/oauthentry/{api}/3.0.0/get")))
            .and(query_param("access_token", "secret-token"))
            .and(query_param("page_no", page_no))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_list_items_pages_both_categories() {
        let server = MockServer::start().await;
        mount_page(&server, ITEMS_ON_SALE, "1", items(0..2)).await;
        mount_page(&server, ITEMS_ON_SALE, "2", items(2..3)).await;
        mount_page(&server, ITEMS_IN_WAREHOUSE, "1", items(10..11)).await;

        let items = client(&server, 2).list_items().await.unwrap();
        let ids: Vec<_> = items.iter().map(|item| item.item_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 10]);
        assert_eq!(items[3].item_no, "NO-10");
    }

    #[tokio::test]
    async fn test_list_offlines() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            OFFLINES,
            "1",
            json!({"response": {"count": 2, "list": [
                {"id": 7, "name": "North Store"},
                {"id": "9", "name": "South Store"}
            ]}}),
        )
        .await;

        let offlines = client(&server, 100).list_offlines().await.unwrap();
        assert_eq!(offlines.len(), 2);
        assert_eq!(offlines.id_by_name("south store"), Some(9));
    }

    #[tokio::test]
    async fn test_error_envelope_fails_listing() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            OFFLINES,
            "1",
            json!({"error_response": {"code": 40010, "msg": "invalid access_token"}}),
        )
        .await;

        let err = client(&server, 100).list_offlines().await.unwrap_err();
        assert_eq!(
            err,
            ErrorKind::Upstream {
                code: 40010,
                message: "invalid access_token".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_status_fails_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server, 100).list_items().await.unwrap_err();
        assert_eq!(err, ErrorKind::RejectedStatus(StatusCode::TOO_MANY_REQUESTS));
    }

    #[test]
    fn test_sku_endpoint() {
        let config = YouzanConfig::builder().access_token("t0ken".to_string()).build();
        let endpoint = YouzanClient::new(config)
            .unwrap()
            .sku_endpoint(42, 7)
            .unwrap();

        assert_eq!(
            endpoint.url().as_str(),
            "https://open.youzan.com/api/oauthentry/youzan.multistore.goods.sku/3.0.0/get"
        );
        assert_eq!(endpoint.params()["num_iid"], "42");
        assert_eq!(endpoint.params()["offline_id"], "7");
        assert_eq!(endpoint.params()["access_token"], "t0ken");
    }

    #[test]
    fn test_missing_access_token() {
        let err = YouzanClient::new(YouzanConfig::default()).unwrap_err();
        assert_eq!(err, ErrorKind::MissingAccessToken);

        let blank = YouzanConfig::builder().access_token("  ".to_string()).build();
        assert_eq!(
            YouzanClient::new(blank).unwrap_err(),
            ErrorKind::MissingAccessToken
        );
    }

    #[test]
    fn test_config_from_toml() {
        let config: YouzanConfig = toml::from_str(
            r#"
            access_token = "abc"
            page_size = 50
            timeout = "3s"
            "#,
        )
        .unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.access_token.unwrap().expose_secret(), "abc");
    }
}
