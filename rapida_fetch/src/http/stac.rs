//! Minimal STAC API client for the `/search` endpoint.

use crate::{CatalogAsset, CatalogItem, CatalogQuery, CatalogSearch};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, header};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{collections::BTreeMap, time::Duration};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const PAGE_LIMIT: usize = 100;
const MAX_PAGES: usize = 1000;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
	#[serde(default)]
	features: Vec<StacItem>,
	#[serde(default)]
	links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct StacItem {
	id: String,
	properties: Properties,
	#[serde(default)]
	assets: BTreeMap<String, StacAsset>,
}

#[derive(Debug, Deserialize)]
struct Properties {
	datetime: Option<String>,
	#[serde(rename = "grid:code")]
	grid_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StacAsset {
	href: String,
	#[serde(rename = "raster:bands", default)]
	raster_bands: Vec<RasterBand>,
}

#[derive(Debug, Deserialize)]
struct RasterBand {
	nodata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Link {
	rel: String,
	href: String,
	method: Option<String>,
	body: Option<Value>,
}

impl StacItem {
	fn into_catalog_item(self) -> Result<Option<CatalogItem>> {
		let Some(datetime) = self.properties.datetime else {
			log::warn!("item {} has no datetime, skipping", self.id);
			return Ok(None);
		};
		let datetime = OffsetDateTime::parse(&datetime, &Rfc3339)
			.with_context(|| format!("invalid datetime '{datetime}' of item {}", self.id))?;
		let assets = self
			.assets
			.into_iter()
			.map(|(key, asset)| {
				let nodata = asset.raster_bands.first().and_then(|b| b.nodata.as_ref()).and_then(Value::as_f64);
				(
					key,
					CatalogAsset {
						href: asset.href,
						nodata,
					},
				)
			})
			.collect();
		Ok(Some(CatalogItem {
			id: self.id,
			tile_id: self.properties.grid_code,
			datetime,
			assets,
		}))
	}
}

/// Searches a STAC API and follows its `next` links until all pages are read.
#[derive(Debug)]
pub struct StacClient {
	client: Client,
	root: String,
}

impl StacClient {
	pub fn new(root: &str) -> Result<StacClient> {
		let client = Client::builder()
			.tcp_keepalive(Duration::from_secs(600))
			.connect_timeout(Duration::from_secs(30))
			.build()?;
		Ok(StacClient {
			client,
			root: root.trim_end_matches('/').to_string(),
		})
	}

	fn search_body(query: &CatalogQuery) -> Value {
		let mut body = json!({
			"collections": [query.collection],
			"datetime": query.datetime,
			"query": { "eo:cloud_cover": { "lt": query.max_cloud_cover } },
			"limit": PAGE_LIMIT,
		});
		if let Some(bbox) = query.bbox {
			body["bbox"] = json!(bbox.as_array());
		}
		body
	}

	async fn fetch_page(&self, method: Method, url: &str, body: Option<&Value>) -> Result<FeatureCollection> {
		let mut request = self.client.request(method.clone(), url);
		if let Some(body) = body {
			request = request
				.header(header::CONTENT_TYPE, "application/json")
				.body(serde_json::to_vec(body)?);
		}
		let response = request.send().await?;
		let status = response.status();
		if status != StatusCode::OK {
			let text = response.text().await.unwrap_or_default();
			bail!("{method} {url} returned {status}: {text}");
		}
		let bytes = response.bytes().await?;
		serde_json::from_slice(&bytes).with_context(|| format!("invalid STAC response from {url}"))
	}
}

#[async_trait]
impl CatalogSearch for StacClient {
	async fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>> {
		let mut method = Method::POST;
		let mut url = format!("{}/search", self.root);
		let mut body = Some(Self::search_body(query));
		let mut items = Vec::new();

		for page in 1..=MAX_PAGES {
			log::debug!("requesting page {page} from {url}");
			let collection = self.fetch_page(method.clone(), &url, body.as_ref()).await?;
			for feature in collection.features {
				if let Some(item) = feature.into_catalog_item()? {
					items.push(item);
				}
			}

			let Some(next) = collection.links.into_iter().find(|l| l.rel == "next") else {
				return Ok(items);
			};
			method = match next.method.as_deref() {
				Some(m) => Method::from_bytes(m.to_uppercase().as_bytes())?,
				None => Method::GET,
			};
			// a POST `next` link carries the complete body or only the changed fields
			body = match (method == Method::POST, next.body, body) {
				(false, _, _) => None,
				(true, Some(Value::Object(changes)), Some(Value::Object(mut previous))) => {
					previous.extend(changes);
					Some(Value::Object(previous))
				}
				(true, Some(next_body), _) => Some(next_body),
				(true, None, previous) => previous,
			};
			url = next.href;
		}
		bail!("STAC search at {} returned more than {MAX_PAGES} pages", self.root)
	}
}
