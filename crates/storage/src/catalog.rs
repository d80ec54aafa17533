//! Resource catalog using SQLite.
//!
//! Resources are keyed by slug. Layers are keyed by (resource, name) and
//! styles by (layer, name); both are get-or-created in place and removed
//! only through the cascade when their resource is deleted.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};

use wms_common::{BoundingBox, LayerStyle, WmsError, WmsLayer, WmsResource, WmsResult};

/// Database connection pool and catalog operations.
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Connect to the database at `database_url` (e.g. `sqlite://wms.db`),
    /// creating the file if needed.
    pub async fn connect(database_url: &str) -> WmsResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(db_error("Invalid database URL"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_error("Connection failed"))?;

        info!(url = %database_url, "Opened resource catalog");
        Ok(Self { pool })
    }

    /// Open a migrated in-memory database (for testing).
    pub async fn open_memory() -> WmsResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);

        // Every connection to ":memory:" is a separate database, so keep
        // exactly one alive for the pool's lifetime.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_error("Connection failed"))?;

        let catalog = Self { pool };
        catalog.migrate().await?;
        Ok(catalog)
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> WmsResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(db_error("Migration failed"))?;
            }
        }

        Ok(())
    }

    /// Insert or update a resource by slug.
    ///
    /// The slug must already be assigned. Fails if another resource holds
    /// the same name.
    #[instrument(skip(self, resource), fields(slug = %resource.slug))]
    pub async fn save_resource(&self, resource: &WmsResource) -> WmsResult<()> {
        if resource.slug.is_empty() {
            return Err(WmsError::Persistence(
                "Resource has no slug assigned".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO wms_resources (
                slug, name, uri, description, preview,
                zoom, min_zoom, max_zoom,
                north, east, south, west,
                username, password
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (slug) DO UPDATE SET
                name = excluded.name,
                uri = excluded.uri,
                description = excluded.description,
                preview = excluded.preview,
                zoom = excluded.zoom,
                min_zoom = excluded.min_zoom,
                max_zoom = excluded.max_zoom,
                north = excluded.north,
                east = excluded.east,
                south = excluded.south,
                west = excluded.west,
                username = excluded.username,
                password = excluded.password
            "#,
        )
        .bind(&resource.slug)
        .bind(&resource.name)
        .bind(&resource.uri)
        .bind(&resource.description)
        .bind(resource.preview.as_deref())
        .bind(resource.zoom.map(i64::from))
        .bind(resource.min_zoom.map(i64::from))
        .bind(resource.max_zoom.map(i64::from))
        .bind(resource.north)
        .bind(resource.east)
        .bind(resource.south)
        .bind(resource.west)
        .bind(resource.username.as_deref())
        .bind(resource.password.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db_error("Saving resource failed"))?;

        debug!("Saved resource");
        Ok(())
    }

    /// Get a resource by slug.
    pub async fn get_resource(&self, slug: &str) -> WmsResult<Option<WmsResource>> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {} FROM wms_resources WHERE slug = ?",
            RESOURCE_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Query failed"))?;

        Ok(row.map(WmsResource::from))
    }

    /// All resources ordered by name.
    pub async fn list_resources(&self) -> WmsResult<Vec<WmsResource>> {
        let rows = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {} FROM wms_resources ORDER BY name ASC",
            RESOURCE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Query failed"))?;

        Ok(rows.into_iter().map(WmsResource::from).collect())
    }

    /// Delete a resource together with its layers and styles.
    ///
    /// Returns false if no resource had this slug.
    #[instrument(skip(self))]
    pub async fn delete_resource(&self, slug: &str) -> WmsResult<bool> {
        let result = sqlx::query("DELETE FROM wms_resources WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await
            .map_err(db_error("Delete failed"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Layer names of a resource in the order they were first seen.
    pub async fn layer_names(&self, slug: &str) -> WmsResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM wms_layers WHERE resource_slug = ? ORDER BY id ASC",
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Query failed"))
    }

    /// Layers of a resource with their styles.
    pub async fn layers(&self, slug: &str) -> WmsResult<Vec<WmsLayer>> {
        let rows = sqlx::query_as::<_, LayerRow>(
            "SELECT id, name, title, abstract_text, \
             bbox_west, bbox_south, bbox_east, bbox_north \
             FROM wms_layers WHERE resource_slug = ? ORDER BY id ASC",
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Query failed"))?;

        let mut layers = Vec::with_capacity(rows.len());
        for row in rows {
            let styles = sqlx::query_as::<_, StyleRow>(
                "SELECT id, name, title, legend_uri FROM layer_styles \
                 WHERE layer_id = ? ORDER BY id ASC",
            )
            .bind(row.id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Query failed"))?;

            let mut layer = WmsLayer::from(row);
            layer.styles = styles.into_iter().map(LayerStyle::from).collect();
            layers.push(layer);
        }

        Ok(layers)
    }

    /// Get-or-create every layer and style of a resource, overwriting their
    /// descriptive fields, in a single transaction.
    ///
    /// Layers and styles not present in `layers` are left untouched.
    /// Returns the input with catalog ids assigned.
    #[instrument(skip(self, layers), fields(count = layers.len()))]
    pub async fn store_layers(&self, slug: &str, layers: &[WmsLayer]) -> WmsResult<Vec<WmsLayer>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Begin transaction failed"))?;

        let mut stored = Vec::with_capacity(layers.len());
        for layer in layers {
            let bbox = layer.bbox;
            let layer_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO wms_layers (
                    resource_slug, name, title, abstract_text,
                    bbox_west, bbox_south, bbox_east, bbox_north
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (resource_slug, name) DO UPDATE SET
                    title = excluded.title,
                    abstract_text = excluded.abstract_text,
                    bbox_west = excluded.bbox_west,
                    bbox_south = excluded.bbox_south,
                    bbox_east = excluded.bbox_east,
                    bbox_north = excluded.bbox_north
                RETURNING id
                "#,
            )
            .bind(slug)
            .bind(&layer.name)
            .bind(layer.title.as_deref())
            .bind(layer.abstract_text.as_deref())
            .bind(bbox.map(|b| b.min_x))
            .bind(bbox.map(|b| b.min_y))
            .bind(bbox.map(|b| b.max_x))
            .bind(bbox.map(|b| b.max_y))
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Saving layer failed"))?;

            let mut stored_layer = layer.clone();
            stored_layer.id = Some(layer_id);

            for style in stored_layer.styles.iter_mut() {
                let style_id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO layer_styles (layer_id, name, title, legend_uri)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT (layer_id, name) DO UPDATE SET
                        title = excluded.title,
                        legend_uri = excluded.legend_uri
                    RETURNING id
                    "#,
                )
                .bind(layer_id)
                .bind(&style.name)
                .bind(style.title.as_deref())
                .bind(style.legend_uri.as_deref())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error("Saving style failed"))?;

                style.id = Some(style_id);
            }

            stored.push(stored_layer);
        }

        tx.commit()
            .await
            .map_err(db_error("Commit failed"))?;

        debug!(slug = %slug, "Stored layers");
        Ok(stored)
    }
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> WmsError {
    move |e| WmsError::Persistence(format!("{}: {}", context, e))
}

const RESOURCE_COLUMNS: &str = "slug, name, uri, description, preview, \
     zoom, min_zoom, max_zoom, north, east, south, west, username, password";

#[derive(Debug, FromRow)]
struct ResourceRow {
    slug: String,
    name: String,
    uri: String,
    description: String,
    preview: Option<String>,
    zoom: Option<i64>,
    min_zoom: Option<i64>,
    max_zoom: Option<i64>,
    north: Option<f64>,
    east: Option<f64>,
    south: Option<f64>,
    west: Option<f64>,
    username: Option<String>,
    password: Option<String>,
}

impl From<ResourceRow> for WmsResource {
    fn from(row: ResourceRow) -> Self {
        Self {
            slug: row.slug,
            name: row.name,
            uri: row.uri,
            description: row.description,
            preview: row.preview,
            zoom: row.zoom.map(|z| z as u8),
            min_zoom: row.min_zoom.map(|z| z as u8),
            max_zoom: row.max_zoom.map(|z| z as u8),
            north: row.north,
            east: row.east,
            south: row.south,
            west: row.west,
            username: row.username,
            password: row.password,
        }
    }
}

#[derive(Debug, FromRow)]
struct LayerRow {
    id: i64,
    name: String,
    title: Option<String>,
    abstract_text: Option<String>,
    bbox_west: Option<f64>,
    bbox_south: Option<f64>,
    bbox_east: Option<f64>,
    bbox_north: Option<f64>,
}

impl From<LayerRow> for WmsLayer {
    fn from(row: LayerRow) -> Self {
        let bbox = match (row.bbox_west, row.bbox_south, row.bbox_east, row.bbox_north) {
            (Some(w), Some(s), Some(e), Some(n)) => Some(BoundingBox::new(w, s, e, n)),
            _ => None,
        };

        Self {
            id: Some(row.id),
            name: row.name,
            title: row.title,
            abstract_text: row.abstract_text,
            bbox,
            styles: Vec::new(),
        }
    }
}

#[derive(Debug, FromRow)]
struct StyleRow {
    id: i64,
    name: String,
    title: Option<String>,
    legend_uri: Option<String>,
}

impl From<StyleRow> for LayerStyle {
    fn from(row: StyleRow) -> Self {
        Self {
            id: Some(row.id),
            name: row.name,
            title: row.title,
            legend_uri: row.legend_uri,
        }
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS wms_resources (
    slug TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    uri TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    preview TEXT,
    zoom INTEGER CHECK (zoom BETWEEN 0 AND 19),
    min_zoom INTEGER CHECK (min_zoom BETWEEN 0 AND 19),
    max_zoom INTEGER DEFAULT 19 CHECK (max_zoom BETWEEN 0 AND 19),
    north REAL,
    east REAL,
    south REAL,
    west REAL,
    username TEXT,
    password TEXT
);

CREATE TABLE IF NOT EXISTS wms_layers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_slug TEXT NOT NULL REFERENCES wms_resources(slug) ON DELETE CASCADE,
    name TEXT NOT NULL,
    title TEXT,
    abstract_text TEXT,
    bbox_west REAL,
    bbox_south REAL,
    bbox_east REAL,
    bbox_north REAL,
    UNIQUE (resource_slug, name)
);

CREATE TABLE IF NOT EXISTS layer_styles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    layer_id INTEGER NOT NULL REFERENCES wms_layers(id) ON DELETE CASCADE,
    name TEXT NOT NULL DEFAULT '',
    title TEXT,
    legend_uri TEXT,
    UNIQUE (layer_id, name)
);

CREATE INDEX IF NOT EXISTS idx_layer_styles_layer ON layer_styles(layer_id)
"#;
