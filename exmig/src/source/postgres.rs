//! PostgreSQL source store
//!
//! Queries the CMS tables (`alchemy_pages`, `alchemy_elements`,
//! `alchemy_contents`, `alchemy_essence_*`, `alchemy_pictures`) directly.
//! Ids are cast to `bigint` and text columns to `text` so decoding does not
//! depend on the exact column types of a given schema version.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use exmig_common::{Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use super::{
    ContentRef, CreditPageRow, ElementRecord, EssenceKind, EssenceRow, PageRecord, PictureRow,
    SourceStore,
};

/// Layout of credit pages, which are not chapters
pub const CREDIT_PAGE_LAYOUT: &str = "exhibition_credit_page";

const PAGE_SQL: &str = r#"
    SELECT
        ap.id::bigint AS id,
        ap.urlname::text AS urlname,
        ap.language_code::text AS language_code,
        ap.depth::int4 AS depth,
        ap.meta_description::text AS meta_description,
        ap.public_on,
        ARRAY(
            SELECT other.language_code::text
            FROM alchemy_pages other
            WHERE other.urlname = ap.urlname
              AND other.language_code <> ap.language_code
            ORDER BY other.language_code
        ) AS other_language_codes,
        ARRAY(
            SELECT child.urlname::text
            FROM alchemy_pages child
            WHERE child.parent_id = ap.id
              AND child.page_layout IS DISTINCT FROM $2
            ORDER BY child.lft
        ) AS child_urlnames
    FROM alchemy_pages ap
    WHERE ap.id = $1
"#;

const ELEMENTS_SQL: &str = r#"
    SELECT
        ae.id::bigint AS element_id,
        ae.name::text AS element_name,
        ac.name::text AS content_name,
        ac.essence_type::text AS essence_type,
        ac.essence_id::bigint AS essence_id
    FROM alchemy_elements ae
    LEFT JOIN alchemy_contents ac ON ac.element_id = ae.id
    WHERE ae.page_id = $1
      AND ae.public = true
    ORDER BY ae.position, ae.id, ac.position, ac.name
"#;

const PICTURES_SQL: &str = r#"
    SELECT DISTINCT ON (ap.id, ap.image_file_uid, ap.image_file_format, ap.image_file_name)
        aec.title::text AS title,
        ap.image_file_uid::text AS image_file_uid,
        ap.image_file_format::text AS image_file_format,
        ap.image_file_name::text AS image_file_name
    FROM alchemy_essence_pictures aep
    INNER JOIN alchemy_pictures ap ON aep.picture_id = ap.id
    INNER JOIN alchemy_contents ac ON ac.essence_id = aep.id AND ac.essence_type = 'Alchemy::EssencePicture'
    INNER JOIN alchemy_elements ae ON ac.element_id = ae.id
    LEFT JOIN alchemy_contents acc ON acc.element_id = ae.id AND acc.essence_type = 'Alchemy::EssenceCredit'
    LEFT JOIN alchemy_essence_credits aec ON acc.essence_id = aec.id
    WHERE ap.image_file_uid IS NOT NULL
"#;

const CREDIT_PAGES_SQL: &str = r#"
    SELECT
        ap.id::bigint AS page_id,
        ap.urlname::text AS urlname,
        ap.language_code::text AS language_code,
        ac.name::text AS content_name,
        ac.essence_type::text AS essence_type,
        ac.essence_id::bigint AS essence_id
    FROM alchemy_pages ap
    LEFT JOIN alchemy_elements ae ON ae.page_id = ap.id
    LEFT JOIN alchemy_contents ac ON ac.element_id = ae.id
    WHERE ap.depth > 1
      AND ap.page_layout = $1
    ORDER BY ap.public_on ASC, ap.id, ae.position, ac.position
"#;

/// Essence query and the columns it returns
fn essence_query(kind: EssenceKind) -> (&'static str, &'static [&'static str]) {
    match kind {
        EssenceKind::Text => (
            "SELECT body::text AS body FROM alchemy_essence_texts WHERE id = $1",
            &["body"],
        ),
        EssenceKind::RichText => (
            "SELECT body::text AS body FROM alchemy_essence_richtexts WHERE id = $1",
            &["body"],
        ),
        EssenceKind::Picture => (
            "SELECT p.image_file_uid::text AS image_file_uid, \
                    p.image_file_name::text AS image_file_name, \
                    p.image_file_format::text AS image_file_format \
             FROM alchemy_essence_pictures aep \
             LEFT JOIN alchemy_pictures p ON p.id = aep.picture_id \
             WHERE aep.id = $1",
            &["image_file_uid", "image_file_name", "image_file_format"],
        ),
        EssenceKind::Credit => (
            "SELECT title::text AS title, author::text AS author, \
                    institution::text AS institution, url::text AS url, \
                    license::text AS license \
             FROM alchemy_essence_credits WHERE id = $1",
            &["title", "author", "institution", "url", "license"],
        ),
        EssenceKind::Html => (
            "SELECT source::text AS source FROM alchemy_essence_htmls WHERE id = $1",
            &["source"],
        ),
    }
}

/// One row of the element/content join
#[derive(Debug, Clone)]
struct ElementContentRow {
    element_id: i64,
    element_name: String,
    content: Option<ContentRef>,
}

/// Fold joined rows into elements, preserving row order
fn group_elements(rows: Vec<ElementContentRow>) -> Vec<ElementRecord> {
    let mut elements: Vec<(i64, ElementRecord)> = Vec::new();
    for row in rows {
        let start_new = elements.last().map(|(id, _)| *id != row.element_id).unwrap_or(true);
        if start_new {
            elements.push((
                row.element_id,
                ElementRecord {
                    name: row.element_name,
                    contents: Vec::new(),
                },
            ));
        }
        if let (Some(content), Some((_, element))) = (row.content, elements.last_mut()) {
            element.contents.push(content);
        }
    }
    elements.into_iter().map(|(_, element)| element).collect()
}

/// One row of the credit page/content join
#[derive(Debug, Clone)]
struct CreditContentRow {
    page_id: i64,
    urlname: String,
    language_code: String,
    content: Option<ContentRef>,
}

fn group_credit_pages(rows: Vec<CreditContentRow>) -> Vec<CreditPageRow> {
    let mut pages: Vec<(i64, CreditPageRow)> = Vec::new();
    for row in rows {
        let start_new = pages.last().map(|(id, _)| *id != row.page_id).unwrap_or(true);
        if start_new {
            pages.push((
                row.page_id,
                CreditPageRow {
                    urlname: row.urlname,
                    language_code: row.language_code,
                    contents: Vec::new(),
                },
            ));
        }
        if let (Some(content), Some((_, page))) = (row.content, pages.last_mut()) {
            page.contents.push(content);
        }
    }
    pages.into_iter().map(|(_, page)| page).collect()
}

fn content_ref(row: &PgRow) -> Result<Option<ContentRef>> {
    let name: Option<String> = row.try_get("content_name")?;
    let essence_type: Option<String> = row.try_get("essence_type")?;
    let essence_id: Option<i64> = row.try_get("essence_id")?;
    Ok(match (name, essence_type, essence_id) {
        (Some(name), Some(essence_type), Some(essence_id)) => Some(ContentRef {
            name,
            essence_type,
            essence_id,
        }),
        _ => None,
    })
}

/// Source store backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgSourceStore {
    pool: PgPool,
}

impl PgSourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        info!("Connected to source database");
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SourceStore for PgSourceStore {
    async fn page_id(&self, urlname: &str, language_code: &str) -> Result<Option<i64>> {
        let row = sqlx::query(
            "SELECT id::bigint AS id FROM alchemy_pages WHERE urlname = $1 AND language_code = $2",
        )
        .bind(urlname)
        .bind(language_code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get::<i64, _>("id")).transpose().map_err(Error::from)
    }

    async fn page(&self, id: i64) -> Result<PageRecord> {
        let row = sqlx::query(PAGE_SQL)
            .bind(id)
            .bind(CREDIT_PAGE_LAYOUT)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Page {}", id)))?;

        let public_on: Option<NaiveDateTime> = row.try_get("public_on")?;
        Ok(PageRecord {
            id: row.try_get("id")?,
            urlname: row.try_get("urlname")?,
            language_code: row.try_get("language_code")?,
            depth: row.try_get("depth")?,
            meta_description: row.try_get("meta_description")?,
            public_on: public_on.map(|t| t.and_utc()),
            other_language_codes: row.try_get("other_language_codes")?,
            child_urlnames: row.try_get("child_urlnames")?,
        })
    }

    async fn elements(&self, page_id: i64) -> Result<Vec<ElementRecord>> {
        let rows = sqlx::query(ELEMENTS_SQL)
            .bind(page_id)
            .fetch_all(&self.pool)
            .await?;

        let mut joined = Vec::with_capacity(rows.len());
        for row in &rows {
            joined.push(ElementContentRow {
                element_id: row.try_get("element_id")?,
                element_name: row.try_get("element_name")?,
                content: content_ref(row)?,
            });
        }
        let elements = group_elements(joined);
        debug!(page_id, count = elements.len(), "Loaded elements");
        Ok(elements)
    }

    async fn essence(&self, kind: EssenceKind, id: i64) -> Result<Option<EssenceRow>> {
        let (sql, columns) = essence_query(kind);
        let Some(row) = sqlx::query(sql).bind(id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let mut essence = EssenceRow::new();
        for column in columns {
            essence.insert(column.to_string(), row.try_get::<Option<String>, _>(*column)?);
        }
        Ok(Some(essence))
    }

    async fn top_level_urlnames(&self, language_code: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT urlname::text AS urlname
            FROM alchemy_pages
            WHERE depth = 2
              AND language_code = $1
              AND public_on IS NOT NULL
            ORDER BY public_on
            "#,
        )
        .bind(language_code)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("urlname").map_err(Error::from))
            .collect()
    }

    async fn pictures(&self) -> Result<Vec<PictureRow>> {
        let rows = sqlx::query(PICTURES_SQL).fetch_all(&self.pool).await?;

        let mut pictures = Vec::with_capacity(rows.len());
        for row in &rows {
            pictures.push(PictureRow {
                title: row.try_get("title")?,
                image_file_uid: row.try_get("image_file_uid")?,
                image_file_name: row.try_get("image_file_name")?,
                image_file_format: row.try_get("image_file_format")?,
            });
        }
        Ok(pictures)
    }

    async fn credit_pages(&self) -> Result<Vec<CreditPageRow>> {
        let rows = sqlx::query(CREDIT_PAGES_SQL)
            .bind(CREDIT_PAGE_LAYOUT)
            .fetch_all(&self.pool)
            .await?;

        let mut joined = Vec::with_capacity(rows.len());
        for row in &rows {
            joined.push(CreditContentRow {
                page_id: row.try_get("page_id")?,
                urlname: row.try_get("urlname")?,
                language_code: row.try_get("language_code")?,
                content: content_ref(row)?,
            });
        }
        Ok(group_credit_pages(joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(name: &str, id: i64) -> Option<ContentRef> {
        Some(ContentRef {
            name: name.to_string(),
            essence_type: "Alchemy::EssenceText".to_string(),
            essence_id: id,
        })
    }

    #[test]
    fn test_group_elements_keeps_order_and_empty_elements() {
        let rows = vec![
            ElementContentRow { element_id: 7, element_name: "intro".into(), content: content("title", 1) },
            ElementContentRow { element_id: 7, element_name: "intro".into(), content: content("body", 2) },
            ElementContentRow { element_id: 3, element_name: "section".into(), content: None },
            ElementContentRow { element_id: 9, element_name: "text".into(), content: content("body", 3) },
        ];

        let elements = group_elements(rows);
        let names: Vec<&str> = elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["intro", "section", "text"]);
        assert_eq!(elements[0].contents.len(), 2);
        assert_eq!(elements[0].contents[1].name, "body");
        assert!(elements[1].contents.is_empty());
    }

    #[test]
    fn test_group_credit_pages_by_page() {
        let rows = vec![
            CreditContentRow { page_id: 1, urlname: "faces/credits".into(), language_code: "en".into(), content: content("title", 1) },
            CreditContentRow { page_id: 1, urlname: "faces/credits".into(), language_code: "en".into(), content: content("body", 2) },
            CreditContentRow { page_id: 2, urlname: "faces/credits".into(), language_code: "de".into(), content: None },
        ];

        let pages = group_credit_pages(rows);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].contents.len(), 2);
        assert_eq!(pages[1].language_code, "de");
        assert!(pages[1].contents.is_empty());
    }

    #[test]
    fn test_essence_queries_name_their_columns() {
        let (sql, columns) = essence_query(EssenceKind::Credit);
        for column in columns {
            assert!(sql.contains(&format!("AS {}", column)));
        }
        let (sql, _) = essence_query(EssenceKind::Picture);
        assert!(sql.contains("alchemy_pictures"));
    }
}
