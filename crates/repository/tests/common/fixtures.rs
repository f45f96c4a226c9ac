//! Sample entity and repository used across the integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use helios_repository::backends::sqlite::SqliteDatabase;
use helios_repository::core::{Entity, EntityInfo, Row, Scope, Value};
use helios_repository::error::{BoxError, DriverResult, RepositoryResult, ValidationError};
use helios_repository::repository::{
    BaseRepository, Callbacks, Operation, QueryBuilders, Repository, SqlRowExecutor,
};

pub const WIDGET_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS widgets (
        id TEXT PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL,
        modified_at TEXT NOT NULL
    );
";

const COLUMNS: &str = "id, code, name, description, created_at, modified_at";

/// A catalog item identified by a generated id and a unique code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Widget {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Widget {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn scan(row: &Row, widget: &mut Widget) -> DriverResult<()> {
        widget.id = row.get_named("id")?;
        widget.code = row.get_named("code")?;
        widget.name = row.get_named("name")?;
        widget.description = row.get_named("description")?;
        widget.created_at = Some(row.get_named("created_at")?);
        widget.modified_at = Some(row.get_named("modified_at")?);
        Ok(())
    }
}

impl Entity for Widget {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn is_exists(&self) -> bool {
        !self.id.is_empty()
    }

    fn before_create(&mut self) -> Result<(), BoxError> {
        let now = Utc::now();
        self.id = uuid::Uuid::new_v4().to_string();
        self.created_at = Some(now);
        self.modified_at = Some(now);
        Ok(())
    }

    fn before_change(&mut self) -> Result<(), BoxError> {
        self.modified_at = Some(Utc::now());
        Ok(())
    }

    fn validate_create(&self) -> Result<(), ValidationError> {
        if self.is_exists() {
            return Err(ValidationError::unexpected("id"));
        }
        if self.code.trim().is_empty() {
            return Err(ValidationError::missing("code"));
        }
        Ok(())
    }

    fn validate_change(&self) -> Result<(), ValidationError> {
        if !self.is_exists() {
            return Err(ValidationError::missing("id"));
        }
        if self.code.trim().is_empty() {
            return Err(ValidationError::missing("code"));
        }
        Ok(())
    }
}

/// Widget repository: the generic engine plus a lookup by code.
pub struct WidgetRepository {
    base: BaseRepository<Widget>,
}

impl WidgetRepository {
    pub fn new(db: Arc<SqliteDatabase>) -> RepositoryResult<Self> {
        let query_builders = QueryBuilders::builder()
            .with_find(|| format!("SELECT {COLUMNS} FROM widgets WHERE id = ?1"))
            .with_list(|| format!("SELECT {COLUMNS} FROM widgets ORDER BY code LIMIT ?1 OFFSET ?2"))
            .with_create(|| {
                format!(
                    "INSERT INTO widgets ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                     RETURNING {COLUMNS}"
                )
            })
            .with_update(|| {
                format!(
                    "UPDATE widgets SET code = ?2, name = ?3, description = ?4, modified_at = ?5 \
                     WHERE id = ?1 RETURNING {COLUMNS}"
                )
            })
            .with_delete(|| "DELETE FROM widgets WHERE id = ?1".to_string())
            .build();

        let insert = query_builders
            .get(Operation::Create)
            .expect("create query configured");
        let update = query_builders
            .get(Operation::Update)
            .expect("update query configured");

        let callbacks = Callbacks::builder()
            .with_default_factory()
            .with_scanner(Widget::scan)
            .with_entity_hooks()
            .with_create_executor(SqlRowExecutor::from_builder(insert, |w: &Widget| {
                vec![
                    w.id.clone().into(),
                    w.code.clone().into(),
                    w.name.clone().into(),
                    w.description.clone().into(),
                    w.created_at.into(),
                    w.modified_at.into(),
                ]
            }))
            .with_update_executor(SqlRowExecutor::from_builder(update, |w: &Widget| {
                vec![
                    w.id.clone().into(),
                    w.code.clone().into(),
                    w.name.clone().into(),
                    w.description.clone().into(),
                    w.modified_at.into(),
                ]
            }))
            .build()?;

        Ok(Self {
            base: BaseRepository::from_store(
                db,
                EntityInfo::new("widgets", "Widget"),
                query_builders,
                callbacks,
            ),
        })
    }

    pub fn base(&self) -> &BaseRepository<Widget> {
        &self.base
    }

    pub async fn find_by_code(&self, scope: &Scope, code: &str) -> RepositoryResult<Widget> {
        let sql = format!("SELECT {COLUMNS} FROM widgets WHERE code = ?1");
        self.base
            .find_one(scope, "WidgetRepository.find_by_code", &sql, &[code.into()], code)
            .await
    }

    pub async fn list_by_name(&self, scope: &Scope, name: &str) -> RepositoryResult<Vec<Widget>> {
        let sql = format!("SELECT {COLUMNS} FROM widgets WHERE name = ?1 ORDER BY code");
        self.base.list_with(scope, &sql, &[Value::from(name)]).await
    }
}

#[async_trait]
impl Repository<Widget> for WidgetRepository {
    async fn find(&self, scope: &Scope, id: &String) -> RepositoryResult<Widget> {
        self.base.find(scope, id).await
    }

    async fn list(&self, scope: &Scope, limit: i64, offset: i64) -> RepositoryResult<Vec<Widget>> {
        self.base.list(scope, limit, offset).await
    }

    async fn create(&self, scope: &Scope, entity: Widget) -> RepositoryResult<Widget> {
        self.base.create(scope, entity).await
    }

    async fn update(&self, scope: &Scope, entity: Widget) -> RepositoryResult<Widget> {
        self.base.update(scope, entity).await
    }

    async fn delete(&self, scope: &Scope, id: &String) -> RepositoryResult<()> {
        self.base.delete(scope, id).await
    }

    async fn close(&self) -> RepositoryResult<()> {
        self.base.close().await
    }
}
